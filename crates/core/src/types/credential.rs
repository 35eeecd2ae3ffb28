//! Bearer credential type.
//!
//! The remote API issues an opaque token at login. The client never inspects
//! it; it is persisted verbatim and presented as `Authorization: Bearer ...`
//! on every authenticated call.

use secrecy::{ExposeSecret, SecretString};

/// Opaque bearer token proving an authenticated session.
///
/// `Debug` output is redacted by the inner [`SecretString`].
#[derive(Debug, Clone)]
pub struct Credential(SecretString);

impl Credential {
    /// Wrap a raw token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// Returns `true` for an empty or whitespace-only token.
    ///
    /// The remote API never issues one; a blank persisted value is treated
    /// as absent.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.expose_secret().trim().is_empty()
    }
}

impl ExposeSecret<str> for Credential {
    fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl From<String> for Credential {
    fn from(token: String) -> Self {
        Self::new(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exposes_raw_token() {
        let credential = Credential::from("abc.def".to_string());
        assert_eq!(credential.expose_secret(), "abc.def");
    }

    #[test]
    fn test_debug_is_redacted() {
        let credential = Credential::new("super-secret-token");
        assert!(!format!("{credential:?}").contains("super-secret-token"));
    }

    #[test]
    fn test_blank() {
        assert!(Credential::new("  ").is_blank());
        assert!(!Credential::new("t").is_blank());
    }
}

//! Account identity and the payloads that create or modify it.
//!
//! Forms (`LoginForm`, `SignupForm`) are what a front end collects; they are
//! validated into requests before anything touches the network.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use super::email::{Email, EmailError};
use super::id::UserId;
use super::status::Role;

/// Minimum password length accepted by the login and signup forms.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Form validation failures. These never reach the remote API.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("First name is required")]
    EmptyFirstName,
    #[error("Last name is required")]
    EmptyLastName,
    #[error("{0}")]
    Email(#[from] EmailError),
    #[error("Password is required")]
    EmptyPassword,
    #[error("Password must be at least {min} characters")]
    PasswordTooShort { min: usize },
    #[error("Passwords do not match")]
    PasswordMismatch,
}

/// The authenticated user's profile as known to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(alias = "_id")]
    pub id: UserId,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: Email,
    #[serde(default)]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Identity {
    /// First and last name joined by a space.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Whether the account may use the seller dashboard.
    #[must_use]
    pub const fn is_seller(&self) -> bool {
        matches!(self.role, Role::Seller)
    }

    /// Shallow-merge fields returned by a profile update into a copy of this
    /// identity. Fields present in `patch` win; everything else is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the merged record no longer describes a valid
    /// identity (e.g. the patch nulls out the email).
    pub fn merged_with(&self, patch: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        let mut record = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        for (key, value) in patch {
            // The server spells the primary key `_id`
            let key = if key == "_id" { "id" } else { key.as_str() };
            record.insert(key.to_owned(), value.clone());
        }

        serde_json::from_value(Value::Object(record))
    }
}

/// Partial profile edit. Only the fields that are `Some` are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl ProfileUpdate {
    /// Returns `true` when no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.phone.is_none()
            && self.address.is_none()
    }
}

fn expose<S: Serializer>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

fn check_password(password: &SecretString) -> Result<(), ValidationError> {
    let password = password.expose_secret();
    if password.is_empty() {
        return Err(ValidationError::EmptyPassword);
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::PasswordTooShort {
            min: MIN_PASSWORD_LENGTH,
        });
    }
    Ok(())
}

/// Body of the login call.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: Email,
    #[serde(serialize_with = "expose")]
    pub password: SecretString,
}

/// Raw login form input.
#[derive(Debug, Clone)]
pub struct LoginForm {
    pub email: String,
    pub password: SecretString,
}

impl LoginForm {
    /// Validate the form into a login request.
    ///
    /// # Errors
    ///
    /// Returns the first field that fails validation.
    pub fn into_request(self) -> Result<LoginRequest, ValidationError> {
        let email = Email::parse(self.email.trim())?;
        check_password(&self.password)?;
        Ok(LoginRequest {
            email,
            password: self.password,
        })
    }
}

/// Body of the signup call: every form field except the confirmation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: Email,
    #[serde(serialize_with = "expose")]
    pub password: SecretString,
    pub role: Role,
}

/// Raw signup form input.
#[derive(Debug, Clone)]
pub struct SignupForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: SecretString,
    pub confirm_password: SecretString,
    pub role: Role,
}

impl SignupForm {
    /// Validate the form and drop the password confirmation.
    ///
    /// # Errors
    ///
    /// Returns the first field that fails validation.
    pub fn into_request(self) -> Result<SignupRequest, ValidationError> {
        let first_name = self.first_name.trim();
        if first_name.is_empty() {
            return Err(ValidationError::EmptyFirstName);
        }
        let last_name = self.last_name.trim();
        if last_name.is_empty() {
            return Err(ValidationError::EmptyLastName);
        }
        let email = Email::parse(self.email.trim())?;
        check_password(&self.password)?;
        if self.password.expose_secret() != self.confirm_password.expose_secret() {
            return Err(ValidationError::PasswordMismatch);
        }

        Ok(SignupRequest {
            first_name: first_name.to_owned(),
            last_name: last_name.to_owned(),
            email,
            password: self.password,
            role: self.role,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn identity() -> Identity {
        serde_json::from_value(json!({
            "_id": "u-1",
            "firstName": "Jane",
            "lastName": "Doe",
            "email": "jane@example.com",
            "role": "seller",
            "createdAt": "2024-01-01T00:00:00Z"
        }))
        .unwrap()
    }

    fn signup_form() -> SignupForm {
        SignupForm {
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            email: "jane@example.com".to_string(),
            password: SecretString::from("hunter22".to_string()),
            confirm_password: SecretString::from("hunter22".to_string()),
            role: Role::Buyer,
        }
    }

    #[test]
    fn test_identity_accepts_server_shape() {
        let user = identity();
        assert_eq!(user.id.as_str(), "u-1");
        assert!(user.is_seller());
        assert_eq!(user.full_name(), "Jane Doe");
        assert_eq!(user.profile_image, None);
    }

    #[test]
    fn test_merge_response_wins_per_field() {
        let user = identity();
        let patch = json!({"firstName": "Janet", "phone": "555-0100"});
        let merged = user.merged_with(patch.as_object().unwrap()).unwrap();

        assert_eq!(merged.first_name, "Janet");
        assert_eq!(merged.last_name, "Doe");
        assert_eq!(merged.phone.as_deref(), Some("555-0100"));
        assert_eq!(merged.email, user.email);
    }

    #[test]
    fn test_merge_maps_server_primary_key() {
        let user = identity();
        let patch = json!({"_id": "u-1", "lastName": "Roe"});
        let merged = user.merged_with(patch.as_object().unwrap()).unwrap();
        assert_eq!(merged.id, user.id);
        assert_eq!(merged.last_name, "Roe");
    }

    #[test]
    fn test_merge_rejects_invalid_record() {
        let user = identity();
        let patch = json!({"email": null});
        assert!(user.merged_with(patch.as_object().unwrap()).is_err());
    }

    #[test]
    fn test_profile_update_only_sends_set_fields() {
        let update = ProfileUpdate {
            first_name: Some("Jane".to_string()),
            ..ProfileUpdate::default()
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({"firstName": "Jane"})
        );
        assert!(ProfileUpdate::default().is_empty());
    }

    #[test]
    fn test_signup_drops_confirmation() {
        let request = signup_form().into_request().unwrap();
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(
            body,
            json!({
                "firstName": "Jane",
                "lastName": "Doe",
                "email": "jane@example.com",
                "password": "hunter22",
                "role": "buyer"
            })
        );
    }

    #[test]
    fn test_signup_validation() {
        let mut form = signup_form();
        form.first_name = "  ".to_string();
        assert_eq!(form.into_request().unwrap_err(), ValidationError::EmptyFirstName);

        let mut form = signup_form();
        form.confirm_password = SecretString::from("hunter23".to_string());
        assert_eq!(
            form.into_request().unwrap_err(),
            ValidationError::PasswordMismatch
        );

        let mut form = signup_form();
        form.password = SecretString::from("abc".to_string());
        form.confirm_password = SecretString::from("abc".to_string());
        assert_eq!(
            form.into_request().unwrap_err(),
            ValidationError::PasswordTooShort { min: 6 }
        );

        let mut form = signup_form();
        form.email = "jane".to_string();
        assert!(matches!(
            form.into_request().unwrap_err(),
            ValidationError::Email(EmailError::MissingAtSymbol)
        ));
    }

    #[test]
    fn test_login_form() {
        let form = LoginForm {
            email: " jane@example.com ".to_string(),
            password: SecretString::from("hunter22".to_string()),
        };
        let request = form.into_request().unwrap();
        assert_eq!(request.email.as_str(), "jane@example.com");

        let form = LoginForm {
            email: "jane@example.com".to_string(),
            password: SecretString::from("".to_string()),
        };
        assert_eq!(form.into_request().unwrap_err(), ValidationError::EmptyPassword);
    }
}

//! Store-level error handling with Sentry integration.
//!
//! Every public store operation returns `Result<T, StoreError>`. Nothing here
//! is fatal: a front end shows [`StoreError::user_message`] as a transient
//! notice and carries on.

use thiserror::Error;

use shopfront_core::{Identity, ProductId, ValidationError};

use crate::api::ApiError;
use crate::storage::StorageError;

/// Store operation that reached the remote API.
///
/// Carries the generic message shown when the server gives no reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Login,
    Register,
    FetchProfile,
    UpdateProfile,
    RefreshCart,
    AddToCart,
    UpdateCartItem,
    RemoveFromCart,
    ClearCart,
}

impl Operation {
    /// Message shown when the server response carries no message of its own.
    #[must_use]
    pub const fn fallback_message(self) -> &'static str {
        match self {
            Self::Login => "Login failed",
            Self::Register => "Registration failed",
            Self::FetchProfile => "Failed to fetch profile",
            Self::UpdateProfile => "Profile update failed",
            Self::RefreshCart => "Failed to fetch cart",
            Self::AddToCart => "Failed to add to cart",
            Self::UpdateCartItem => "Failed to update cart item",
            Self::RemoveFromCart => "Failed to remove from cart",
            Self::ClearCart => "Failed to clear cart",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Login => "login",
            Self::Register => "register",
            Self::FetchProfile => "fetch profile",
            Self::UpdateProfile => "update profile",
            Self::RefreshCart => "refresh cart",
            Self::AddToCart => "add to cart",
            Self::UpdateCartItem => "update cart item",
            Self::RemoveFromCart => "remove from cart",
            Self::ClearCart => "clear cart",
        };
        f.write_str(name)
    }
}

/// Errors returned by [`SessionStore`](crate::SessionStore) and
/// [`CartStore`](crate::CartStore) operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The operation needs an authenticated session.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The remote API call failed (transport error or non-2xx response).
    #[error("{operation} failed: {source}")]
    Remote {
        operation: Operation,
        #[source]
        source: ApiError,
    },

    /// Form input rejected before any network call.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A zero quantity or zero adjustment.
    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    /// A decrement that would leave a cart line below one unit.
    #[error("Quantity of {product_id} cannot go below 1")]
    QuantityFloor { product_id: ProductId },

    /// The session changed while the request was in flight; the response
    /// was discarded.
    #[error("Session changed while the request was in flight")]
    SessionChanged,

    /// The credential could not be persisted.
    #[error("Credential storage error: {0}")]
    Storage(#[from] StorageError),
}

impl StoreError {
    pub(crate) const fn remote(operation: Operation, source: ApiError) -> Self {
        Self::Remote { operation, source }
    }

    /// Wrap a remote failure, log it and report it to Sentry if warranted.
    pub(crate) fn reported(operation: Operation, source: ApiError) -> Self {
        let err = Self::remote(operation, source);
        tracing::warn!(error = %err, "Remote call failed");
        err.capture();
        err
    }

    /// Human-readable message for display.
    ///
    /// Remote failures use the server's message when it sent one, otherwise
    /// the operation's generic message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Remote { operation, source } => source
                .server_message()
                .map_or_else(|| operation.fallback_message().to_string(), String::from),
            Self::Storage(_) => "Could not save your session on this device".to_string(),
            _ => self.to_string(),
        }
    }

    /// Returns `true` for failures caused by the caller's input.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::InvalidQuantity | Self::QuantityFloor { .. }
        )
    }

    /// Report server-side failures to Sentry.
    pub(crate) fn capture(&self) {
        if let Self::Remote { source, .. } = self
            && source.is_server_error()
        {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Remote API error"
            );
        }
    }
}

/// Set the Sentry user context from an authenticated identity.
pub fn set_sentry_user(identity: &Identity) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(identity.id.to_string()),
            email: Some(identity.email.to_string()),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Called on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for a user action.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_prefers_server_message() {
        let err = StoreError::remote(
            Operation::Login,
            ApiError::Api {
                status: 401,
                message: Some("Invalid email or password".to_string()),
            },
        );
        assert_eq!(err.user_message(), "Invalid email or password");
    }

    #[test]
    fn test_user_message_falls_back_per_operation() {
        let err = StoreError::remote(
            Operation::AddToCart,
            ApiError::Api {
                status: 502,
                message: None,
            },
        );
        assert_eq!(err.user_message(), "Failed to add to cart");

        let err = StoreError::remote(Operation::Register, ApiError::Parse("eof".to_string()));
        assert_eq!(err.user_message(), "Registration failed");
    }

    #[test]
    fn test_precondition_messages() {
        assert_eq!(StoreError::NotAuthenticated.user_message(), "Not authenticated");
        let err = StoreError::QuantityFloor {
            product_id: ProductId::new("p-1"),
        };
        assert!(err.is_validation());
        assert_eq!(err.user_message(), "Quantity of p-1 cannot go below 1");
    }
}

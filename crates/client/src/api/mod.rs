//! Remote storefront API.
//!
//! # Architecture
//!
//! - [`RemoteApi`] is the seam between the stores and the backend; the stores
//!   are generic over it so tests can substitute an in-process fake
//! - [`HttpApi`] is the production implementation over `reqwest`
//! - The bearer credential is an explicit argument of every authenticated
//!   call; there is no process-wide default header
//!
//! # Endpoints
//!
//! User and profile endpoints live under `v1`, cart and product endpoints
//! under `v3`, both relative to the configured base URL.

mod http;
mod types;

pub use http::HttpApi;
pub use types::{AddToCartBody, CartCountResponse, CartListResponse, LoginResponse, UpdateCartBody};

use std::future::Future;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use shopfront_core::{
    CartItem, Credential, Identity, LoginRequest, ProductId, ProfileUpdate, QuantityChange,
    SignupRequest,
};

/// Errors that can occur when calling the remote API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed (connection, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned a non-success status.
    #[error("API error: {status}{}", .message.as_deref().map(|m| format!(" - {m}")).unwrap_or_default())]
    Api {
        status: u16,
        /// The `message` field of the error body, when present.
        message: Option<String>,
    },

    /// Response body did not have the expected shape.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The configured base URL cannot carry a path.
    #[error("Invalid API base URL: {0}")]
    InvalidBaseUrl(String),
}

impl ApiError {
    /// Message supplied by the server, if any.
    #[must_use]
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Api {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => Some(message),
            _ => None,
        }
    }

    /// Returns `true` for 401/403 responses.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Api { status: 401 | 403, .. })
    }

    /// Returns `true` for 5xx responses.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(self, Self::Api { status: 500..=599, .. })
    }
}

/// Operations the storefront backend offers to the session and cart stores.
///
/// Implementations must be cheap to share; the stores hold one instance for
/// their whole lifetime.
pub trait RemoteApi: Send + Sync + 'static {
    /// `POST /v1/user/login`
    fn login(
        &self,
        request: &LoginRequest,
    ) -> impl Future<Output = Result<LoginResponse, ApiError>> + Send;

    /// `POST /v1/user/signup`; returns the created record as sent by the server.
    fn signup(
        &self,
        request: &SignupRequest,
    ) -> impl Future<Output = Result<Value, ApiError>> + Send;

    /// `GET /v1/user/profile/`
    fn profile(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<Identity, ApiError>> + Send;

    /// `PUT /v1/user/profile/name`; returns the fields the server changed.
    fn update_profile(
        &self,
        credential: &Credential,
        update: &ProfileUpdate,
    ) -> impl Future<Output = Result<Map<String, Value>, ApiError>> + Send;

    /// `GET /v3/user/cart/list`
    fn cart_items(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<Vec<CartItem>, ApiError>> + Send;

    /// `GET /v3/user/cart/item/count`
    fn cart_count(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<u32, ApiError>> + Send;

    /// `POST /v3/product/add/cart/{productId}`
    fn add_to_cart(
        &self,
        credential: &Credential,
        product_id: &ProductId,
        quantity: u32,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// `POST /v3/user/cart/{productId}/update`
    fn update_cart_item(
        &self,
        credential: &Credential,
        product_id: &ProductId,
        change: QuantityChange,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// `POST /v3/product/delete/cart/{productId}`
    fn remove_from_cart(
        &self,
        credential: &Credential,
        product_id: &ProductId,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// `DELETE /v3/user/cart/flush`
    fn flush_cart(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}

impl<T: RemoteApi> RemoteApi for Arc<T> {
    fn login(
        &self,
        request: &LoginRequest,
    ) -> impl Future<Output = Result<LoginResponse, ApiError>> + Send {
        (**self).login(request)
    }

    fn signup(
        &self,
        request: &SignupRequest,
    ) -> impl Future<Output = Result<Value, ApiError>> + Send {
        (**self).signup(request)
    }

    fn profile(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<Identity, ApiError>> + Send {
        (**self).profile(credential)
    }

    fn update_profile(
        &self,
        credential: &Credential,
        update: &ProfileUpdate,
    ) -> impl Future<Output = Result<Map<String, Value>, ApiError>> + Send {
        (**self).update_profile(credential, update)
    }

    fn cart_items(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<Vec<CartItem>, ApiError>> + Send {
        (**self).cart_items(credential)
    }

    fn cart_count(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<u32, ApiError>> + Send {
        (**self).cart_count(credential)
    }

    fn add_to_cart(
        &self,
        credential: &Credential,
        product_id: &ProductId,
        quantity: u32,
    ) -> impl Future<Output = Result<(), ApiError>> + Send {
        (**self).add_to_cart(credential, product_id, quantity)
    }

    fn update_cart_item(
        &self,
        credential: &Credential,
        product_id: &ProductId,
        change: QuantityChange,
    ) -> impl Future<Output = Result<(), ApiError>> + Send {
        (**self).update_cart_item(credential, product_id, change)
    }

    fn remove_from_cart(
        &self,
        credential: &Credential,
        product_id: &ProductId,
    ) -> impl Future<Output = Result<(), ApiError>> + Send {
        (**self).remove_from_cart(credential, product_id)
    }

    fn flush_cart(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<(), ApiError>> + Send {
        (**self).flush_cart(credential)
    }
}

//! HTTP implementation of [`RemoteApi`] over `reqwest`.

use std::sync::Arc;

use reqwest::{Method, RequestBuilder};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};
use url::Url;

use shopfront_core::{
    CartItem, Credential, Identity, LoginRequest, ProductId, ProfileUpdate, QuantityChange,
    SignupRequest,
};

use super::types::{
    AddToCartBody, CartCountResponse, CartListResponse, ErrorBody, LoginResponse, UpdateCartBody,
};
use super::{ApiError, RemoteApi};
use crate::config::ApiConfig;

/// Version prefix of the user and profile endpoints.
const USER_API: &str = "v1";

/// Version prefix of the cart and product endpoints.
const CART_API: &str = "v3";

/// Maximum number of body characters included in log events.
const BODY_LOG_LIMIT: usize = 500;

fn truncate(body: &str) -> String {
    body.chars().take(BODY_LOG_LIMIT).collect()
}

// =============================================================================
// HttpApi
// =============================================================================

/// Client for the storefront REST API.
///
/// Cheaply cloneable; clones share one connection pool.
#[derive(Clone)]
pub struct HttpApi {
    inner: Arc<HttpApiInner>,
}

struct HttpApiInner {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpApi {
    /// Create a new API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL cannot carry a path or the HTTP
    /// client fails to build.
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        if config.base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidBaseUrl(config.base_url.to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("shopfront/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            inner: Arc::new(HttpApiInner {
                client,
                base_url: config.base_url.clone(),
            }),
        })
    }

    /// The base URL every endpoint is resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Resolve `{base}/{version}/{segments...}`, percent-encoding each segment.
    fn endpoint(&self, version: &str, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidBaseUrl(self.inner.base_url.to_string()))?
            .pop_if_empty()
            .push(version)
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url, credential: Option<&Credential>) -> RequestBuilder {
        let builder = self.inner.client.request(method, url);
        match credential {
            Some(credential) => builder.bearer_auth(credential.expose_secret()),
            None => builder,
        }
    }

    /// Send a request and return the body of a 2xx response.
    async fn execute(&self, request: RequestBuilder) -> Result<String, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|error| error.message);
            debug!(
                status = %status,
                body = %truncate(&body),
                "Remote API returned non-success status"
            );
            return Err(ApiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(body)
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        let body = self.execute(request).await?;
        serde_json::from_str(&body).map_err(|e| {
            warn!(
                error = %e,
                body = %truncate(&body),
                "Failed to parse remote API response"
            );
            ApiError::Parse(e.to_string())
        })
    }
}

impl RemoteApi for HttpApi {
    #[instrument(skip_all, fields(email = %request.email))]
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ApiError> {
        let url = self.endpoint(USER_API, &["user", "login"])?;
        self.execute_json(self.request(Method::POST, url, None).json(request))
            .await
    }

    #[instrument(skip_all, fields(email = %request.email, role = %request.role))]
    async fn signup(&self, request: &SignupRequest) -> Result<Value, ApiError> {
        let url = self.endpoint(USER_API, &["user", "signup"])?;
        self.execute_json(self.request(Method::POST, url, None).json(request))
            .await
    }

    #[instrument(skip_all)]
    async fn profile(&self, credential: &Credential) -> Result<Identity, ApiError> {
        // Trailing empty segment keeps the trailing slash the backend routes on
        let url = self.endpoint(USER_API, &["user", "profile", ""])?;
        self.execute_json(self.request(Method::GET, url, Some(credential)))
            .await
    }

    #[instrument(skip_all)]
    async fn update_profile(
        &self,
        credential: &Credential,
        update: &ProfileUpdate,
    ) -> Result<Map<String, Value>, ApiError> {
        let url = self.endpoint(USER_API, &["user", "profile", "name"])?;
        let body: Value = self
            .execute_json(self.request(Method::PUT, url, Some(credential)).json(update))
            .await?;

        match body {
            Value::Object(fields) => Ok(fields),
            other => Err(ApiError::Parse(format!(
                "expected profile fields, got {other}"
            ))),
        }
    }

    #[instrument(skip_all)]
    async fn cart_items(&self, credential: &Credential) -> Result<Vec<CartItem>, ApiError> {
        let url = self.endpoint(CART_API, &["user", "cart", "list"])?;
        let response: CartListResponse = self
            .execute_json(self.request(Method::GET, url, Some(credential)))
            .await?;

        let items = response.items.unwrap_or_default();
        for item in &items {
            item.validate().map_err(|e| {
                ApiError::Parse(format!("cart line {}: {e}", item.line_id))
            })?;
        }
        Ok(items)
    }

    #[instrument(skip_all)]
    async fn cart_count(&self, credential: &Credential) -> Result<u32, ApiError> {
        let url = self.endpoint(CART_API, &["user", "cart", "item", "count"])?;
        let response: CartCountResponse = self
            .execute_json(self.request(Method::GET, url, Some(credential)))
            .await?;
        Ok(response.count.unwrap_or_default())
    }

    #[instrument(skip(self, credential), fields(product_id = %product_id))]
    async fn add_to_cart(
        &self,
        credential: &Credential,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(CART_API, &["product", "add", "cart", product_id.as_str()])?;
        self.execute(
            self.request(Method::POST, url, Some(credential))
                .json(&AddToCartBody { quantity }),
        )
        .await
        .map(drop)
    }

    #[instrument(skip(self, credential), fields(product_id = %product_id))]
    async fn update_cart_item(
        &self,
        credential: &Credential,
        product_id: &ProductId,
        change: QuantityChange,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(CART_API, &["user", "cart", product_id.as_str(), "update"])?;
        self.execute(
            self.request(Method::POST, url, Some(credential))
                .json(&UpdateCartBody::from(change)),
        )
        .await
        .map(drop)
    }

    #[instrument(skip(self, credential), fields(product_id = %product_id))]
    async fn remove_from_cart(
        &self,
        credential: &Credential,
        product_id: &ProductId,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(CART_API, &["product", "delete", "cart", product_id.as_str()])?;
        self.execute(self.request(Method::POST, url, Some(credential)))
            .await
            .map(drop)
    }

    #[instrument(skip_all)]
    async fn flush_cart(&self, credential: &Credential) -> Result<(), ApiError> {
        let url = self.endpoint(CART_API, &["user", "cart", "flush"])?;
        self.execute(self.request(Method::DELETE, url, Some(credential)))
            .await
            .map(drop)
    }
}

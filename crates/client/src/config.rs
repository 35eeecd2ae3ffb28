//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SHOPFRONT_API_BASE_URL` - Base URL of the storefront API (e.g., `https://shop.example.com/api`)
//!
//! ## Optional
//! - `SHOPFRONT_CREDENTIAL_PATH` - Credential file (default: `.shopfront/credentials.json`)
//! - `SHOPFRONT_HTTP_TIMEOUT_SECS` - Per-request timeout (default: 30)
//! - `SHOPFRONT_FREE_SHIPPING_THRESHOLD` - Subtotal above which shipping is free (default: 500)
//! - `SHOPFRONT_FLAT_SHIPPING` - Shipping charged below the threshold (default: 25)
//! - `SHOPFRONT_TAX_RATE` - Tax as a fraction of the subtotal (default: 0.08)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;
use url::Url;

use shopfront_core::PricingPolicy;

const DEFAULT_CREDENTIAL_PATH: &str = ".shopfront/credentials.json";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Client application configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Remote API connection settings
    pub api: ApiConfig,
    /// File holding the persisted credential
    pub credential_path: PathBuf,
    /// Shipping and tax rules for cart totals
    pub pricing: PricingPolicy,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Remote API connection settings.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL the versioned endpoints are resolved against
    pub base_url: Url,
    /// Per-request timeout
    pub timeout: Duration,
}

impl ApiConfig {
    /// Settings for `base_url` with the default timeout.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    fn from_env() -> Result<Self, ConfigError> {
        let base_url = parse_base_url(&get_required_env("SHOPFRONT_API_BASE_URL")?)?;
        let timeout_secs: u64 = parse_env_or_default(
            "SHOPFRONT_HTTP_TIMEOUT_SECS",
            DEFAULT_TIMEOUT_SECS,
        )?;

        Ok(Self {
            base_url,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api = ApiConfig::from_env()?;
        let credential_path =
            PathBuf::from(get_env_or_default("SHOPFRONT_CREDENTIAL_PATH", DEFAULT_CREDENTIAL_PATH));
        let pricing = pricing_from_env()?;

        Ok(Self {
            api,
            credential_path,
            pricing,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }
}

fn pricing_from_env() -> Result<PricingPolicy, ConfigError> {
    let defaults = PricingPolicy::default();

    let policy = PricingPolicy {
        free_shipping_threshold: parse_env_or_default(
            "SHOPFRONT_FREE_SHIPPING_THRESHOLD",
            defaults.free_shipping_threshold,
        )?,
        flat_shipping: parse_env_or_default("SHOPFRONT_FLAT_SHIPPING", defaults.flat_shipping)?,
        tax_rate: parse_env_or_default("SHOPFRONT_TAX_RATE", defaults.tax_rate)?,
    };

    for (key, value) in [
        ("SHOPFRONT_FREE_SHIPPING_THRESHOLD", policy.free_shipping_threshold),
        ("SHOPFRONT_FLAT_SHIPPING", policy.flat_shipping),
        ("SHOPFRONT_TAX_RATE", policy.tax_rate),
    ] {
        if value < Decimal::ZERO {
            return Err(ConfigError::InvalidEnvVar(
                key.to_string(),
                "must not be negative".to_string(),
            ));
        }
    }

    Ok(policy)
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse and check the API base URL.
fn parse_base_url(value: &str) -> Result<Url, ConfigError> {
    let invalid =
        |reason: String| ConfigError::InvalidEnvVar("SHOPFRONT_API_BASE_URL".to_string(), reason);

    let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme: {}", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("must have a host".to_string()));
    }
    Ok(url)
}

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |value| {
        value
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

//! Command implementations.
//!
//! Every command runs against a [`Context`] whose session has already been
//! restored from the credential file.

pub mod cart;
pub mod session;

use std::sync::Arc;

use thiserror::Error;

use shopfront_client::{
    ApiError, CartStore, ClientConfig, FileCredentialStorage, HttpApi, SessionStore, StoreError,
};
use shopfront_core::{PricingPolicy, ValidationError};

/// Errors surfaced to the terminal.
#[derive(Debug, Error)]
pub enum CliError {
    /// The API client could not be built.
    #[error("API client error: {0}")]
    Api(#[from] ApiError),

    /// A store operation failed.
    #[error("{}", .0.user_message())]
    Store(#[from] StoreError),

    /// Form input was rejected.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// The command needs a signed-in session.
    #[error("Not signed in. Run `shopfront login` first.")]
    NotSignedIn,

    /// Arguments were accepted by the parser but make no sense together.
    #[error("{0}")]
    InvalidArgument(String),
}

/// Stores shared by every command.
pub struct Context {
    pub session: SessionStore<HttpApi>,
    pub cart: CartStore<HttpApi>,
    pub pricing: PricingPolicy,
}

impl Context {
    /// Build the stores and restore the persisted session.
    ///
    /// # Errors
    ///
    /// Returns an error if the API client cannot be built or the session
    /// changed during restore.
    pub async fn connect(config: &ClientConfig) -> Result<Self, CliError> {
        let api = HttpApi::new(&config.api)?;
        let storage = Arc::new(FileCredentialStorage::new(&config.credential_path));

        let session = SessionStore::new(api, storage);
        if session.initialize().await?.is_none() {
            tracing::debug!("Starting without a session");
        }

        Ok(Self {
            cart: CartStore::new(session.clone()),
            session,
            pricing: config.pricing,
        })
    }

    /// Fail early when the command needs a session.
    pub(crate) fn require_session(&self) -> Result<(), CliError> {
        if self.session.is_authenticated() {
            Ok(())
        } else {
            Err(CliError::NotSignedIn)
        }
    }
}

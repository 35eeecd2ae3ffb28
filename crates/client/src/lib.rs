//! Shopfront Client - Session and cart synchronization.
//!
//! This crate keeps a local, observable picture of two pieces of server
//! state: who is signed in, and what is in their cart.
//!
//! # Architecture
//!
//! - [`SessionStore`] owns the credential and identity. It restores a
//!   persisted session at startup and publishes every transition.
//! - [`CartStore`] caches the signed-in user's cart. The server is the
//!   source of truth; every mutation is followed by a re-fetch.
//! - Both stores talk to the backend through [`RemoteApi`]. [`HttpApi`] is
//!   the `reqwest` implementation.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = ClientConfig::from_env()?;
//! let api = HttpApi::new(&config.api)?;
//! let storage = Arc::new(FileCredentialStorage::new(&config.credential_path));
//!
//! let session = SessionStore::new(api, storage);
//! session.initialize().await?;
//!
//! let cart = CartStore::new(session.clone());
//! cart.refresh().await?;
//! println!("{} items", cart.count());
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod config;
pub mod error;
pub mod session;
pub mod storage;

#[cfg(test)]
mod testing;

pub use api::{ApiError, HttpApi, RemoteApi};
pub use cart::CartStore;
pub use config::{ApiConfig, ClientConfig, ConfigError};
pub use error::{Operation, StoreError};
pub use session::{SessionSignal, SessionSnapshot, SessionStore};
pub use storage::{CredentialStorage, FileCredentialStorage, MemoryCredentialStorage, StorageError};

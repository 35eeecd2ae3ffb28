//! Shopfront Core - Shared types library.
//!
//! This crate provides the types shared by every Shopfront component:
//! - `client` - Session and cart stores backed by the remote storefront API
//! - `cli` - Command-line front end driving the stores
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no storage. Cart totals are computed here so any front end can
//! render them without pulling in the network stack.
//!
//! # Modules
//!
//! - [`types`] - Identifiers, emails, credentials, identities, cart lines and pricing

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;

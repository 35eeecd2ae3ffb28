//! Core types for Shopfront.
//!
//! This module provides type-safe wrappers for the session and cart domain.

pub mod cart;
pub mod credential;
pub mod email;
pub mod id;
pub mod pricing;
pub mod status;
pub mod user;

pub use cart::{CartItem, CartItemError, CartSnapshot, MAX_UNIT_PRICE, QuantityChange};
pub use credential::Credential;
pub use email::{Email, EmailError};
pub use id::*;
pub use pricing::{CartTotals, PricingPolicy, format_amount, subtotal};
pub use status::*;
pub use user::{
    Identity, LoginForm, LoginRequest, MIN_PASSWORD_LENGTH, ProfileUpdate, SignupForm,
    SignupRequest, ValidationError,
};

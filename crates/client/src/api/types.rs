//! Request and response bodies of the storefront API.

use serde::{Deserialize, Serialize};

use shopfront_core::{CartItem, Identity, QuantityChange};

/// Successful login: the bearer token and the account it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: Identity,
}

/// Cart list payload. A missing or null `items` means an empty cart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CartListResponse {
    #[serde(default)]
    pub items: Option<Vec<CartItem>>,
}

/// Cart count payload. A missing or null `count` means zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CartCountResponse {
    #[serde(default)]
    pub count: Option<u32>,
}

/// Body of the add-to-cart call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AddToCartBody {
    pub quantity: u32,
}

/// Body of the cart update call: exactly one of `inc` / `dec` is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCartBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inc: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dec: Option<u32>,
}

impl From<QuantityChange> for UpdateCartBody {
    fn from(change: QuantityChange) -> Self {
        match change {
            QuantityChange::Increment(n) => Self {
                inc: Some(n),
                dec: None,
            },
            QuantityChange::Decrement(n) => Self {
                inc: None,
                dec: Some(n),
            },
        }
    }
}

/// Error body; only `message` is used.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

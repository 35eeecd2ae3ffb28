//! Cart snapshot types.
//!
//! A [`CartSnapshot`] is the client's cached copy of the server-held cart. It
//! is replaced wholesale by re-fetching, never patched from local deltas.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::id::{CartLineId, ProductId};

/// Largest unit price accepted on a cart line, in whole currency units.
pub const MAX_UNIT_PRICE: i64 = 1_000_000_000;

/// A cart line the server sent that breaks the line invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartItemError {
    #[error("negative unit price {0}")]
    NegativePrice(Decimal),

    #[error("unit price {0} is above the accepted maximum")]
    PriceTooLarge(Decimal),

    #[error("quantity must be at least 1")]
    ZeroQuantity,
}

/// One line of the cart as returned by the cart list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    #[serde(rename = "_id", alias = "id")]
    pub line_id: CartLineId,
    pub product_id: ProductId,
    #[serde(default)]
    pub product_name: String,
    #[serde(rename = "price")]
    pub unit_price: Decimal,
    pub quantity: u32,
    #[serde(default)]
    pub brand: String,
    #[serde(default, rename = "image", skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
}

impl CartItem {
    /// Unit price times quantity, saturating at [`Decimal::MAX`].
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price.saturating_mul(Decimal::from(self.quantity))
    }

    /// Check `0 <= unit_price <= MAX_UNIT_PRICE` and `quantity >= 1`.
    ///
    /// # Errors
    ///
    /// Returns the first violated bound.
    pub fn validate(&self) -> Result<(), CartItemError> {
        if self.unit_price < Decimal::ZERO {
            return Err(CartItemError::NegativePrice(self.unit_price));
        }
        if self.unit_price > Decimal::from(MAX_UNIT_PRICE) {
            return Err(CartItemError::PriceTooLarge(self.unit_price));
        }
        if self.quantity == 0 {
            return Err(CartItemError::ZeroQuantity);
        }
        Ok(())
    }
}

/// Cached view of the server-held cart.
///
/// `count` comes from the server's count endpoint and is not derived from
/// `items`; the two may briefly disagree while fetches are in flight.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSnapshot {
    pub items: Vec<CartItem>,
    pub count: u32,
}

impl CartSnapshot {
    /// An empty cart with a zero count.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            items: Vec::new(),
            count: 0,
        }
    }

    /// Returns `true` when there are no lines and the count is zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.count == 0
    }

    /// Find the line holding `product_id`.
    #[must_use]
    pub fn line(&self, product_id: &ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| &item.product_id == product_id)
    }

    /// Sum of unit price times quantity over every line.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        super::pricing::subtotal(&self.items)
    }
}

/// A quantity adjustment for an existing cart line.
///
/// Increment and decrement are mutually exclusive per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityChange {
    Increment(u32),
    Decrement(u32),
}

impl QuantityChange {
    /// Size of the adjustment.
    #[must_use]
    pub const fn amount(self) -> u32 {
        match self {
            Self::Increment(n) | Self::Decrement(n) => n,
        }
    }

    /// Quantity after applying this change to `current`, or `None` when the
    /// result would drop below one.
    #[must_use]
    pub fn apply_to(self, current: u32) -> Option<u32> {
        match self {
            Self::Increment(n) => Some(current.saturating_add(n)),
            Self::Decrement(n) => current.checked_sub(n).filter(|&left| left >= 1),
        }
    }
}

//! Cart totals using decimal arithmetic.
//!
//! Subtotal, shipping and tax are derived on the client from the current
//! snapshot. Amounts keep full decimal precision; rounding to cents happens
//! only in [`format_amount`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::cart::CartItem;

/// Sum of unit price times quantity, saturating at [`Decimal::MAX`].
#[must_use]
pub fn subtotal(items: &[CartItem]) -> Decimal {
    items
        .iter()
        .map(CartItem::line_total)
        .fold(Decimal::ZERO, Decimal::saturating_add)
}

/// Format an amount as dollars with two decimal places (e.g. `$19.99`).
#[must_use]
pub fn format_amount(amount: Decimal) -> String {
    format!("${:.2}", amount.round_dp(2))
}

/// Shipping and tax rules applied to a subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    /// Orders with a subtotal strictly above this ship free.
    pub free_shipping_threshold: Decimal,
    /// Shipping charged below the threshold.
    pub flat_shipping: Decimal,
    /// Tax as a fraction of the subtotal (0.08 = 8%).
    pub tax_rate: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            free_shipping_threshold: Decimal::from(500),
            flat_shipping: Decimal::from(25),
            tax_rate: Decimal::new(8, 2),
        }
    }
}

impl PricingPolicy {
    /// Compute totals for a list of cart lines.
    ///
    /// An empty cart has no shipping charge.
    #[must_use]
    pub fn totals(&self, items: &[CartItem]) -> CartTotals {
        let subtotal = subtotal(items);

        let shipping = if items.is_empty() || subtotal > self.free_shipping_threshold {
            Decimal::ZERO
        } else {
            self.flat_shipping
        };

        let tax = subtotal.saturating_mul(self.tax_rate);

        let amount_until_free_shipping = (!shipping.is_zero())
            .then(|| self.free_shipping_threshold.saturating_sub(subtotal))
            .filter(|remaining| *remaining > Decimal::ZERO);

        CartTotals {
            subtotal,
            shipping,
            tax,
            total: subtotal.saturating_add(shipping).saturating_add(tax),
            amount_until_free_shipping,
        }
    }
}

/// Derived order totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartTotals {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    /// How much more the customer must add to qualify for free shipping.
    pub amount_until_free_shipping: Option<Decimal>,
}

impl CartTotals {
    /// Returns `true` when no shipping is charged.
    #[must_use]
    pub fn is_free_shipping(&self) -> bool {
        self.shipping.is_zero()
    }
}

//! Cart commands.

use tracing::info;

use shopfront_core::{CartSnapshot, ProductId, QuantityChange, format_amount};

use super::{CliError, Context};

fn print_lines(snapshot: &CartSnapshot) {
    if snapshot.items.is_empty() {
        info!("Your cart is empty");
        return;
    }

    for item in &snapshot.items {
        info!(
            "{:<16} {} ({}) x{} @ {} = {}",
            item.product_id.as_str(),
            item.product_name,
            item.brand,
            item.quantity,
            format_amount(item.unit_price),
            format_amount(item.line_total()),
        );
    }
    info!("{} item(s), subtotal {}", snapshot.count, format_amount(snapshot.subtotal()));
}

pub async fn list(ctx: &Context) -> Result<(), CliError> {
    ctx.require_session()?;
    let snapshot = ctx.cart.refresh().await?;
    print_lines(&snapshot);
    Ok(())
}

pub async fn add(ctx: &Context, product_id: &str, quantity: u32) -> Result<(), CliError> {
    ctx.require_session()?;
    let snapshot = ctx.cart.add_item(&ProductId::new(product_id), quantity).await?;
    info!("Added {quantity} x {product_id}");
    print_lines(&snapshot);
    Ok(())
}

pub async fn adjust(
    ctx: &Context,
    product_id: &str,
    change: QuantityChange,
) -> Result<(), CliError> {
    ctx.require_session()?;
    // Decrements are checked against the current quantity
    ctx.cart.refresh().await?;
    let snapshot = ctx
        .cart
        .update_item_quantity(&ProductId::new(product_id), change)
        .await?;
    print_lines(&snapshot);
    Ok(())
}

pub async fn remove(ctx: &Context, product_id: &str) -> Result<(), CliError> {
    ctx.require_session()?;
    let snapshot = ctx.cart.remove_item(&ProductId::new(product_id)).await?;
    info!("Removed {product_id}");
    print_lines(&snapshot);
    Ok(())
}

pub async fn clear(ctx: &Context) -> Result<(), CliError> {
    ctx.require_session()?;
    ctx.cart.clear().await?;
    info!("Cart cleared");
    Ok(())
}

pub async fn totals(ctx: &Context) -> Result<(), CliError> {
    ctx.require_session()?;
    ctx.cart.refresh().await?;
    let totals = ctx.cart.totals(&ctx.pricing);

    info!("Subtotal: {}", format_amount(totals.subtotal));
    if totals.is_free_shipping() {
        info!("Shipping: free");
    } else {
        info!("Shipping: {}", format_amount(totals.shipping));
    }
    info!("Tax:      {}", format_amount(totals.tax));
    info!("Total:    {}", format_amount(totals.total));
    if let Some(remaining) = totals.amount_until_free_shipping {
        info!("Add {} more for free shipping", format_amount(remaining));
    }
    Ok(())
}

//! Shopping cart types.
//!
//! Totals are never stored. [`Cart::subtotal`] and [`Cart::total_items`]
//! recompute from the item list on every call, so they cannot drift from the
//! lines they summarize.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use vic_shop_core::{CartId, CartItemId, Price, ProductId, UserId};

/// A user's cart. Created lazily on first access.
#[derive(Debug, Clone)]
pub struct Cart {
    pub id: CartId,
    pub user_id: UserId,
    /// Lines in insertion order.
    pub items: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Σ unit price × quantity over all lines.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Σ quantity over all lines.
    #[must_use]
    pub fn total_items(&self) -> i64 {
        self.items.iter().map(|item| i64::from(item.quantity)).sum()
    }

    /// The line holding `product_id`, if any.
    #[must_use]
    pub fn item_for_product(&self, product_id: ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.product_id == product_id)
    }

    /// The line with `item_id`, if any.
    #[must_use]
    pub fn item(&self, item_id: CartItemId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// One cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub product_id: ProductId,
    pub product_name: String,
    /// Always at least 1.
    pub quantity: i32,
    /// Price snapshot taken when the line was added or last merged.
    pub unit_price: Price,
}

impl CartItem {
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price.line_total(self.quantity)
    }
}

/// Data for inserting a cart line.
#[derive(Debug, Clone)]
pub struct NewCartItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Price,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn item(id: i32, product: i32, quantity: i32, cents: i64) -> CartItem {
        CartItem {
            id: CartItemId::new(id),
            product_id: ProductId::new(product),
            product_name: format!("product {product}"),
            quantity,
            unit_price: Price::from_cents(cents).unwrap(),
        }
    }

    #[test]
    fn test_totals_follow_items() {
        let now = Utc::now();
        let mut cart = Cart {
            id: CartId::new(1),
            user_id: UserId::new(1),
            items: vec![item(1, 1, 2, 1000), item(2, 2, 1, 250)],
            created_at: now,
            updated_at: now,
        };
        assert_eq!(cart.subtotal(), Decimal::new(2250, 2));
        assert_eq!(cart.total_items(), 3);

        cart.items.retain(|i| i.id != CartItemId::new(1));
        assert_eq!(cart.subtotal(), Decimal::new(250, 2));
        assert_eq!(cart.total_items(), 1);
    }

    #[test]
    fn test_empty_cart_totals_are_zero() {
        let now = Utc::now();
        let cart = Cart {
            id: CartId::new(1),
            user_id: UserId::new(1),
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        assert!(cart.is_empty());
        assert_eq!(cart.subtotal(), Decimal::ZERO);
        assert_eq!(cart.total_items(), 0);
    }
}

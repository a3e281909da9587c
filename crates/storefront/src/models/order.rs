//! Order types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use vic_shop_core::{OrderId, OrderItemId, OrderStatus, Price, ProductId, UserId};

/// A placed order. Item prices are frozen at placement.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: OrderId,
    /// Human-facing reference, e.g. `ORD-20261018093000-0042`.
    pub order_number: String,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    /// Σ item subtotals.
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub shipping_address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Σ quantity over all items.
    #[must_use]
    pub fn total_units(&self) -> i64 {
        self.items.iter().map(|item| i64::from(item.quantity)).sum()
    }
}

/// One order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Price,
    pub subtotal: Decimal,
}

/// Data for inserting an order with its items.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: String,
    pub user_id: UserId,
    pub items: Vec<NewOrderItem>,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub shipping_address: String,
    pub created_at: DateTime<Utc>,
}

/// Data for inserting an order line.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Price,
    pub subtotal: Decimal,
}

/// A requested order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: i32,
}

/// Where an order ships to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ShippingAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    #[serde(default)]
    pub country: Option<String>,
}

impl ShippingAddress {
    /// Names of required parts that are blank.
    #[must_use]
    pub fn blank_fields(&self) -> Vec<&'static str> {
        [
            ("street", &self.street),
            ("city", &self.city),
            ("state", &self.state),
            ("postal_code", &self.postal_code),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

impl std::fmt::Display for ShippingAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, {}, {} {}",
            self.street.trim(),
            self.city.trim(),
            self.state.trim(),
            self.postal_code.trim()
        )?;
        if let Some(country) = self.country.as_deref().map(str::trim)
            && !country.is_empty()
        {
            write!(f, ", {country}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> ShippingAddress {
        ShippingAddress {
            street: "1 Main St".to_owned(),
            city: "Springfield".to_owned(),
            state: "IL".to_owned(),
            postal_code: "62701".to_owned(),
            country: None,
        }
    }

    #[test]
    fn test_address_formatting() {
        assert_eq!(address().to_string(), "1 Main St, Springfield, IL 62701");

        let with_country = ShippingAddress {
            country: Some(" USA ".to_owned()),
            ..address()
        };
        assert_eq!(
            with_country.to_string(),
            "1 Main St, Springfield, IL 62701, USA"
        );
    }

    #[test]
    fn test_blank_fields() {
        assert!(address().blank_fields().is_empty());

        let partial = ShippingAddress {
            city: "  ".to_owned(),
            postal_code: String::new(),
            ..address()
        };
        assert_eq!(partial.blank_fields(), vec!["city", "postal_code"]);
    }
}

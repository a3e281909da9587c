//! Catalog product types.

use std::cmp::Ordering;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vic_shop_core::{Price, ProductId, UserId};

/// A sellable product with its current stock level.
///
/// `stock_quantity` is never negative; the engines check before every
/// decrement and the database enforces it with a `CHECK` constraint.
#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub price: Price,
    pub stock_quantity: i32,
    pub image_url: Option<String>,
    pub category: Option<String>,
    pub size: Option<String>,
    /// Administrator who created the product.
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a product.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Price,
    pub stock_quantity: i32,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
}

/// Partial update of a product. `None` leaves a field unchanged.
///
/// Stock is not part of this; use the stock adjustment operation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Price>,
    pub image_url: Option<String>,
    pub category: Option<String>,
    pub size: Option<String>,
}

impl ProductUpdate {
    /// Apply the present fields to `product`.
    pub fn apply_to(self, product: &mut Product) {
        if let Some(name) = self.name {
            product.name = name;
        }
        if let Some(description) = self.description {
            product.description = Some(description);
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(image_url) = self.image_url {
            product.image_url = Some(image_url);
        }
        if let Some(category) = self.category {
            product.category = Some(category);
        }
        if let Some(size) = self.size {
            product.size = Some(size);
        }
    }
}

/// Column a product listing is ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProductSortField {
    #[default]
    Id,
    Name,
    Price,
    Stock,
    CreatedAt,
}

impl ProductSortField {
    /// SQL column name. Only ever one of a fixed set.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Price => "price",
            Self::Stock => "stock_quantity",
            Self::CreatedAt => "created_at",
        }
    }
}

/// Ordering of a product listing, parsed from `field[,asc|desc]`.
///
/// The default is ascending id. Ties are always broken by id so pages
/// stay stable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProductSort {
    pub field: ProductSortField,
    pub descending: bool,
}

impl ProductSort {
    /// SQL `ORDER BY` clause body.
    #[must_use]
    pub fn order_by(&self) -> String {
        let direction = if self.descending { "DESC" } else { "ASC" };
        if self.field == ProductSortField::Id {
            format!("id {direction}")
        } else {
            format!("{} {direction}, id ASC", self.field.column())
        }
    }

    /// Compare two products the way [`Self::order_by`] orders rows.
    #[must_use]
    pub fn compare(&self, a: &Product, b: &Product) -> Ordering {
        let primary = match self.field {
            ProductSortField::Id => a.id.cmp(&b.id),
            ProductSortField::Name => a.name.cmp(&b.name),
            ProductSortField::Price => a.price.cmp(&b.price),
            ProductSortField::Stock => a.stock_quantity.cmp(&b.stock_quantity),
            ProductSortField::CreatedAt => a.created_at.cmp(&b.created_at),
        };
        let primary = if self.descending {
            primary.reverse()
        } else {
            primary
        };
        if self.field == ProductSortField::Id {
            primary
        } else {
            primary.then_with(|| a.id.cmp(&b.id))
        }
    }
}

impl FromStr for ProductSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(',').map(str::trim);
        let field = match parts.next().unwrap_or_default() {
            "id" => ProductSortField::Id,
            "name" => ProductSortField::Name,
            "price" => ProductSortField::Price,
            "stock" | "stock_quantity" | "stockQuantity" => ProductSortField::Stock,
            "created_at" | "createdAt" => ProductSortField::CreatedAt,
            other => return Err(format!("cannot sort products by '{other}'")),
        };
        let descending = match parts.next().map(str::to_ascii_lowercase).as_deref() {
            None | Some("asc") => false,
            Some("desc") => true,
            Some(other) => return Err(format!("unknown sort direction '{other}'")),
        };
        if parts.next().is_some() {
            return Err(format!("malformed sort '{s}'"));
        }
        Ok(Self { field, descending })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sort() {
        assert_eq!("".parse::<ProductSort>().ok(), None);
        assert_eq!("id".parse::<ProductSort>(), Ok(ProductSort::default()));
        assert_eq!(
            "price,desc".parse::<ProductSort>(),
            Ok(ProductSort {
                field: ProductSortField::Price,
                descending: true,
            })
        );
        assert_eq!(
            "createdAt,ASC".parse::<ProductSort>(),
            Ok(ProductSort {
                field: ProductSortField::CreatedAt,
                descending: false,
            })
        );
        assert!("password_hash".parse::<ProductSort>().is_err());
        assert!("name,sideways".parse::<ProductSort>().is_err());
        assert!("name,asc,extra".parse::<ProductSort>().is_err());
    }

    #[test]
    fn test_order_by_breaks_ties_on_id() {
        assert_eq!(ProductSort::default().order_by(), "id ASC");
        let by_price = ProductSort {
            field: ProductSortField::Price,
            descending: true,
        };
        assert_eq!(by_price.order_by(), "price DESC, id ASC");
    }
}

//! Domain models for the storefront.
//!
//! These are validated domain types, separate from database row types. None of
//! them know about sessions or HTTP; the acting user is passed to services as
//! an explicit [`Principal`].

pub mod cart;
pub mod order;
pub mod product;
pub mod session;
pub mod token;
pub mod user;

use serde::Deserialize;

pub use cart::{Cart, CartItem, NewCartItem};
pub use order::{NewOrder, NewOrderItem, Order, OrderItem, OrderLine, ShippingAddress};
pub use product::{NewProduct, Product, ProductSort, ProductSortField, ProductUpdate};
pub use session::{CurrentUser, keys as session_keys};
pub use token::{NewToken, VerificationToken};
pub use user::{NewUser, PostalAddress, Principal, User};

/// Offset pagination for list operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Page {
    /// Zero-based page number.
    pub page: u32,
    /// Items per page, capped at [`Page::MAX_SIZE`].
    pub size: u32,
}

impl Page {
    /// Default page size.
    pub const DEFAULT_SIZE: u32 = 20;
    /// Largest accepted page size.
    pub const MAX_SIZE: u32 = 100;

    /// Create a page, clamping the size into `1..=MAX_SIZE`.
    #[must_use]
    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page,
            size: size.clamp(1, Self::MAX_SIZE),
        }
    }

    /// SQL `LIMIT`.
    #[must_use]
    pub fn limit(&self) -> i64 {
        i64::from(self.size.clamp(1, Self::MAX_SIZE))
    }

    /// SQL `OFFSET`.
    #[must_use]
    pub fn offset(&self) -> i64 {
        i64::from(self.page) * self.limit()
    }

    /// Apply this page to an in-memory, already ordered list.
    #[must_use]
    pub fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        let skip = usize::try_from(self.offset()).unwrap_or(usize::MAX);
        let take = usize::try_from(self.limit()).unwrap_or(usize::MAX);
        items.into_iter().skip(skip).take(take).collect()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 0,
            size: Self::DEFAULT_SIZE,
        }
    }
}

//! Persistence for the storefront.
//!
//! # Units of work
//!
//! Every service operation runs inside one [`UnitOfWork`] obtained from
//! [`Store::begin`]. A unit of work exposes the entity repositories and ends
//! with [`UnitOfWork::commit`]. Dropping it without committing rolls back, so
//! an early return through `?` never leaves a partial write behind.
//!
//! The `lock_*` methods read a row and hold it until the unit of work ends.
//! Callers take product locks in ascending id order.
//!
//! # Backends
//!
//! - [`postgres::PgStore`] - `PostgreSQL`, schema `shop`
//! - [`memory::MemoryStore`] - in-process, serializes units of work
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p vic-shop-cli -- migrate
//! ```

pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use vic_shop_core::{
    CartId, CartItemId, Email, OrderId, OrderStatus, ProductId, TokenId, TokenKind, UserId,
    UserRole,
};

use crate::models::{
    Cart, CartItem, NewCartItem, NewOrder, NewProduct, NewToken, NewUser, Order, Page, Product,
    ProductSort, User, VerificationToken,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// Lock wait timed out, deadlock, or serialization failure. Retryable.
    #[error("contention: {0}")]
    Contention(String),
}

/// `lock_not_available`, `deadlock_detected`, `serialization_failure`.
const CONTENTION_CODES: [&str; 3] = ["55P03", "40P01", "40001"];

impl From<sqlx::Error> for RepositoryError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err
                .code()
                .is_some_and(|code| CONTENTION_CODES.contains(&code.as_ref()))
        {
            return Self::Contention(db_err.message().to_owned());
        }
        Self::Database(e)
    }
}

/// Source of units of work.
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a unit of work.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if no connection or transaction can be opened.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, RepositoryError>;

    /// Check that the backend is reachable.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the backend does not answer.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// A transactional scope over all repositories.
#[async_trait]
pub trait UnitOfWork:
    UserRepository + ProductRepository + CartRepository + OrderRepository + TokenRepository + Send
{
    /// Make every write of this unit of work visible at once.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the commit fails; nothing is applied.
    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;

    /// Discard every write of this unit of work.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the backend reports a rollback failure.
    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError>;
}

/// User rows.
#[async_trait]
pub trait UserRepository: Send {
    async fn get_user(&mut self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// Read and lock a user row.
    async fn lock_user(&mut self, id: UserId) -> Result<Option<User>, RepositoryError>;

    async fn get_user_by_email(&mut self, email: &Email) -> Result<Option<User>, RepositoryError>;

    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email is taken.
    async fn insert_user(&mut self, user: NewUser) -> Result<User, RepositoryError>;

    /// Persist every mutable field of `user`.
    async fn update_user(&mut self, user: &User) -> Result<(), RepositoryError>;

    /// Delete a user with their cart, tokens and orders.
    async fn delete_user(&mut self, id: UserId) -> Result<bool, RepositoryError>;

    async fn list_users(&mut self, role: Option<UserRole>) -> Result<Vec<User>, RepositoryError>;

    /// Lock every administrator row in id order and return their ids.
    async fn lock_admins(&mut self) -> Result<Vec<UserId>, RepositoryError>;
}

/// Product rows.
#[async_trait]
pub trait ProductRepository: Send {
    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Read and lock a product row.
    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Products in `sort` order, optionally filtered by exact category.
    async fn list_products(
        &mut self,
        category: Option<&str>,
        sort: ProductSort,
        page: Page,
    ) -> Result<Vec<Product>, RepositoryError>;

    /// Products whose name or description contains `query`, ignoring case.
    /// Ordered by id.
    async fn search_products(
        &mut self,
        query: &str,
        page: Page,
    ) -> Result<Vec<Product>, RepositoryError>;

    /// Every product, ordered by id.
    async fn all_products(&mut self) -> Result<Vec<Product>, RepositoryError>;

    async fn insert_product(
        &mut self,
        product: NewProduct,
        created_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<Product, RepositoryError>;

    /// Persist every mutable field of `product`, including stock.
    async fn update_product(&mut self, product: &Product) -> Result<(), RepositoryError>;

    /// Delete a product and any cart lines holding it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if an order item references it.
    async fn delete_product(&mut self, id: ProductId) -> Result<bool, RepositoryError>;
}

/// Cart rows.
#[async_trait]
pub trait CartRepository: Send {
    async fn get_cart(&mut self, user_id: UserId) -> Result<Option<Cart>, RepositoryError>;

    /// Read and lock a user's cart.
    async fn lock_cart(&mut self, user_id: UserId) -> Result<Option<Cart>, RepositoryError>;

    /// Create an empty cart, or return the existing one.
    async fn create_cart(
        &mut self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Cart, RepositoryError>;

    async fn insert_cart_item(
        &mut self,
        cart_id: CartId,
        item: NewCartItem,
        now: DateTime<Utc>,
    ) -> Result<CartItem, RepositoryError>;

    async fn update_cart_item(
        &mut self,
        cart_id: CartId,
        item: &CartItem,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn delete_cart_item(
        &mut self,
        cart_id: CartId,
        item_id: CartItemId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// Remove every line. Returns the number removed.
    async fn clear_cart(&mut self, cart_id: CartId, now: DateTime<Utc>)
    -> Result<u64, RepositoryError>;
}

/// Order rows.
#[async_trait]
pub trait OrderRepository: Send {
    async fn get_order(&mut self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Read and lock an order row.
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the order number is taken.
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order, RepositoryError>;

    /// Whether an order already carries `order_number`.
    async fn order_number_taken(&mut self, order_number: &str) -> Result<bool, RepositoryError>;

    async fn update_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// A user's orders, newest first.
    async fn list_orders_for_user(
        &mut self,
        user_id: UserId,
        page: Page,
    ) -> Result<Vec<Order>, RepositoryError>;

    /// All orders, newest first, optionally filtered by status.
    async fn list_orders(
        &mut self,
        status: Option<OrderStatus>,
        page: Page,
    ) -> Result<Vec<Order>, RepositoryError>;

    /// Orders with `status` created in `[from, to)`.
    async fn orders_created_between(
        &mut self,
        status: OrderStatus,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Order>, RepositoryError>;

    /// Whether the user owns an order that is not yet terminal.
    async fn has_open_orders(&mut self, user_id: UserId) -> Result<bool, RepositoryError>;
}

/// Verification token rows.
#[async_trait]
pub trait TokenRepository: Send {
    /// The unused, unexpired token of `kind` for `user_id`, if any.
    async fn find_active_token(
        &mut self,
        user_id: UserId,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<Option<VerificationToken>, RepositoryError>;

    /// Insert a token. Returns `None` when the value is already taken for
    /// its kind; the unit of work stays usable.
    async fn insert_token(
        &mut self,
        token: NewToken,
    ) -> Result<Option<VerificationToken>, RepositoryError>;

    /// Read and lock a token by value and kind.
    async fn lock_token(
        &mut self,
        value: &str,
        kind: TokenKind,
    ) -> Result<Option<VerificationToken>, RepositoryError>;

    async fn mark_token_used(&mut self, id: TokenId) -> Result<(), RepositoryError>;

    /// Delete unused tokens that expired before `now`.
    async fn delete_expired_tokens(&mut self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;

    /// Delete used tokens that expired before `now`.
    async fn delete_used_tokens(&mut self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_errors_are_not_contention() {
        let err = RepositoryError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, RepositoryError::Database(_)));
    }
}

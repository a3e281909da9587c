//! Cart engine.
//!
//! Stock is checked on every add and update but never reserved; the order
//! engine re-checks under row locks when the cart becomes an order.

use vic_shop_core::{CartItemId, ProductId, UserId};

use super::{Clock, ServiceError, require_positive_quantity};
use crate::db::{CartRepository, ProductRepository, Store, UnitOfWork};
use crate::models::{Cart, NewCartItem, Product};

/// Per-user cart operations.
pub struct CartService<'a> {
    store: &'a dyn Store,
    clock: &'a dyn Clock,
}

impl<'a> CartService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    /// The user's cart, created empty on first access.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if the database operation fails.
    pub async fn get_cart(&self, user_id: UserId) -> Result<Cart, ServiceError> {
        let mut uow = self.store.begin().await?;
        let cart = match uow.get_cart(user_id).await? {
            Some(cart) => cart,
            None => uow.create_cart(user_id, self.clock.now()).await?,
        };
        uow.commit().await?;
        Ok(cart)
    }

    /// Add `quantity` units of a product.
    ///
    /// If the product is already in the cart the quantities merge and the
    /// line takes the product's current price and name.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` if `quantity` is below 1.
    /// Returns `ServiceError::NotFound` if the product doesn't exist.
    /// Returns `ServiceError::InsufficientStock` if the merged quantity
    /// exceeds current stock.
    pub async fn add_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<Cart, ServiceError> {
        require_positive_quantity(quantity)?;

        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let cart = locked_cart(uow.as_mut(), user_id, now).await?;
        let product = uow
            .get_product(product_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format_args!("product {product_id}")))?;

        let existing = cart.item_for_product(product_id).cloned();
        let in_cart = existing.as_ref().map_or(0, |item| item.quantity);
        let requested = in_cart
            .checked_add(quantity)
            .ok_or_else(|| ServiceError::Validation("quantity is too large".to_owned()))?;
        check_stock(&product, requested)?;

        match existing {
            Some(mut item) => {
                item.quantity = requested;
                item.unit_price = product.price;
                item.product_name.clone_from(&product.name);
                uow.update_cart_item(cart.id, &item, now).await?;
            }
            None => {
                let item = NewCartItem {
                    product_id,
                    product_name: product.name.clone(),
                    quantity,
                    unit_price: product.price,
                };
                uow.insert_cart_item(cart.id, item, now).await?;
            }
        }

        let cart = reload(uow.as_mut(), user_id).await?;
        uow.commit().await?;

        tracing::debug!(user_id = %user_id, product_id = %product_id, quantity, "added to cart");
        Ok(cart)
    }

    /// Set the quantity of one line. The line keeps its price snapshot.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` if `quantity` is below 1.
    /// Returns `ServiceError::NotFound` if the line or its product is gone.
    /// Returns `ServiceError::InsufficientStock` if `quantity` exceeds stock.
    pub async fn update_item(
        &self,
        user_id: UserId,
        item_id: CartItemId,
        quantity: i32,
    ) -> Result<Cart, ServiceError> {
        require_positive_quantity(quantity)?;

        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let cart = locked_cart(uow.as_mut(), user_id, now).await?;
        let mut item = cart
            .item(item_id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format_args!("cart item {item_id}")))?;
        let product = uow.get_product(item.product_id).await?.ok_or_else(|| {
            ServiceError::not_found(format_args!("product {}", item.product_id))
        })?;
        check_stock(&product, quantity)?;

        item.quantity = quantity;
        uow.update_cart_item(cart.id, &item, now).await?;

        let cart = reload(uow.as_mut(), user_id).await?;
        uow.commit().await?;
        Ok(cart)
    }

    /// Remove one line. Removing a line that is not there is not an error.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if the database operation fails.
    pub async fn remove_item(
        &self,
        user_id: UserId,
        item_id: CartItemId,
    ) -> Result<Cart, ServiceError> {
        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let cart = locked_cart(uow.as_mut(), user_id, now).await?;
        uow.delete_cart_item(cart.id, item_id, now).await?;

        let cart = reload(uow.as_mut(), user_id).await?;
        uow.commit().await?;
        Ok(cart)
    }

    /// Remove every line.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if the database operation fails.
    pub async fn clear(&self, user_id: UserId) -> Result<Cart, ServiceError> {
        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let cart = locked_cart(uow.as_mut(), user_id, now).await?;
        uow.clear_cart(cart.id, now).await?;

        let cart = reload(uow.as_mut(), user_id).await?;
        uow.commit().await?;
        Ok(cart)
    }
}

async fn locked_cart(
    uow: &mut dyn UnitOfWork,
    user_id: UserId,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<Cart, ServiceError> {
    match uow.lock_cart(user_id).await? {
        Some(cart) => Ok(cart),
        None => Ok(uow.create_cart(user_id, now).await?),
    }
}

async fn reload(uow: &mut dyn UnitOfWork, user_id: UserId) -> Result<Cart, ServiceError> {
    uow.get_cart(user_id)
        .await?
        .ok_or_else(|| ServiceError::not_found(format_args!("cart for user {user_id}")))
}

fn check_stock(product: &Product, requested: i32) -> Result<(), ServiceError> {
    if requested > product.stock_quantity {
        return Err(ServiceError::InsufficientStock {
            product_id: product.id,
            product_name: product.name.clone(),
            requested,
            available: product.stock_quantity,
        });
    }
    Ok(())
}

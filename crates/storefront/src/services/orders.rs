//! Order engine.
//!
//! # Stock reservation
//!
//! Stock is reserved eagerly: placing an order decrements product stock in
//! the same unit of work that inserts the order, and cancelling restores it.
//! Products are always locked in ascending id order, so two units of work
//! touching overlapping products queue instead of deadlocking.
//!
//! # Status graph
//!
//! ```text
//! PENDING ──> PROCESSING ──> COMPLETED
//!    │             │
//!    └──────┬──────┘
//!           v
//!       CANCELLED
//! ```

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;

use vic_shop_core::{OrderId, OrderStatus, ProductId, UserId};

use super::{Clock, ServiceError, require_admin, require_positive_quantity};
use crate::db::{CartRepository, OrderRepository, ProductRepository, Store, UnitOfWork};
use crate::models::{
    NewOrder, NewOrderItem, Order, OrderLine, Page, Principal, Product, ShippingAddress,
};

/// Attempts at drawing an unused order number.
const MAX_ORDER_NUMBER_ATTEMPTS: u32 = 5;

/// Order placement and lifecycle.
pub struct OrderService<'a> {
    store: &'a dyn Store,
    clock: &'a dyn Clock,
}

impl<'a> OrderService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    /// Place an order for `user_id`, reserving stock for every line.
    ///
    /// Either the whole order is placed or nothing changes.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for no lines, a quantity below 1 or
    /// a blank address part.
    /// Returns `ServiceError::NotFound` if a product doesn't exist.
    /// Returns `ServiceError::InsufficientStock` for the first line that
    /// cannot be covered.
    pub async fn create_order(
        &self,
        user_id: UserId,
        lines: &[OrderLine],
        shipping_address: &ShippingAddress,
    ) -> Result<Order, ServiceError> {
        validate_lines(lines)?;
        validate_address(shipping_address)?;

        let mut uow = self.store.begin().await?;
        let order = place_order(
            uow.as_mut(),
            user_id,
            lines,
            shipping_address,
            self.clock.now(),
        )
        .await?;
        uow.commit().await?;

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            user_id = %user_id,
            total = %order.total_amount,
            "order placed"
        );
        Ok(order)
    }

    /// Turn the user's cart into an order and empty the cart.
    ///
    /// Prices come from the products at checkout time, not from the cart.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` if the cart is empty or the address
    /// is incomplete. Otherwise fails like [`Self::create_order`].
    pub async fn checkout(
        &self,
        user_id: UserId,
        shipping_address: &ShippingAddress,
    ) -> Result<Order, ServiceError> {
        validate_address(shipping_address)?;

        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let Some(cart) = uow.lock_cart(user_id).await?.filter(|cart| !cart.is_empty()) else {
            return Err(ServiceError::Validation("cart is empty".to_owned()));
        };

        let lines: Vec<OrderLine> = cart
            .items
            .iter()
            .map(|item| OrderLine {
                product_id: item.product_id,
                quantity: item.quantity,
            })
            .collect();

        let order = place_order(uow.as_mut(), user_id, &lines, shipping_address, now).await?;
        uow.clear_cart(cart.id, now).await?;
        uow.commit().await?;

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            user_id = %user_id,
            "checkout completed"
        );
        Ok(order)
    }

    /// Cancel one of the principal's own pending orders and restore its stock.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the order doesn't exist.
    /// Returns `ServiceError::Authorization` if it belongs to someone else.
    /// Returns `ServiceError::InvalidTransition` unless it is `PENDING`.
    pub async fn cancel_order(
        &self,
        principal: &Principal,
        order_id: OrderId,
    ) -> Result<Order, ServiceError> {
        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let order = locked_order(uow.as_mut(), order_id).await?;

        if order.user_id != principal.user_id {
            return Err(ServiceError::Authorization(
                "not authorized to cancel this order".to_owned(),
            ));
        }
        if order.status != OrderStatus::Pending {
            return Err(ServiceError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Cancelled,
            });
        }

        restore_stock(uow.as_mut(), &order, now).await?;
        uow.update_order_status(order.id, OrderStatus::Cancelled, now)
            .await?;
        let order = locked_order(uow.as_mut(), order_id).await?;
        uow.commit().await?;

        tracing::info!(order_id = %order.id, user_id = %principal.user_id, "order cancelled");
        Ok(order)
    }

    /// Move an order along the status graph. Administrators only.
    ///
    /// Moving to `CANCELLED` restores stock exactly as [`Self::cancel_order`].
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Authorization` unless `actor` is an admin.
    /// Returns `ServiceError::NotFound` if the order doesn't exist.
    /// Returns `ServiceError::InvalidTransition` if the graph has no such edge.
    pub async fn update_status(
        &self,
        actor: &Principal,
        order_id: OrderId,
        new_status: OrderStatus,
    ) -> Result<Order, ServiceError> {
        require_admin(actor, "change order status")?;

        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let order = locked_order(uow.as_mut(), order_id).await?;

        if !order.status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidTransition {
                from: order.status,
                to: new_status,
            });
        }

        if new_status == OrderStatus::Cancelled {
            restore_stock(uow.as_mut(), &order, now).await?;
        }
        uow.update_order_status(order.id, new_status, now).await?;
        let updated = locked_order(uow.as_mut(), order_id).await?;
        uow.commit().await?;

        tracing::info!(
            order_id = %order_id,
            from = %order.status,
            to = %new_status,
            actor = %actor.user_id,
            "order status changed"
        );
        Ok(updated)
    }

    /// One order, visible to its owner and to administrators.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the order doesn't exist.
    /// Returns `ServiceError::Authorization` for anyone else.
    pub async fn get_order(
        &self,
        principal: &Principal,
        order_id: OrderId,
    ) -> Result<Order, ServiceError> {
        let mut uow = self.store.begin().await?;
        let order = uow
            .get_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format_args!("order {order_id}")))?;

        if order.user_id != principal.user_id && !principal.is_admin() {
            return Err(ServiceError::Authorization(
                "not authorized to access this order".to_owned(),
            ));
        }
        Ok(order)
    }

    /// The user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if the database operation fails.
    pub async fn list_my_orders(
        &self,
        user_id: UserId,
        page: Page,
    ) -> Result<Vec<Order>, ServiceError> {
        let mut uow = self.store.begin().await?;
        Ok(uow.list_orders_for_user(user_id, page).await?)
    }

    /// Every order, newest first, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Authorization` unless `actor` is an admin.
    pub async fn list_orders(
        &self,
        actor: &Principal,
        status: Option<OrderStatus>,
        page: Page,
    ) -> Result<Vec<Order>, ServiceError> {
        require_admin(actor, "list all orders")?;

        let mut uow = self.store.begin().await?;
        Ok(uow.list_orders(status, page).await?)
    }
}

fn validate_lines(lines: &[OrderLine]) -> Result<(), ServiceError> {
    if lines.is_empty() {
        return Err(ServiceError::Validation(
            "an order needs at least one item".to_owned(),
        ));
    }
    lines
        .iter()
        .try_for_each(|line| require_positive_quantity(line.quantity))
}

fn validate_address(address: &ShippingAddress) -> Result<(), ServiceError> {
    let blank = address.blank_fields();
    if blank.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::Validation(format!(
            "shipping address is missing: {}",
            blank.join(", ")
        )))
    }
}

/// Reserve stock and insert the order. Validation has already happened.
async fn place_order(
    uow: &mut dyn UnitOfWork,
    user_id: UserId,
    lines: &[OrderLine],
    shipping_address: &ShippingAddress,
    now: DateTime<Utc>,
) -> Result<Order, ServiceError> {
    let mut products = lock_products(uow, lines.iter().map(|l| l.product_id)).await?;

    let mut items = Vec::with_capacity(lines.len());
    for line in lines {
        let product = products.get_mut(&line.product_id).ok_or_else(|| {
            ServiceError::not_found(format_args!("product {}", line.product_id))
        })?;

        if product.stock_quantity < line.quantity {
            return Err(ServiceError::InsufficientStock {
                product_id: product.id,
                product_name: product.name.clone(),
                requested: line.quantity,
                available: product.stock_quantity,
            });
        }
        product.stock_quantity -= line.quantity;

        items.push(NewOrderItem {
            product_id: product.id,
            product_name: product.name.clone(),
            quantity: line.quantity,
            unit_price: product.price,
            subtotal: product.price.line_total(line.quantity),
        });
    }

    for product in products.values_mut() {
        product.updated_at = now;
        uow.update_product(product).await?;
    }

    let total_amount: Decimal = items.iter().map(|item| item.subtotal).sum();
    let order_number = unused_order_number(uow, now).await?;

    Ok(uow
        .insert_order(NewOrder {
            order_number,
            user_id,
            items,
            total_amount,
            status: OrderStatus::Pending,
            shipping_address: shipping_address.to_string(),
            created_at: now,
        })
        .await?)
}

/// Put every item quantity of `order` back on its product.
async fn restore_stock(
    uow: &mut dyn UnitOfWork,
    order: &Order,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    let mut quantities: BTreeMap<ProductId, i32> = BTreeMap::new();
    for item in &order.items {
        *quantities.entry(item.product_id).or_default() += item.quantity;
    }

    let mut products = lock_products(uow, quantities.keys().copied()).await?;
    for (product_id, quantity) in quantities {
        let Some(product) = products.get_mut(&product_id) else {
            continue;
        };
        product.stock_quantity = product.stock_quantity.checked_add(quantity).ok_or_else(|| {
            ServiceError::Validation(format!("stock of product {product_id} would overflow"))
        })?;
        product.updated_at = now;
        uow.update_product(product).await?;
    }
    Ok(())
}

/// Lock each distinct product in ascending id order.
async fn lock_products(
    uow: &mut dyn UnitOfWork,
    ids: impl Iterator<Item = ProductId> + Send,
) -> Result<BTreeMap<ProductId, Product>, ServiceError> {
    let ids: BTreeSet<ProductId> = ids.collect();
    let mut products = BTreeMap::new();
    for id in ids {
        let product = uow
            .lock_product(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format_args!("product {id}")))?;
        products.insert(id, product);
    }
    Ok(products)
}

async fn locked_order(uow: &mut dyn UnitOfWork, order_id: OrderId) -> Result<Order, ServiceError> {
    uow.lock_order(order_id)
        .await?
        .ok_or_else(|| ServiceError::not_found(format_args!("order {order_id}")))
}

async fn unused_order_number(
    uow: &mut dyn UnitOfWork,
    now: DateTime<Utc>,
) -> Result<String, ServiceError> {
    for _ in 0..MAX_ORDER_NUMBER_ATTEMPTS {
        let candidate = order_number(now, rand::rng().random_range(0..10_000));
        if !uow.order_number_taken(&candidate).await? {
            return Ok(candidate);
        }
    }
    Err(ServiceError::Conflict(
        "could not allocate an order number, try again".to_owned(),
    ))
}

/// `ORD-<UTC yyyymmddHHMMSS>-<4 digits>`.
fn order_number(now: DateTime<Utc>, suffix: u16) -> String {
    format!("ORD-{}-{suffix:04}", now.format("%Y%m%d%H%M%S"))
}

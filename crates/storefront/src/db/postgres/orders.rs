//! Order queries.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use vic_shop_core::{OrderId, OrderItemId, OrderStatus, Price, ProductId, UserId};

use super::{PgUnitOfWork, conflict_on_unique};
use crate::db::{OrderRepository, RepositoryError};
use crate::models::{NewOrder, Order, OrderItem, Page};

const SELECT_ORDER: &str = r"
    SELECT id, order_number, user_id, total_amount, status, shipping_address,
           created_at, updated_at
    FROM shop.customer_order";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    order_number: String,
    user_id: UserId,
    total_amount: Decimal,
    status: OrderStatus,
    shipping_address: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: OrderItemId,
    order_id: OrderId,
    product_id: ProductId,
    product_name: String,
    quantity: i32,
    unit_price: Price,
    subtotal: Decimal,
}

impl From<OrderItemRow> for OrderItem {
    fn from(r: OrderItemRow) -> Self {
        Self {
            id: r.id,
            product_id: r.product_id,
            product_name: r.product_name,
            quantity: r.quantity,
            unit_price: r.unit_price,
            subtotal: r.subtotal,
        }
    }
}

impl PgUnitOfWork {
    /// Load the items of every order in `rows`, preserving row order.
    async fn with_items(&mut self, rows: Vec<OrderRow>) -> Result<Vec<Order>, RepositoryError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i32> = rows.iter().map(|r| r.id.as_i32()).collect();
        let item_rows = sqlx::query_as::<_, OrderItemRow>(
            r"
            SELECT id, order_id, product_id, product_name, quantity, unit_price, subtotal
            FROM shop.order_item
            WHERE order_id = ANY($1)
            ORDER BY id
            ",
        )
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut items: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for row in item_rows {
            items.entry(row.order_id).or_default().push(row.into());
        }

        Ok(rows
            .into_iter()
            .map(|r| Order {
                items: items.remove(&r.id).unwrap_or_default(),
                id: r.id,
                order_number: r.order_number,
                user_id: r.user_id,
                total_amount: r.total_amount,
                status: r.status,
                shipping_address: r.shipping_address,
                created_at: r.created_at,
                updated_at: r.updated_at,
            })
            .collect())
    }

    async fn single(&mut self, row: Option<OrderRow>) -> Result<Option<Order>, RepositoryError> {
        match row {
            Some(row) => Ok(self.with_items(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl OrderRepository for PgUnitOfWork {
    async fn get_order(&mut self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("{SELECT_ORDER} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        self.single(row).await
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row =
            sqlx::query_as::<_, OrderRow>(&format!("{SELECT_ORDER} WHERE id = $1 FOR UPDATE"))
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await?;
        self.single(row).await
    }

    async fn insert_order(&mut self, order: NewOrder) -> Result<Order, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(
            r"
            INSERT INTO shop.customer_order
                (order_number, user_id, total_amount, status, shipping_address,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING id, order_number, user_id, total_amount, status, shipping_address,
                      created_at, updated_at
            ",
        )
        .bind(&order.order_number)
        .bind(order.user_id)
        .bind(order.total_amount)
        .bind(order.status)
        .bind(&order.shipping_address)
        .bind(order.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| conflict_on_unique(e, "order number"))?;

        let mut items = Vec::with_capacity(order.items.len());
        for item in &order.items {
            let item_row = sqlx::query_as::<_, OrderItemRow>(
                r"
                INSERT INTO shop.order_item
                    (order_id, product_id, product_name, quantity, unit_price, subtotal)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id, order_id, product_id, product_name, quantity, unit_price, subtotal
                ",
            )
            .bind(row.id)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.subtotal)
            .fetch_one(&mut *self.tx)
            .await?;
            items.push(OrderItem::from(item_row));
        }

        Ok(Order {
            id: row.id,
            order_number: row.order_number,
            user_id: row.user_id,
            items,
            total_amount: row.total_amount,
            status: row.status,
            shipping_address: row.shipping_address,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    async fn order_number_taken(&mut self, order_number: &str) -> Result<bool, RepositoryError> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM shop.customer_order WHERE order_number = $1)",
        )
        .bind(order_number)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(taken)
    }

    async fn update_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE shop.customer_order SET status = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .bind(now)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_orders_for_user(
        &mut self,
        user_id: UserId,
        page: Page,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "{SELECT_ORDER} WHERE user_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(user_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&mut *self.tx)
        .await?;
        self.with_items(rows).await
    }

    async fn list_orders(
        &mut self,
        status: Option<OrderStatus>,
        page: Page,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "{SELECT_ORDER} WHERE ($1::shop.order_status IS NULL OR status = $1) \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(status)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&mut *self.tx)
        .await?;
        self.with_items(rows).await
    }

    async fn orders_created_between(
        &mut self,
        status: OrderStatus,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "{SELECT_ORDER} WHERE status = $1 AND created_at >= $2 AND created_at < $3 \
             ORDER BY created_at, id"
        ))
        .bind(status)
        .bind(from)
        .bind(to)
        .fetch_all(&mut *self.tx)
        .await?;
        self.with_items(rows).await
    }

    async fn has_open_orders(&mut self, user_id: UserId) -> Result<bool, RepositoryError> {
        let open: bool = sqlx::query_scalar(
            r"
            SELECT EXISTS (
                SELECT 1 FROM shop.customer_order
                WHERE user_id = $1 AND status IN ('pending', 'processing')
            )
            ",
        )
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(open)
    }
}

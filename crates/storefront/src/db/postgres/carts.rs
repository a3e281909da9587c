//! Cart queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use vic_shop_core::{CartId, CartItemId, Price, ProductId, UserId};

use super::PgUnitOfWork;
use crate::db::{CartRepository, RepositoryError};
use crate::models::{Cart, CartItem, NewCartItem};

#[derive(sqlx::FromRow)]
struct CartRow {
    id: CartId,
    user_id: UserId,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    id: CartItemId,
    product_id: ProductId,
    product_name: String,
    quantity: i32,
    unit_price: Price,
}

impl From<CartItemRow> for CartItem {
    fn from(r: CartItemRow) -> Self {
        Self {
            id: r.id,
            product_id: r.product_id,
            product_name: r.product_name,
            quantity: r.quantity,
            unit_price: r.unit_price,
        }
    }
}

impl PgUnitOfWork {
    async fn cart_with_items(&mut self, row: CartRow) -> Result<Cart, RepositoryError> {
        let items = sqlx::query_as::<_, CartItemRow>(
            r"
            SELECT id, product_id, product_name, quantity, unit_price
            FROM shop.cart_item
            WHERE cart_id = $1
            ORDER BY id
            ",
        )
        .bind(row.id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(Cart {
            id: row.id,
            user_id: row.user_id,
            items: items.into_iter().map(CartItem::from).collect(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    async fn touch_cart(&mut self, cart_id: CartId, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE shop.cart SET updated_at = $2 WHERE id = $1")
            .bind(cart_id)
            .bind(now)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CartRepository for PgUnitOfWork {
    async fn get_cart(&mut self, user_id: UserId) -> Result<Option<Cart>, RepositoryError> {
        let row = sqlx::query_as::<_, CartRow>(
            "SELECT id, user_id, created_at, updated_at FROM shop.cart WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => Ok(Some(self.cart_with_items(row).await?)),
            None => Ok(None),
        }
    }

    async fn lock_cart(&mut self, user_id: UserId) -> Result<Option<Cart>, RepositoryError> {
        let row = sqlx::query_as::<_, CartRow>(
            r"
            SELECT id, user_id, created_at, updated_at
            FROM shop.cart
            WHERE user_id = $1
            FOR UPDATE
            ",
        )
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => Ok(Some(self.cart_with_items(row).await?)),
            None => Ok(None),
        }
    }

    async fn create_cart(
        &mut self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Cart, RepositoryError> {
        // A concurrent first access may have created it; take that one.
        sqlx::query(
            r"
            INSERT INTO shop.cart (user_id, created_at, updated_at)
            VALUES ($1, $2, $2)
            ON CONFLICT (user_id) DO NOTHING
            ",
        )
        .bind(user_id)
        .bind(now)
        .execute(&mut *self.tx)
        .await?;

        self.lock_cart(user_id)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    async fn insert_cart_item(
        &mut self,
        cart_id: CartId,
        item: NewCartItem,
        now: DateTime<Utc>,
    ) -> Result<CartItem, RepositoryError> {
        let row = sqlx::query_as::<_, CartItemRow>(
            r"
            INSERT INTO shop.cart_item (cart_id, product_id, product_name, quantity, unit_price)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, product_id, product_name, quantity, unit_price
            ",
        )
        .bind(cart_id)
        .bind(item.product_id)
        .bind(&item.product_name)
        .bind(item.quantity)
        .bind(item.unit_price)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| super::conflict_on_unique(e, "cart line for this product"))?;

        self.touch_cart(cart_id, now).await?;
        Ok(row.into())
    }

    async fn update_cart_item(
        &mut self,
        cart_id: CartId,
        item: &CartItem,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE shop.cart_item
            SET product_name = $3, quantity = $4, unit_price = $5
            WHERE id = $1 AND cart_id = $2
            ",
        )
        .bind(item.id)
        .bind(cart_id)
        .bind(&item.product_name)
        .bind(item.quantity)
        .bind(item.unit_price)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        self.touch_cart(cart_id, now).await
    }

    async fn delete_cart_item(
        &mut self,
        cart_id: CartId,
        item_id: CartItemId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.cart_item WHERE id = $1 AND cart_id = $2")
            .bind(item_id)
            .bind(cart_id)
            .execute(&mut *self.tx)
            .await?;

        self.touch_cart(cart_id, now).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_cart(
        &mut self,
        cart_id: CartId,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.cart_item WHERE cart_id = $1")
            .bind(cart_id)
            .execute(&mut *self.tx)
            .await?;

        self.touch_cart(cart_id, now).await?;
        Ok(result.rows_affected())
    }
}

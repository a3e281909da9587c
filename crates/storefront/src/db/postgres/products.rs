//! Product queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use vic_shop_core::{Price, ProductId, UserId};

use super::PgUnitOfWork;
use crate::db::{ProductRepository, RepositoryError};
use crate::models::{NewProduct, Page, Product, ProductSort};

const SELECT_PRODUCT: &str = r"
    SELECT id, name, description, price, stock_quantity, image_url, category, size,
           created_by, created_at, updated_at
    FROM shop.product";

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    name: String,
    description: Option<String>,
    price: Price,
    stock_quantity: i32,
    image_url: Option<String>,
    category: Option<String>,
    size: Option<String>,
    created_by: Option<UserId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(r: ProductRow) -> Result<Self, Self::Error> {
        if r.stock_quantity < 0 {
            return Err(RepositoryError::DataCorruption(format!(
                "product {} has negative stock {}",
                r.id, r.stock_quantity
            )));
        }

        Ok(Self {
            id: r.id,
            name: r.name,
            description: r.description,
            price: r.price,
            stock_quantity: r.stock_quantity,
            image_url: r.image_url,
            category: r.category,
            size: r.size,
            created_by: r.created_by,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// `%query%` with the `LIKE` wildcards in `query` escaped.
fn contains_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn into_products(rows: Vec<ProductRow>) -> Result<Vec<Product>, RepositoryError> {
    rows.into_iter().map(Product::try_from).collect()
}

#[async_trait]
impl ProductRepository for PgUnitOfWork {
    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        sqlx::query_as::<_, ProductRow>(&format!("{SELECT_PRODUCT} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(Product::try_from)
            .transpose()
    }

    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        sqlx::query_as::<_, ProductRow>(&format!("{SELECT_PRODUCT} WHERE id = $1 FOR UPDATE"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(Product::try_from)
            .transpose()
    }

    async fn list_products(
        &mut self,
        category: Option<&str>,
        sort: ProductSort,
        page: Page,
    ) -> Result<Vec<Product>, RepositoryError> {
        // `order_by` only yields whitelisted column names.
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "{SELECT_PRODUCT} WHERE ($1::text IS NULL OR category = $1) \
             ORDER BY {} LIMIT $2 OFFSET $3",
            sort.order_by()
        ))
        .bind(category)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&mut *self.tx)
        .await?;
        into_products(rows)
    }

    async fn search_products(
        &mut self,
        query: &str,
        page: Page,
    ) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "{SELECT_PRODUCT} WHERE name ILIKE $1 OR description ILIKE $1 \
             ORDER BY id LIMIT $2 OFFSET $3"
        ))
        .bind(contains_pattern(query))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&mut *self.tx)
        .await?;
        into_products(rows)
    }

    async fn all_products(&mut self) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!("{SELECT_PRODUCT} ORDER BY id"))
            .fetch_all(&mut *self.tx)
            .await?;
        into_products(rows)
    }

    async fn insert_product(
        &mut self,
        product: NewProduct,
        created_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            INSERT INTO shop.product
                (name, description, price, stock_quantity, image_url, category, size,
                 created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING id, name, description, price, stock_quantity, image_url, category, size,
                      created_by, created_at, updated_at
            ",
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(product.stock_quantity)
        .bind(&product.image_url)
        .bind(&product.category)
        .bind(&product.size)
        .bind(created_by)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await?;

        row.try_into()
    }

    async fn update_product(&mut self, product: &Product) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE shop.product
            SET name = $2, description = $3, price = $4, stock_quantity = $5,
                image_url = $6, category = $7, size = $8, updated_at = $9
            WHERE id = $1
            ",
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(product.stock_quantity)
        .bind(&product.image_url)
        .bind(&product.category)
        .bind(&product.size)
        .bind(product.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete_product(&mut self, id: ProductId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.product WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.is_foreign_key_violation()
                {
                    return RepositoryError::Conflict(format!(
                        "product {id} is referenced by orders"
                    ));
                }
                RepositoryError::from(e)
            })?;
        Ok(result.rows_affected() > 0)
    }
}

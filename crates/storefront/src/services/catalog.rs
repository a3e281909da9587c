//! Product catalog.

use vic_shop_core::ProductId;

use super::{Clock, ServiceError, require_admin};
use crate::db::{ProductRepository, Store};
use crate::models::{NewProduct, Page, Principal, Product, ProductSort, ProductUpdate};

/// Product browsing and administration.
pub struct CatalogService<'a> {
    store: &'a dyn Store,
    clock: &'a dyn Clock,
}

impl<'a> CatalogService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    /// Products in `sort` order, optionally limited to one category.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if the database operation fails.
    pub async fn list(
        &self,
        category: Option<&str>,
        sort: ProductSort,
        page: Page,
    ) -> Result<Vec<Product>, ServiceError> {
        let mut uow = self.store.begin().await?;
        Ok(uow.list_products(category, sort, page).await?)
    }

    /// Products whose name or description contains `query`, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for a blank query.
    pub async fn search(&self, query: &str, page: Page) -> Result<Vec<Product>, ServiceError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ServiceError::Validation(
                "search query is required".to_owned(),
            ));
        }
        let mut uow = self.store.begin().await?;
        Ok(uow.search_products(query, page).await?)
    }

    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the product doesn't exist.
    pub async fn get(&self, id: ProductId) -> Result<Product, ServiceError> {
        let mut uow = self.store.begin().await?;
        uow.get_product(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format_args!("product {id}")))
    }

    /// # Errors
    ///
    /// Returns `ServiceError::Authorization` unless `actor` is an admin.
    /// Returns `ServiceError::Validation` for a blank name or negative stock.
    pub async fn create(
        &self,
        actor: &Principal,
        product: NewProduct,
    ) -> Result<Product, ServiceError> {
        require_admin(actor, "create products")?;
        validate_name(&product.name)?;
        if product.stock_quantity < 0 {
            return Err(ServiceError::Validation(
                "stock quantity cannot be negative".to_owned(),
            ));
        }

        let mut uow = self.store.begin().await?;
        let product = uow
            .insert_product(product, actor.user_id, self.clock.now())
            .await?;
        uow.commit().await?;

        tracing::info!(product_id = %product.id, name = %product.name, "product created");
        Ok(product)
    }

    /// Change descriptive fields and price. Stock is left alone.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Authorization` unless `actor` is an admin.
    /// Returns `ServiceError::NotFound` if the product doesn't exist.
    pub async fn update(
        &self,
        actor: &Principal,
        id: ProductId,
        changes: ProductUpdate,
    ) -> Result<Product, ServiceError> {
        require_admin(actor, "update products")?;
        if let Some(name) = &changes.name {
            validate_name(name)?;
        }

        let mut uow = self.store.begin().await?;
        let mut product = uow
            .lock_product(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format_args!("product {id}")))?;
        changes.apply_to(&mut product);
        product.updated_at = self.clock.now();
        uow.update_product(&product).await?;
        uow.commit().await?;

        Ok(product)
    }

    /// Add `delta` units to stock (negative to remove).
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Authorization` unless `actor` is an admin.
    /// Returns `ServiceError::NotFound` if the product doesn't exist.
    /// Returns `ServiceError::InsufficientStock` if stock would go negative.
    pub async fn adjust_stock(
        &self,
        actor: &Principal,
        id: ProductId,
        delta: i32,
    ) -> Result<Product, ServiceError> {
        require_admin(actor, "adjust stock")?;

        let mut uow = self.store.begin().await?;
        let mut product = uow
            .lock_product(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format_args!("product {id}")))?;

        let stock = product
            .stock_quantity
            .checked_add(delta)
            .filter(|stock| *stock >= 0)
            .ok_or_else(|| ServiceError::InsufficientStock {
                product_id: product.id,
                product_name: product.name.clone(),
                requested: delta.saturating_neg(),
                available: product.stock_quantity,
            })?;

        product.stock_quantity = stock;
        product.updated_at = self.clock.now();
        uow.update_product(&product).await?;
        uow.commit().await?;

        tracing::info!(product_id = %id, delta, stock, actor = %actor.user_id, "stock adjusted");
        Ok(product)
    }

    /// Delete a product and drop it from every cart.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Authorization` unless `actor` is an admin.
    /// Returns `ServiceError::NotFound` if the product doesn't exist.
    /// Returns `ServiceError::Conflict` if any order references it.
    pub async fn delete(&self, actor: &Principal, id: ProductId) -> Result<(), ServiceError> {
        require_admin(actor, "delete products")?;

        let mut uow = self.store.begin().await?;
        if !uow.delete_product(id).await? {
            return Err(ServiceError::not_found(format_args!("product {id}")));
        }
        uow.commit().await?;

        tracing::info!(product_id = %id, actor = %actor.user_id, "product deleted");
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<(), ServiceError> {
    if name.trim().is_empty() {
        return Err(ServiceError::Validation(
            "product name is required".to_owned(),
        ));
    }
    Ok(())
}

//! Sales and inventory reports. Read-only.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use vic_shop_core::{OrderStatus, Price, ProductId};

use super::{Clock, ServiceError, require_admin};
use crate::db::{OrderRepository, ProductRepository, Store};
use crate::models::{Order, Principal, Product};

/// Products at or below this stock level need reordering.
pub const REORDER_THRESHOLD: i32 = 10;

/// Products at or below this stock level count as low stock.
pub const LOW_STOCK_THRESHOLD: i32 = 5;

/// Completed sales over a date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SalesReport {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_revenue: Decimal,
    pub total_orders: u64,
    /// Rounded to cents, half away from zero. Zero when there are no orders.
    pub average_order_value: Decimal,
    /// Units sold per product name.
    pub products_sold: BTreeMap<String, i64>,
}

impl SalesReport {
    fn from_orders(start_date: NaiveDate, end_date: NaiveDate, orders: &[Order]) -> Self {
        let total_revenue: Decimal = orders.iter().map(|order| order.total_amount).sum();
        let total_orders = u64::try_from(orders.len()).unwrap_or(u64::MAX);
        let average_order_value = if total_orders == 0 {
            Decimal::ZERO
        } else {
            (total_revenue / Decimal::from(total_orders))
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        };

        let mut products_sold = BTreeMap::new();
        for item in orders.iter().flat_map(|order| &order.items) {
            *products_sold.entry(item.product_name.clone()).or_default() +=
                i64::from(item.quantity);
        }

        Self {
            start_date,
            end_date,
            total_revenue,
            total_orders,
            average_order_value,
            products_sold,
        }
    }
}

/// One product line of an [`InventoryReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductInventory {
    pub product_id: ProductId,
    pub name: String,
    pub stock_quantity: i32,
    pub price: Price,
    pub reorder_needed: bool,
}

/// Stock position of the whole catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryReport {
    pub report_date: NaiveDate,
    pub products: Vec<ProductInventory>,
    /// Σ price × stock.
    pub total_inventory_value: Decimal,
    pub low_stock_items: u64,
}

impl InventoryReport {
    fn from_products(report_date: NaiveDate, products: &[Product]) -> Self {
        let total_inventory_value = products
            .iter()
            .map(|p| p.price.line_total(p.stock_quantity))
            .sum();
        let low_stock = products
            .iter()
            .filter(|p| p.stock_quantity <= LOW_STOCK_THRESHOLD)
            .count();

        Self {
            report_date,
            products: products
                .iter()
                .map(|p| ProductInventory {
                    product_id: p.id,
                    name: p.name.clone(),
                    stock_quantity: p.stock_quantity,
                    price: p.price,
                    reorder_needed: p.stock_quantity <= REORDER_THRESHOLD,
                })
                .collect(),
            total_inventory_value,
            low_stock_items: u64::try_from(low_stock).unwrap_or(u64::MAX),
        }
    }
}

/// Administrative reports.
pub struct ReportService<'a> {
    store: &'a dyn Store,
    clock: &'a dyn Clock,
}

impl<'a> ReportService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    /// Completed orders created from `start_date` through `end_date`
    /// inclusive, in UTC days.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Authorization` unless `actor` is an admin.
    /// Returns `ServiceError::Validation` if the range is reversed.
    pub async fn sales_report(
        &self,
        actor: &Principal,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<SalesReport, ServiceError> {
        require_admin(actor, "view reports")?;
        if end_date < start_date {
            return Err(ServiceError::Validation(
                "end date is before start date".to_owned(),
            ));
        }
        let day_after_end = end_date
            .succ_opt()
            .ok_or_else(|| ServiceError::Validation("end date is out of range".to_owned()))?;

        let from = start_date.and_time(NaiveTime::MIN).and_utc();
        let to = day_after_end.and_time(NaiveTime::MIN).and_utc();

        let mut uow = self.store.begin().await?;
        let orders = uow
            .orders_created_between(OrderStatus::Completed, from, to)
            .await?;

        Ok(SalesReport::from_orders(start_date, end_date, &orders))
    }

    /// # Errors
    ///
    /// Returns `ServiceError::Authorization` unless `actor` is an admin.
    pub async fn inventory_report(&self, actor: &Principal) -> Result<InventoryReport, ServiceError> {
        require_admin(actor, "view reports")?;

        let mut uow = self.store.begin().await?;
        let products = uow.all_products().await?;

        Ok(InventoryReport::from_products(
            self.clock.now().date_naive(),
            &products,
        ))
    }
}

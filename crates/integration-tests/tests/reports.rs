//! Sales and inventory reports.

#![allow(clippy::unwrap_used)]

use chrono::{NaiveDate, TimeDelta};
use rust_decimal::Decimal;

use vic_shop_core::{ErrorKind, OrderId, OrderStatus, ProductId};
use vic_shop_integration_tests::{TestShop, address};
use vic_shop_storefront::models::{OrderLine, User};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
}

async fn completed_order(
    shop: &TestShop,
    admin: &User,
    customer: &User,
    product_id: ProductId,
    quantity: i32,
) -> OrderId {
    let orders = shop.orders();
    let order = orders
        .create_order(
            customer.id,
            &[OrderLine {
                product_id,
                quantity,
            }],
            &address(),
        )
        .await
        .unwrap();
    for status in [OrderStatus::Processing, OrderStatus::Completed] {
        orders
            .update_status(&admin.principal(), order.id, status)
            .await
            .unwrap();
    }
    order.id
}

#[tokio::test]
async fn test_sales_report_counts_completed_orders_only() {
    let shop = TestShop::new();
    let admin = shop.admin("admin@vic.test").await;
    let customer = shop.customer("sam@vic.test").await;
    let wax = shop.product(&admin, "Wax", 500, 50).await;
    let fins = shop.product(&admin, "Fins", 4500, 5).await;

    completed_order(&shop, &admin, &customer, wax.id, 2).await;
    completed_order(&shop, &admin, &customer, fins.id, 1).await;
    completed_order(&shop, &admin, &customer, wax.id, 3).await;

    // Pending and cancelled orders do not count.
    let pending = shop
        .orders()
        .create_order(
            customer.id,
            &[OrderLine {
                product_id: fins.id,
                quantity: 1,
            }],
            &address(),
        )
        .await
        .unwrap();
    let cancelled = shop
        .orders()
        .create_order(
            customer.id,
            &[OrderLine {
                product_id: wax.id,
                quantity: 7,
            }],
            &address(),
        )
        .await
        .unwrap();
    shop.orders()
        .cancel_order(&customer.principal(), cancelled.id)
        .await
        .unwrap();
    assert_eq!(pending.status, OrderStatus::Pending);

    let report = shop
        .reports()
        .sales_report(&admin.principal(), day(2), day(2))
        .await
        .unwrap();

    assert_eq!(report.total_orders, 3);
    assert_eq!(report.total_revenue, Decimal::new(7000, 2));
    // 70.00 / 3, rounded to cents
    assert_eq!(report.average_order_value, Decimal::new(2333, 2));
    assert_eq!(report.products_sold.get("Wax"), Some(&5));
    assert_eq!(report.products_sold.get("Fins"), Some(&1));
    assert_eq!(report.products_sold.len(), 2);
}

#[tokio::test]
async fn test_sales_report_range_is_inclusive_by_day() {
    let shop = TestShop::new();
    let admin = shop.admin("admin@vic.test").await;
    let customer = shop.customer("sam@vic.test").await;
    let wax = shop.product(&admin, "Wax", 500, 50).await;

    // 2 March 10:00, then 3 March 23:00, then 4 March 01:00.
    completed_order(&shop, &admin, &customer, wax.id, 1).await;
    shop.clock.advance(TimeDelta::hours(37));
    completed_order(&shop, &admin, &customer, wax.id, 2).await;
    shop.clock.advance(TimeDelta::hours(2));
    completed_order(&shop, &admin, &customer, wax.id, 4).await;

    let reports = shop.reports();
    let admin = admin.principal();

    let both = reports.sales_report(&admin, day(2), day(3)).await.unwrap();
    assert_eq!(both.total_orders, 2);
    assert_eq!(both.products_sold.get("Wax"), Some(&3));

    let last = reports.sales_report(&admin, day(4), day(4)).await.unwrap();
    assert_eq!(last.total_orders, 1);

    let none = reports.sales_report(&admin, day(5), day(9)).await.unwrap();
    assert_eq!(none.total_orders, 0);
    assert_eq!(none.total_revenue, Decimal::ZERO);
    assert_eq!(none.average_order_value, Decimal::ZERO);
    assert!(none.products_sold.is_empty());
}

#[tokio::test]
async fn test_sales_report_rejects_bad_requests() {
    let shop = TestShop::new();
    let admin = shop.admin("admin@vic.test").await;
    let customer = shop.customer("sam@vic.test").await;

    let err = shop
        .reports()
        .sales_report(&admin.principal(), day(5), day(4))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = shop
        .reports()
        .sales_report(&customer.principal(), day(1), day(4))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let err = shop
        .reports()
        .inventory_report(&customer.principal())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
}

#[tokio::test]
async fn test_inventory_report() {
    let shop = TestShop::new();
    let admin = shop.admin("admin@vic.test").await;
    let fins = shop.product(&admin, "Fins", 4500, 3).await;
    let wax = shop.product(&admin, "Wax", 500, 8).await;
    let board = shop.product(&admin, "Longboard", 90000, 20).await;

    let report = shop
        .reports()
        .inventory_report(&admin.principal())
        .await
        .unwrap();

    assert_eq!(report.report_date, day(2));
    assert_eq!(
        report
            .products
            .iter()
            .map(|p| p.product_id)
            .collect::<Vec<_>>(),
        vec![fins.id, wax.id, board.id]
    );
    let reorder: Vec<bool> = report.products.iter().map(|p| p.reorder_needed).collect();
    assert_eq!(reorder, vec![true, true, false]);
    // Only fins are at or below the low stock line.
    assert_eq!(report.low_stock_items, 1);
    // 3 x 45.00 + 8 x 5.00 + 20 x 900.00
    assert_eq!(report.total_inventory_value, Decimal::new(1_817_500, 2));
}

//! The Postgres store under concurrent requests.
//!
//! Each test gets a fresh database with the storefront migrations applied,
//! so these need a reachable server:
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/vic_shop cargo test -p vic-shop-integration-tests \
//!     --test postgres -- --ignored
//! ```

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use chrono::TimeDelta;
use sqlx::PgPool;

use vic_shop_core::{ErrorKind, OrderStatus, Price, TokenKind, UserId};
use vic_shop_integration_tests::{BASE_URL, PASSWORD, address, registration, start_time};
use vic_shop_storefront::db::PgStore;
use vic_shop_storefront::models::{NewProduct, OrderLine, Product, User};
use vic_shop_storefront::services::{
    AccountService, CatalogService, MemoryNotifier, MockClock, OrderService, ServiceError,
};

struct PgShop {
    store: PgStore,
    clock: MockClock,
    notifier: MemoryNotifier,
}

impl PgShop {
    fn new(pool: PgPool) -> Self {
        Self {
            store: PgStore::new(pool, Duration::from_secs(5)),
            clock: MockClock::new(start_time()),
            notifier: MemoryNotifier::new(),
        }
    }

    fn accounts(&self) -> AccountService<'_> {
        AccountService::new(&self.store, &self.clock, &self.notifier, BASE_URL)
    }

    fn catalog(&self) -> CatalogService<'_> {
        CatalogService::new(&self.store, &self.clock)
    }

    fn orders(&self) -> OrderService<'_> {
        OrderService::new(&self.store, &self.clock)
    }

    async fn admin(&self) -> User {
        self.accounts()
            .create_admin_account("admin@vic.test", PASSWORD, "Ada", "Admin")
            .await
            .unwrap()
    }

    async fn registered(&self, email: &str) -> User {
        self.accounts()
            .register(registration(email, None))
            .await
            .unwrap()
    }

    async fn customer(&self, email: &str) -> User {
        let user = self.registered(email).await;
        let token = self
            .token_value(user.id, TokenKind::EmailVerification)
            .await;
        self.accounts().verify_email(email, &token).await.unwrap()
    }

    async fn product(&self, admin: &User, stock: i32) -> Product {
        self.catalog()
            .create(
                &admin.principal(),
                NewProduct {
                    name: "Wax".to_owned(),
                    description: None,
                    price: Price::from_cents(500).unwrap(),
                    stock_quantity: stock,
                    image_url: None,
                    category: None,
                    size: None,
                },
            )
            .await
            .unwrap()
    }

    async fn token_value(&self, user_id: UserId, kind: TokenKind) -> String {
        sqlx::query_scalar(
            "SELECT value FROM shop.verification_token
             WHERE user_id = $1 AND kind = $2 AND NOT used
             ORDER BY id DESC LIMIT 1",
        )
        .bind(user_id)
        .bind(kind)
        .fetch_one(self.store.pool())
        .await
        .unwrap()
    }

    async fn stock_of(&self, product: &Product) -> i32 {
        self.catalog().get(product.id).await.unwrap().stock_quantity
    }
}

fn error_kinds<T>(results: [&Result<T, ServiceError>; 2]) -> Vec<ErrorKind> {
    results
        .into_iter()
        .filter_map(|result| result.as_ref().err())
        .map(ServiceError::kind)
        .collect()
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "needs DATABASE_URL"]
async fn test_last_unit_goes_to_exactly_one_buyer(pool: PgPool) {
    let shop = PgShop::new(pool);
    let admin = shop.admin().await;
    let first = shop.customer("first@vic.test").await;
    let second = shop.customer("second@vic.test").await;
    let wax = shop.product(&admin, 1).await;

    let orders = shop.orders();
    let lines = [OrderLine {
        product_id: wax.id,
        quantity: 1,
    }];
    let addr = address();
    let (a, b) = tokio::join!(
        orders.create_order(first.id, &lines, &addr),
        orders.create_order(second.id, &lines, &addr),
    );

    assert_eq!(error_kinds([&a, &b]), [ErrorKind::InsufficientStock]);
    assert_eq!(shop.stock_of(&wax).await, 0);
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "needs DATABASE_URL"]
async fn test_concurrent_cancels_restore_stock_once(pool: PgPool) {
    let shop = PgShop::new(pool);
    let admin = shop.admin().await;
    let customer = shop.customer("sam@vic.test").await;
    let wax = shop.product(&admin, 5).await;

    let orders = shop.orders();
    let order = orders
        .create_order(
            customer.id,
            &[OrderLine {
                product_id: wax.id,
                quantity: 3,
            }],
            &address(),
        )
        .await
        .unwrap();

    let owner = customer.principal();
    let admin = admin.principal();
    let (a, b) = tokio::join!(
        orders.cancel_order(&owner, order.id),
        orders.update_status(&admin, order.id, OrderStatus::Cancelled),
    );

    assert_eq!(error_kinds([&a, &b]), [ErrorKind::InvalidTransition]);
    assert_eq!(shop.stock_of(&wax).await, 5);
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "needs DATABASE_URL"]
async fn test_concurrent_redemptions_have_one_winner(pool: PgPool) {
    let shop = PgShop::new(pool);
    let user = shop.registered("sam@vic.test").await;
    let token = shop
        .token_value(user.id, TokenKind::EmailVerification)
        .await;

    let accounts = shop.accounts();
    let (a, b) = tokio::join!(
        accounts.verify_email("sam@vic.test", &token),
        accounts.verify_email("sam@vic.test", &token),
    );

    assert_eq!(error_kinds([&a, &b]), [ErrorKind::TokenAlreadyUsed]);
    let verified = [a, b].into_iter().find_map(Result::ok).unwrap();
    assert!(verified.email_verified);
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "needs DATABASE_URL"]
async fn test_concurrent_unverified_logins_both_see_not_verified(pool: PgPool) {
    let shop = PgShop::new(pool);
    shop.registered("sam@vic.test").await;
    // The registration token has expired, so each login wants to issue one.
    shop.clock.advance(TimeDelta::hours(30));

    let accounts = shop.accounts();
    let (a, b) = tokio::join!(
        accounts.login("sam@vic.test", PASSWORD),
        accounts.login("sam@vic.test", PASSWORD),
    );

    assert_eq!(
        error_kinds([&a, &b]),
        [ErrorKind::EmailNotVerified, ErrorKind::EmailNotVerified]
    );
    assert_eq!(shop.notifier.emails_to("sam@vic.test").len(), 2);
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "needs DATABASE_URL"]
async fn test_concurrent_admin_deletes_keep_one_admin(pool: PgPool) {
    let shop = PgShop::new(pool);
    let first = shop.admin().await;
    let second = shop
        .accounts()
        .create_admin_account("second@vic.test", PASSWORD, "Bo", "Admin")
        .await
        .unwrap();

    let (by_first, by_second) = (first.principal(), second.principal());
    let accounts = shop.accounts();
    let (a, b) = tokio::join!(
        accounts.delete_user(&by_first, second.id),
        accounts.delete_user(&by_second, first.id),
    );

    assert_eq!(error_kinds([&a, &b]), [ErrorKind::Conflict]);
    let admins: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM shop.user WHERE role = 'admin'")
        .fetch_one(shop.store.pool())
        .await
        .unwrap();
    assert_eq!(admins, 1);
}

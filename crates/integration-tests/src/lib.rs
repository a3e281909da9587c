//! Integration tests for Vic Shop.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p vic-shop-integration-tests
//! ```
//!
//! Every test runs against the in-memory store with a mock clock and a
//! recording notifier, so no database or mail server is needed.
//!
//! # Test Categories
//!
//! - `inventory` - stock reservation, cancellation and the status graph
//! - `tokens` - token issue, single-use redemption, expiry and sweep
//! - `cart` - cart lines and totals
//! - `accounts` - registration, verification, login, reset, invitations
//! - `reports` - sales and inventory reports
//! - `http` - the router end to end
//! - `catalog` - product search and sorting
//! - `properties` - random operation sequences checked against a model
//! - `postgres` - the Postgres store under concurrency (needs `DATABASE_URL`)

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use chrono::{DateTime, TimeZone, Utc};
use secrecy::SecretString;
use tower::ServiceExt;

use vic_shop_core::{Price, TokenKind, UserId};
use vic_shop_storefront::config::StorefrontConfig;
use vic_shop_storefront::db::MemoryStore;
use vic_shop_storefront::middleware::session_layer;
use vic_shop_storefront::models::{NewProduct, Product, ShippingAddress, User};
use vic_shop_storefront::routes;
use vic_shop_storefront::services::accounts::Registration;
use vic_shop_storefront::services::{
    AccountService, CartService, CatalogService, Clock, MemoryNotifier, MockClock, OrderService,
    ReportService, TokenLedger,
};
use vic_shop_storefront::state::AppState;

/// Password used by every fixture account.
pub const PASSWORD: &str = "correct horse battery";

/// Base URL put into notification links.
pub const BASE_URL: &str = "http://shop.test";

/// Monday 2 March 2026, 10:00 UTC.
#[must_use]
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).single().unwrap()
}

/// A shop backed by the in-memory store.
pub struct TestShop {
    pub store: MemoryStore,
    pub clock: Arc<MockClock>,
    pub notifier: Arc<MemoryNotifier>,
}

impl Default for TestShop {
    fn default() -> Self {
        Self::new()
    }
}

impl TestShop {
    #[must_use]
    pub fn new() -> Self {
        Self::with_notifier(MemoryNotifier::new())
    }

    /// A shop whose notifier fails every delivery.
    #[must_use]
    pub fn with_failing_notifier() -> Self {
        Self::with_notifier(MemoryNotifier::failing())
    }

    fn with_notifier(notifier: MemoryNotifier) -> Self {
        Self {
            store: MemoryStore::new(),
            clock: Arc::new(MockClock::new(start_time())),
            notifier: Arc::new(notifier),
        }
    }

    #[must_use]
    pub fn accounts(&self) -> AccountService<'_> {
        AccountService::new(
            &self.store,
            self.clock.as_ref(),
            self.notifier.as_ref(),
            BASE_URL,
        )
    }

    #[must_use]
    pub fn catalog(&self) -> CatalogService<'_> {
        CatalogService::new(&self.store, self.clock.as_ref())
    }

    #[must_use]
    pub fn carts(&self) -> CartService<'_> {
        CartService::new(&self.store, self.clock.as_ref())
    }

    #[must_use]
    pub fn orders(&self) -> OrderService<'_> {
        OrderService::new(&self.store, self.clock.as_ref())
    }

    #[must_use]
    pub fn reports(&self) -> ReportService<'_> {
        ReportService::new(&self.store, self.clock.as_ref())
    }

    #[must_use]
    pub fn tokens(&self) -> TokenLedger<'_> {
        TokenLedger::new(self.clock.as_ref())
    }

    /// A verified administrator.
    pub async fn admin(&self, email: &str) -> User {
        self.accounts()
            .create_admin_account(email, PASSWORD, "Ada", "Admin")
            .await
            .unwrap()
    }

    /// A customer who registered and verified their email.
    pub async fn customer(&self, email: &str) -> User {
        let user = self
            .accounts()
            .register(registration(email, None))
            .await
            .unwrap();
        let token = self
            .active_token(user.id, TokenKind::EmailVerification)
            .await
            .unwrap();
        self.accounts().verify_email(email, &token).await.unwrap()
    }

    /// A product created by `admin`.
    pub async fn product(&self, admin: &User, name: &str, price_cents: i64, stock: i32) -> Product {
        self.catalog()
            .create(
                &admin.principal(),
                NewProduct {
                    name: name.to_owned(),
                    description: None,
                    price: Price::from_cents(price_cents).unwrap(),
                    stock_quantity: stock,
                    image_url: None,
                    category: Some("surf".to_owned()),
                    size: None,
                },
            )
            .await
            .unwrap()
    }

    /// Current stock of a product.
    pub async fn stock_of(&self, product: &Product) -> i32 {
        self.catalog().get(product.id).await.unwrap().stock_quantity
    }

    /// Value of the newest unused, unexpired token of `kind`.
    pub async fn active_token(&self, user_id: UserId, kind: TokenKind) -> Option<String> {
        let now = self.clock.now();
        self.store
            .tokens_for(user_id)
            .await
            .into_iter()
            .rev()
            .find(|t| t.kind == kind && !t.used && !t.is_expired(now))
            .map(|t| t.value)
    }

    /// The HTTP application over this shop's store, clock and notifier.
    #[must_use]
    pub fn app(&self) -> Router {
        let clock: Arc<dyn Clock> = self.clock.clone();
        let state = AppState::new(
            test_config(),
            Arc::new(self.store.clone()),
            clock,
            self.notifier.clone(),
        );
        vic_shop_storefront::app(
            state,
            routes::routes(),
            session_layer(tower_sessions::MemoryStore::default(), false),
        )
    }
}

/// Registration input with the fixture password.
#[must_use]
pub fn registration(email: &str, phone: Option<&str>) -> Registration {
    Registration {
        email: email.to_owned(),
        password: PASSWORD.to_owned(),
        first_name: "Vic".to_owned(),
        last_name: "Shopper".to_owned(),
        phone: phone.map(str::to_owned),
        address: None,
    }
}

/// A complete shipping address.
#[must_use]
pub fn address() -> ShippingAddress {
    ShippingAddress {
        street: "1 Beach Road".to_owned(),
        city: "Torquay".to_owned(),
        state: "VIC".to_owned(),
        postal_code: "3228".to_owned(),
        country: Some("Australia".to_owned()),
    }
}

fn test_config() -> StorefrontConfig {
    StorefrontConfig {
        database_url: SecretString::from("postgres://unused"),
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 3000,
        base_url: BASE_URL.to_owned(),
        lock_timeout: Duration::from_secs(5),
        email: None,
        sentry_dsn: None,
        sentry_environment: None,
    }
}

/// A decoded HTTP response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

impl TestResponse {
    /// The `name=value` pair of the session cookie, if one was set.
    #[must_use]
    pub fn session_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with("vic_session="))
            .and_then(|v| v.split(';').next())
            .map(str::to_owned)
    }
}

/// Send one request with an optional JSON body and cookie.
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
    cookie: Option<&str>,
) -> TestResponse {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };

    TestResponse {
        status,
        headers,
        body,
    }
}

/// Log in over HTTP and return the session cookie.
pub async fn login(app: &Router, email: &str) -> String {
    let response = send(
        app,
        Method::POST,
        "/auth/login",
        Some(serde_json::json!({ "email": email, "password": PASSWORD })),
        None,
    )
    .await;
    assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
    response.session_cookie().unwrap()
}

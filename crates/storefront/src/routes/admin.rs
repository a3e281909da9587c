//! Administrator route handlers.
//!
//! Every handler takes [`RequireAdmin`], and the services check the role
//! again from the principal they are given.

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{delete, get, patch, post, put},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use vic_shop_core::{OrderId, OrderStatus, ProductId, UserId, UserRole};

use crate::error::Result;
use crate::extract::{Json, Path, Query};
use crate::middleware::RequireAdmin;
use crate::models::{NewProduct, Order, Page, Product, ProductUpdate};
use crate::routes::account::UserView;
use crate::services::accounts::AdminInvite;
use crate::services::reports::{InventoryReport, SalesReport};
use crate::state::AppState;

/// Build the admin router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/{id}/status", put(update_order_status))
        .route("/products", post(create_product))
        .route(
            "/products/{id}",
            patch(update_product).delete(delete_product),
        )
        .route("/products/{id}/stock", post(adjust_stock))
        .route("/users", get(list_users))
        .route("/users/{id}", delete(delete_user))
        .route("/invitations", post(invite_admin))
        .route("/reports/sales", get(sales_report))
        .route("/reports/inventory", get(inventory_report))
        .route("/tokens/sweep", post(sweep_tokens))
}

/// Filter for the order listing.
#[derive(Debug, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
}

/// Filter for the user listing.
#[derive(Debug, Default, Deserialize)]
pub struct UserFilter {
    pub role: Option<UserRole>,
}

/// Body for a status change.
#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: OrderStatus,
}

/// Body for a stock adjustment.
#[derive(Debug, Deserialize)]
pub struct StockAdjustment {
    /// Units to add; negative removes.
    pub delta: i32,
}

/// Inclusive date range for the sales report.
#[derive(Debug, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Result of a token sweep.
#[derive(Debug, Serialize)]
pub struct SweepResult {
    /// Unused tokens past expiry.
    pub deleted: u64,
    /// Used tokens past expiry.
    pub purged: u64,
}

/// Every order, newest first.
///
/// # Errors
///
/// Returns `403` for non-admins.
#[instrument(skip_all)]
pub async fn list_orders(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Query(filter): Query<OrderFilter>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Order>>> {
    let orders = state
        .orders()
        .list_orders(&admin.principal(), filter.status, page)
        .await?;
    Ok(Json(orders))
}

/// Move an order along the status graph.
///
/// # Errors
///
/// Returns `404` for an unknown order and `409` for a transition the graph
/// does not allow.
#[instrument(skip_all)]
pub async fn update_order_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<OrderId>,
    Json(body): Json<StatusChange>,
) -> Result<Json<Order>> {
    let order = state
        .orders()
        .update_status(&admin.principal(), id, body.status)
        .await?;
    Ok(Json(order))
}

/// Create a product.
///
/// # Errors
///
/// Returns `422` for a blank name or negative stock.
#[instrument(skip_all)]
pub async fn create_product(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(body): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>)> {
    let product = state.catalog().create(&admin.principal(), body).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// Update descriptive fields and price.
///
/// # Errors
///
/// Returns `404` for an unknown product.
#[instrument(skip_all)]
pub async fn update_product(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<ProductId>,
    Json(body): Json<ProductUpdate>,
) -> Result<Json<Product>> {
    let product = state
        .catalog()
        .update(&admin.principal(), id, body)
        .await?;
    Ok(Json(product))
}

/// Delete a product that no order references.
///
/// # Errors
///
/// Returns `404` for an unknown product and `409` if an order references it.
#[instrument(skip_all)]
pub async fn delete_product(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<ProductId>,
) -> Result<StatusCode> {
    state.catalog().delete(&admin.principal(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Add or remove stock.
///
/// # Errors
///
/// Returns `409` if stock would go negative.
#[instrument(skip_all)]
pub async fn adjust_stock(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<ProductId>,
    Json(body): Json<StockAdjustment>,
) -> Result<Json<Product>> {
    let product = state
        .catalog()
        .adjust_stock(&admin.principal(), id, body.delta)
        .await?;
    Ok(Json(product))
}

/// Users, optionally filtered by role.
///
/// # Errors
///
/// Returns `403` for non-admins.
#[instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Query(filter): Query<UserFilter>,
) -> Result<Json<Vec<UserView>>> {
    let users = state
        .accounts()
        .list_users(&admin.principal(), filter.role)
        .await?;
    Ok(Json(users.into_iter().map(UserView::from).collect()))
}

/// Delete a user with no open orders.
///
/// # Errors
///
/// Returns `409` for open orders or the last administrator.
#[instrument(skip_all)]
pub async fn delete_user(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<UserId>,
) -> Result<StatusCode> {
    state.accounts().delete_user(&admin.principal(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Invite another administrator.
///
/// # Errors
///
/// Returns `409` if the email is taken.
#[instrument(skip_all)]
pub async fn invite_admin(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(body): Json<AdminInvite>,
) -> Result<(StatusCode, Json<UserView>)> {
    let user = state
        .accounts()
        .invite_admin(&admin.principal(), body)
        .await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Completed sales between two dates, inclusive.
///
/// # Errors
///
/// Returns `422` if `end` is before `start`.
#[instrument(skip_all)]
pub async fn sales_report(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Query(range): Query<DateRange>,
) -> Result<Json<SalesReport>> {
    let report = state
        .reports()
        .sales_report(&admin.principal(), range.start, range.end)
        .await?;
    Ok(Json(report))
}

/// Current stock position.
///
/// # Errors
///
/// Returns `403` for non-admins.
#[instrument(skip_all)]
pub async fn inventory_report(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<Json<InventoryReport>> {
    Ok(Json(
        state.reports().inventory_report(&admin.principal()).await?,
    ))
}

/// Delete expired verification tokens: unused ones, then used ones.
///
/// # Errors
///
/// Returns `5xx` only for infrastructure failures.
#[instrument(skip_all)]
pub async fn sweep_tokens(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<Json<SweepResult>> {
    let deleted = state.tokens().sweep_expired(state.store()).await?;
    let purged = state.tokens().purge_used(state.store()).await?;
    tracing::info!(deleted, purged, actor = %admin.id, "token sweep requested");
    Ok(Json(SweepResult { deleted, purged }))
}

//! Order and checkout route handlers.

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use tracing::instrument;

use vic_shop_core::OrderId;

use crate::error::{Result, add_breadcrumb};
use crate::extract::{Json, Path, Query};
use crate::middleware::RequireAuth;
use crate::models::{Order, OrderLine, Page, ShippingAddress};
use crate::state::AppState;

/// Build the order router. Mounted at the root: it owns `/orders` and
/// `/checkout`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(checkout))
        .route("/orders", get(index).post(create))
        .route("/orders/{id}", get(show))
        .route("/orders/{id}/cancel", post(cancel))
}

/// Request for placing an order from explicit lines.
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderLine>,
    pub shipping_address: ShippingAddress,
}

/// Checkout request body.
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub shipping_address: ShippingAddress,
}

/// Turn the cart into an order.
///
/// # Errors
///
/// Returns `422` for an empty cart or incomplete address, `409` if any line
/// cannot be covered by stock.
#[instrument(skip_all)]
pub async fn checkout(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(body): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<Order>)> {
    let order = state
        .orders()
        .checkout(user.id, &body.shipping_address)
        .await?;

    add_breadcrumb(
        "order",
        "Checked out",
        &[("order_number", order.order_number.clone())],
    );
    Ok((StatusCode::CREATED, Json(order)))
}

/// Place an order from explicit lines. The cart is untouched.
///
/// # Errors
///
/// Returns `404` for an unknown product, `409` if stock is short and `422`
/// for invalid lines or address.
#[instrument(skip_all)]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(body): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>)> {
    let order = state
        .orders()
        .create_order(user.id, &body.items, &body.shipping_address)
        .await?;

    add_breadcrumb(
        "order",
        "Placed order",
        &[("order_number", order.order_number.clone())],
    );
    Ok((StatusCode::CREATED, Json(order)))
}

/// The user's own orders, newest first.
///
/// # Errors
///
/// Returns `5xx` only for infrastructure failures.
#[instrument(skip_all)]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Order>>> {
    Ok(Json(state.orders().list_my_orders(user.id, page).await?))
}

/// One order. Owners and administrators only.
///
/// # Errors
///
/// Returns `404` for an unknown order and `403` for someone else's.
#[instrument(skip_all)]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>> {
    Ok(Json(state.orders().get_order(&user.principal(), id).await?))
}

/// Cancel one of the user's own pending orders.
///
/// # Errors
///
/// Returns `403` for someone else's order and `409` unless it is pending.
#[instrument(skip_all)]
pub async fn cancel(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>> {
    Ok(Json(
        state.orders().cancel_order(&user.principal(), id).await?,
    ))
}

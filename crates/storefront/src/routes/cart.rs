//! Cart route handlers.
//!
//! Each user has one cart, created on first access. Every response carries
//! the whole cart with freshly computed totals.

use axum::{
    Router,
    extract::State,
    routing::{get, patch, post},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use vic_shop_core::{CartId, CartItemId, ProductId};

use crate::error::Result;
use crate::extract::{Json, Path};
use crate::middleware::RequireAuth;
use crate::models::{Cart, CartItem};
use crate::state::AppState;

/// Build the cart router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(show).delete(clear))
        .route("/items", post(add))
        .route("/items/{id}", patch(update).delete(remove))
}

/// Cart display data.
#[derive(Debug, Serialize)]
pub struct CartView {
    pub id: CartId,
    pub items: Vec<CartItem>,
    pub subtotal: Decimal,
    pub total_items: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<Cart> for CartView {
    fn from(cart: Cart) -> Self {
        let subtotal = cart.subtotal();
        let total_items = cart.total_items();
        Self {
            id: cart.id,
            items: cart.items,
            subtotal,
            total_items,
            updated_at: cart.updated_at,
        }
    }
}

/// Add-to-cart request body.
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    #[serde(default = "one")]
    pub quantity: i32,
}

const fn one() -> i32 {
    1
}

/// Quantity update request body.
#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: i32,
}

/// Show the cart.
///
/// # Errors
///
/// Returns `5xx` only for infrastructure failures.
#[instrument(skip_all)]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<CartView>> {
    Ok(Json(state.carts().get_cart(user.id).await?.into()))
}

/// Add a product, merging with an existing line.
///
/// # Errors
///
/// Returns `404` for an unknown product, `409` when stock is short and `422`
/// for a quantity below 1.
#[instrument(skip_all)]
pub async fn add(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(body): Json<AddItemRequest>,
) -> Result<Json<CartView>> {
    let cart = state
        .carts()
        .add_item(user.id, body.product_id, body.quantity)
        .await?;
    Ok(Json(cart.into()))
}

/// Change the quantity of a line.
///
/// # Errors
///
/// Returns `404` for an unknown line, `409` when stock is short and `422`
/// for a quantity below 1.
#[instrument(skip_all)]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(item_id): Path<CartItemId>,
    Json(body): Json<UpdateItemRequest>,
) -> Result<Json<CartView>> {
    let cart = state
        .carts()
        .update_item(user.id, item_id, body.quantity)
        .await?;
    Ok(Json(cart.into()))
}

/// Remove a line.
///
/// # Errors
///
/// Returns `5xx` only for infrastructure failures.
#[instrument(skip_all)]
pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(item_id): Path<CartItemId>,
) -> Result<Json<CartView>> {
    Ok(Json(state.carts().remove_item(user.id, item_id).await?.into()))
}

/// Remove every line.
///
/// # Errors
///
/// Returns `5xx` only for infrastructure failures.
#[instrument(skip_all)]
pub async fn clear(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<CartView>> {
    Ok(Json(state.carts().clear(user.id).await?.into()))
}

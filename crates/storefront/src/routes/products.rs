//! Product route handlers. Public, no login needed.

use axum::{
    Router,
    extract::State,
    routing::get,
};
use serde::Deserialize;
use tracing::instrument;

use vic_shop_core::ProductId;

use crate::error::{AppError, Result};
use crate::extract::{Json, Path, Query};
use crate::models::{Page, Product, ProductSort};
use crate::state::AppState;

/// Build the product router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/search", get(search))
        .route("/{id}", get(show))
}

/// Query parameters for the product listing.
#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub category: Option<String>,
    /// `field[,asc|desc]`, e.g. `price,desc`.
    pub sort: Option<String>,
}

/// Query parameters for product search.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
}

/// List products, ordered by id unless `sort` says otherwise.
///
/// # Errors
///
/// Returns `422` for an unknown sort field or direction.
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Product>>> {
    let sort = match query.sort.as_deref() {
        Some(sort) => sort.parse::<ProductSort>().map_err(AppError::BadRequest)?,
        None => ProductSort::default(),
    };
    let products = state
        .catalog()
        .list(query.category.as_deref(), sort, page)
        .await?;
    Ok(Json(products))
}

/// Products whose name or description contains `query`, ignoring case.
///
/// # Errors
///
/// Returns `422` for a missing or blank query.
#[instrument(skip(state))]
pub async fn search(
    State(state): State<AppState>,
    Query(search): Query<SearchQuery>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.catalog().search(&search.query, page).await?))
}

/// Show one product.
///
/// # Errors
///
/// Returns `404` if the product doesn't exist.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<Product>> {
    Ok(Json(state.catalog().get(id).await?))
}

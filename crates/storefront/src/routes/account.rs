//! Account route handlers.
//!
//! These routes require authentication and act on the logged-in user only.

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use vic_shop_core::{Email, UserId, UserRole};

use crate::error::Result;
use crate::extract::Json;
use crate::middleware::RequireAuth;
use crate::models::{PostalAddress, User};
use crate::services::accounts::ProfileUpdate;
use crate::state::AppState;

/// Build the account router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(show).patch(update))
        .route("/password", post(change_password))
}

/// Public view of a user. Never includes the password hash.
#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: UserId,
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub address: Option<PostalAddress>,
    pub role: UserRole,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            phone: user.phone,
            address: user.address,
            role: user.role,
            email_verified: user.email_verified,
            phone_verified: user.phone_verified,
            enabled: user.enabled,
            created_at: user.created_at,
            last_login_at: user.last_login_at,
        }
    }
}

/// Request for changing the password.
#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// The logged-in user's profile.
///
/// # Errors
///
/// Returns `404` if the account was deleted after login.
#[instrument(skip_all)]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<UserView>> {
    let profile = state.accounts().profile(user.id).await?;
    Ok(Json(profile.into()))
}

/// Update names, phone or address.
///
/// # Errors
///
/// Returns `422` for a blank name.
#[instrument(skip_all)]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(changes): Json<ProfileUpdate>,
) -> Result<Json<UserView>> {
    let profile = state.accounts().update_profile(user.id, changes).await?;
    Ok(Json(profile.into()))
}

/// Change the password after checking the current one.
///
/// # Errors
///
/// Returns `401` if the current password is wrong, `422` if the new one is
/// too short.
#[instrument(skip_all)]
pub async fn change_password(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<StatusCode> {
    state
        .accounts()
        .change_password(user.id, &body.current_password, &body.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

//! Authentication route handlers.
//!
//! Registration, login, logout and every token redemption flow. Login stores
//! a [`CurrentUser`] in the session; nothing else reads the session.

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::post,
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{Result, clear_sentry_user, set_sentry_user};
use crate::extract::Json;
use crate::middleware::{RequireAuth, clear_current_user, set_current_user};
use crate::models::CurrentUser;
use crate::routes::account::UserView;
use crate::services::accounts::Registration;
use crate::state::AppState;

/// Build the auth router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/verify-email", post(verify_email))
        .route("/verify-phone", post(verify_phone))
        .route("/sms-verification", post(send_sms_verification))
        .route("/password-reset", post(request_password_reset))
        .route("/password-reset/confirm", post(reset_password))
        .route("/accept-invitation", post(accept_invitation))
}

/// Login request body.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body for redeeming an emailed token.
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub email: String,
    pub token: String,
}

/// Body for redeeming an SMS code.
#[derive(Debug, Deserialize)]
pub struct PhoneCodeRequest {
    pub email: String,
    pub code: String,
}

/// Body for requesting a password reset.
#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

/// Body for completing a password reset.
#[derive(Deserialize)]
pub struct PasswordResetConfirm {
    pub email: String,
    pub token: String,
    pub new_password: String,
}

/// Create a customer account. A verification email is sent; the account
/// cannot log in until it is verified.
///
/// # Errors
///
/// Returns `409` if the email is taken and `422` for invalid input.
#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<Registration>,
) -> Result<(StatusCode, Json<UserView>)> {
    let user = state.accounts().register(body).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Authenticate and start a session.
///
/// # Errors
///
/// Returns `401` for bad credentials and `403` for disabled or unverified
/// accounts.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<LoginRequest>,
) -> Result<Json<UserView>> {
    let user = state.accounts().login(&body.email, &body.password).await?;

    set_current_user(&session, &CurrentUser::from(&user)).await?;
    set_sentry_user(&user.id, Some(user.email.as_str()));

    Ok(Json(user.into()))
}

/// End the session.
///
/// # Errors
///
/// Returns `500` if the session store fails.
#[instrument(skip_all)]
pub async fn logout(session: Session) -> Result<StatusCode> {
    clear_current_user(&session).await?;
    clear_sentry_user();
    Ok(StatusCode::NO_CONTENT)
}

/// Redeem an email verification token.
///
/// # Errors
///
/// Returns the token errors: `404` unknown, `410` expired, `409` already
/// used, `422` for another account's token.
#[instrument(skip_all)]
pub async fn verify_email(
    State(state): State<AppState>,
    Json(body): Json<TokenRequest>,
) -> Result<Json<UserView>> {
    let user = state.accounts().verify_email(&body.email, &body.token).await?;
    Ok(Json(user.into()))
}

/// Redeem an SMS verification code.
///
/// # Errors
///
/// Returns the same token errors as [`verify_email`].
#[instrument(skip_all)]
pub async fn verify_phone(
    State(state): State<AppState>,
    Json(body): Json<PhoneCodeRequest>,
) -> Result<Json<UserView>> {
    let user = state.accounts().verify_phone(&body.email, &body.code).await?;
    Ok(Json(user.into()))
}

/// Send a fresh SMS code to the logged-in user's phone.
///
/// # Errors
///
/// Returns `409` if a code is still active or the phone is verified, and
/// `422` if the account has no phone number.
#[instrument(skip_all)]
pub async fn send_sms_verification(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<StatusCode> {
    state.accounts().send_sms_verification(user.id).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Request a password reset link. Always `202`, whether or not the email
/// is registered.
///
/// # Errors
///
/// Returns `5xx` only for infrastructure failures.
#[instrument(skip_all)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(body): Json<PasswordResetRequest>,
) -> Result<StatusCode> {
    state.accounts().request_password_reset(&body.email).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Set a new password using a reset token.
///
/// # Errors
///
/// Returns the token errors of [`verify_email`] and `422` for a short
/// password.
#[instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<PasswordResetConfirm>,
) -> Result<StatusCode> {
    state
        .accounts()
        .reset_password(&body.email, &body.token, &body.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Redeem an administrator invitation.
///
/// # Errors
///
/// Returns the token errors of [`verify_email`].
#[instrument(skip_all)]
pub async fn accept_invitation(
    State(state): State<AppState>,
    Json(body): Json<TokenRequest>,
) -> Result<Json<UserView>> {
    let user = state
        .accounts()
        .accept_invitation(&body.email, &body.token)
        .await?;
    Ok(Json(user.into()))
}

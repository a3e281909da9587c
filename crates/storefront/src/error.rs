//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server-side errors to
//! Sentry before responding to the client. All route handlers return
//! `Result<T, AppError>`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use vic_shop_core::ErrorKind;

use crate::services::ServiceError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// A service operation failed.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The session store failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Malformed request body, path or query string.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    /// The stable category reported to the client.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Service(err) => err.kind(),
            Self::Unauthorized(_) => ErrorKind::Authorization,
            Self::BadRequest(_) => ErrorKind::Validation,
            Self::Session(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        if let Self::Unauthorized(_) = self {
            return StatusCode::UNAUTHORIZED;
        }
        status_for(self.kind())
    }
}

/// Map each error kind to a status code.
#[must_use]
pub const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict
        | ErrorKind::InsufficientStock
        | ErrorKind::InvalidTransition
        | ErrorKind::TokenAlreadyUsed => StatusCode::CONFLICT,
        ErrorKind::TokenExpired => StatusCode::GONE,
        ErrorKind::TokenMismatch | ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Authorization | ErrorKind::AccountDisabled | ErrorKind::EmailNotVerified => {
            StatusCode::FORBIDDEN
        }
        ErrorKind::InvalidCredentials => StatusCode::UNAUTHORIZED,
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                kind = %kind,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Don't expose internal error details to clients
        let message = match kind {
            ErrorKind::Internal => "Internal server error".to_string(),
            ErrorKind::Unavailable => "Service busy, please retry".to_string(),
            _ => self.to_string(),
        };

        let mut response = (
            status,
            Json(json!({ "error": kind.as_str(), "message": message })),
        )
            .into_response();
        if kind.is_retryable() {
            response.headers_mut().insert(
                axum::http::header::RETRY_AFTER,
                axum::http::HeaderValue::from_static("1"),
            );
        }
        response
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for a state-changing user action.
pub fn add_breadcrumb(category: &str, message: &str, data: &[(&str, String)]) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    for (key, value) in data {
        breadcrumb
            .data
            .insert((*key).to_string(), serde_json::Value::String(value.clone()));
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use vic_shop_core::{OrderStatus, ProductId};

    use super::*;
    use crate::db::RepositoryError;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_service_error_status_codes() {
        assert_eq!(
            get_status(ServiceError::NotFound("order 7".to_string()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(
                ServiceError::InsufficientStock {
                    product_id: ProductId::new(1),
                    product_name: "Tee".to_string(),
                    requested: 2,
                    available: 1,
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(
                ServiceError::InvalidTransition {
                    from: OrderStatus::Cancelled,
                    to: OrderStatus::Cancelled,
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(ServiceError::TokenExpired.into()),
            StatusCode::GONE
        );
        assert_eq!(
            get_status(ServiceError::Authorization("admin only".to_string()).into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(ServiceError::InvalidCredentials.into()),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_infrastructure_status_codes() {
        assert_eq!(
            get_status(ServiceError::from(RepositoryError::Contention("lock timeout".to_string())).into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            get_status(
                ServiceError::from(RepositoryError::DataCorruption("bad row".to_string())).into()
            ),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(AppError::Unauthorized("login required".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::BadRequest("bad date".to_string())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_retry_after_on_contention() {
        let response =
            AppError::from(ServiceError::from(RepositoryError::Contention("deadlock".to_string())))
                .into_response();
        assert_eq!(
            response.headers().get(axum::http::header::RETRY_AFTER),
            Some(&axum::http::HeaderValue::from_static("1"))
        );
    }
}

//! Business logic for the storefront.
//!
//! # Services
//!
//! - [`tokens`] - verification token issue, redemption and sweep
//! - [`cart`] - per-user cart with stock checks
//! - [`orders`] - order placement, checkout, cancellation, status changes
//! - [`catalog`] - product browsing and administration
//! - [`accounts`] - registration, login, verification, profiles, invitations
//! - [`reports`] - sales and inventory reports
//!
//! Every service borrows a [`Store`](crate::db::Store) and a
//! [`Clock`](clock::Clock), runs each operation in one unit of work and takes
//! the acting [`Principal`](crate::models::Principal) as an argument.

pub mod accounts;
pub mod cart;
pub mod catalog;
pub mod clock;
pub mod notify;
pub mod orders;
pub mod reports;
pub mod tokens;

use thiserror::Error;

use vic_shop_core::{EmailError, ErrorKind, OrderStatus, ProductId};

use crate::db::RepositoryError;
use crate::models::Principal;

pub use accounts::AccountService;
pub use cart::CartService;
pub use catalog::CatalogService;
pub use clock::{Clock, MockClock, SystemClock};
pub use notify::{LogNotifier, MemoryNotifier, Notifier, NotifyError, SmtpNotifier};
pub use orders::OrderService;
pub use reports::ReportService;
pub use tokens::TokenLedger;

/// Errors returned by service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The named entity does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The operation clashes with existing state.
    #[error("{0}")]
    Conflict(String),

    /// Not enough stock to satisfy a request.
    #[error(
        "insufficient stock for {product_name} (product {product_id}): \
         requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        product_name: String,
        requested: i32,
        available: i32,
    },

    /// The order status graph has no such edge.
    #[error("cannot change order status from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("token has expired")]
    TokenExpired,

    #[error("token has already been used")]
    TokenAlreadyUsed,

    #[error("token does not belong to this account")]
    TokenMismatch,

    /// The principal may not perform the operation.
    #[error("not authorized: {0}")]
    Authorization(String),

    /// Input failed validation.
    #[error("{0}")]
    Validation(String),

    /// Unknown email or wrong password.
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("account is disabled")]
    AccountDisabled,

    /// Login refused until the email address is verified.
    #[error("email address has not been verified")]
    EmailNotVerified,

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,

    /// Repository/database error.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl ServiceError {
    /// The stable category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::Repository(RepositoryError::NotFound) => ErrorKind::NotFound,
            Self::Conflict(_) | Self::Repository(RepositoryError::Conflict(_)) => {
                ErrorKind::Conflict
            }
            Self::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::TokenExpired => ErrorKind::TokenExpired,
            Self::TokenAlreadyUsed => ErrorKind::TokenAlreadyUsed,
            Self::TokenMismatch => ErrorKind::TokenMismatch,
            Self::Authorization(_) => ErrorKind::Authorization,
            Self::Validation(_) => ErrorKind::Validation,
            Self::InvalidCredentials => ErrorKind::InvalidCredentials,
            Self::AccountDisabled => ErrorKind::AccountDisabled,
            Self::EmailNotVerified => ErrorKind::EmailNotVerified,
            Self::Repository(RepositoryError::Contention(_)) => ErrorKind::Unavailable,
            Self::PasswordHash
            | Self::Repository(
                RepositoryError::Database(_) | RepositoryError::DataCorruption(_),
            ) => ErrorKind::Internal,
        }
    }

    pub(crate) fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }
}

impl From<EmailError> for ServiceError {
    fn from(e: EmailError) -> Self {
        Self::Validation(e.to_string())
    }
}

/// Fail with `Authorization` unless `principal` is an administrator.
pub(crate) fn require_admin(principal: &Principal, action: &str) -> Result<(), ServiceError> {
    if principal.is_admin() {
        Ok(())
    } else {
        Err(ServiceError::Authorization(format!(
            "only administrators may {action}"
        )))
    }
}

/// Fail with `Validation` unless `quantity` is at least one.
pub(crate) fn require_positive_quantity(quantity: i32) -> Result<(), ServiceError> {
    if quantity < 1 {
        return Err(ServiceError::Validation(
            "quantity must be at least 1".to_owned(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use vic_shop_core::{UserId, UserRole};

    use super::*;

    #[test]
    fn test_contention_is_unavailable() {
        let err = ServiceError::from(RepositoryError::Contention("lock timeout".to_owned()));
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert!(err.kind().is_retryable());
    }

    #[test]
    fn test_repository_conflict_keeps_its_kind() {
        let err = ServiceError::from(RepositoryError::Conflict("email".to_owned()));
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = ServiceError::from(RepositoryError::NotFound);
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_infrastructure_faults_are_internal() {
        let err = ServiceError::from(RepositoryError::DataCorruption("bad row".to_owned()));
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(ServiceError::PasswordHash.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_require_admin() {
        let customer = Principal {
            user_id: UserId::new(1),
            role: UserRole::Customer,
        };
        let admin = Principal {
            user_id: UserId::new(2),
            role: UserRole::Admin,
        };
        assert!(matches!(
            require_admin(&customer, "delete products"),
            Err(ServiceError::Authorization(_))
        ));
        assert!(require_admin(&admin, "delete products").is_ok());
    }

    #[test]
    fn test_quantity_must_be_positive() {
        assert!(require_positive_quantity(1).is_ok());
        assert!(matches!(
            require_positive_quantity(0),
            Err(ServiceError::Validation(_))
        ));
        assert!(require_positive_quantity(-3).is_err());
    }
}

//! Stable error categories shared by the engines and their callers.

use serde::{Deserialize, Serialize};

/// The category of a failed operation.
///
/// Every service error maps to exactly one kind. The HTTP layer maps kinds to
/// status codes, and clients match on [`ErrorKind::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InsufficientStock,
    InvalidTransition,
    TokenExpired,
    TokenAlreadyUsed,
    TokenMismatch,
    Authorization,
    Validation,
    InvalidCredentials,
    AccountDisabled,
    EmailNotVerified,
    /// Lock contention or a serialization failure; the caller may retry.
    Unavailable,
    Internal,
}

impl ErrorKind {
    /// Stable snake_case code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::InsufficientStock => "insufficient_stock",
            Self::InvalidTransition => "invalid_transition",
            Self::TokenExpired => "token_expired",
            Self::TokenAlreadyUsed => "token_already_used",
            Self::TokenMismatch => "token_mismatch",
            Self::Authorization => "authorization",
            Self::Validation => "validation",
            Self::InvalidCredentials => "invalid_credentials",
            Self::AccountDisabled => "account_disabled",
            Self::EmailNotVerified => "email_not_verified",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
        }
    }

    /// Whether retrying the same request may succeed.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Unavailable)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_matches_serde_name() {
        for kind in [
            ErrorKind::NotFound,
            ErrorKind::InsufficientStock,
            ErrorKind::TokenAlreadyUsed,
            ErrorKind::EmailNotVerified,
        ] {
            let json = serde_json::to_string(&kind).ok();
            assert_eq!(json, Some(format!("\"{}\"", kind.as_str())));
        }
    }

    #[test]
    fn test_only_unavailable_is_retryable() {
        assert!(ErrorKind::Unavailable.is_retryable());
        assert!(!ErrorKind::Conflict.is_retryable());
    }
}

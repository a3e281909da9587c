//! Verification token kinds and their lifetimes.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

/// What a verification token proves when redeemed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.token_kind", rename_all = "snake_case")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenKind {
    /// Proves control of the account email address.
    EmailVerification,
    /// Proves control of the account phone number. Values are 6-digit codes.
    SmsVerification,
    /// Authorizes setting a new password.
    PasswordReset,
    /// Lets an invited administrator activate their account.
    AdminInvitation,
}

impl TokenKind {
    /// How long a freshly issued token stays redeemable.
    #[must_use]
    pub fn ttl(self) -> TimeDelta {
        match self {
            Self::AdminInvitation => TimeDelta::days(7),
            Self::EmailVerification | Self::SmsVerification | Self::PasswordReset => {
                TimeDelta::hours(24)
            }
        }
    }

    /// Whether values of this kind are short numeric codes typed in by hand.
    #[must_use]
    pub const fn is_numeric_code(self) -> bool {
        matches!(self, Self::SmsVerification)
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmailVerification => write!(f, "EMAIL_VERIFICATION"),
            Self::SmsVerification => write!(f, "SMS_VERIFICATION"),
            Self::PasswordReset => write!(f, "PASSWORD_RESET"),
            Self::AdminInvitation => write!(f, "ADMIN_INVITATION"),
        }
    }
}

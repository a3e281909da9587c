//! Verification token types.

use chrono::{DateTime, Utc};

use vic_shop_core::{TokenId, TokenKind, UserId};

/// A single-use, time-bounded secret tied to one user.
#[derive(Debug, Clone)]
pub struct VerificationToken {
    pub id: TokenId,
    /// Opaque value sent to the user. Unique per kind.
    pub value: String,
    pub user_id: UserId,
    pub kind: TokenKind,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl VerificationToken {
    /// Expired tokens stay in storage until swept.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Unused and not past expiry.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.used && !self.is_expired(now)
    }
}

/// Data for inserting a token.
#[derive(Debug, Clone)]
pub struct NewToken {
    pub value: String,
    pub user_id: UserId,
    pub kind: TokenKind,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

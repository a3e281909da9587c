//! User domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vic_shop_core::{Email, UserId, UserRole};

/// A storefront account (domain type).
///
/// Carries no authentication-framework behaviour; see
/// [`CurrentUser`](super::CurrentUser) for the session adapter.
#[derive(Debug, Clone)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Login email, unique across users.
    pub email: Email,
    /// Argon2id PHC string.
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    /// Phone number for SMS verification.
    pub phone: Option<String>,
    /// Default postal address.
    pub address: Option<PostalAddress>,
    pub role: UserRole,
    pub email_verified: bool,
    pub phone_verified: bool,
    /// Disabled accounts cannot log in.
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    /// The principal this user acts as.
    #[must_use]
    pub const fn principal(&self) -> Principal {
        Principal {
            user_id: self.id,
            role: self.role,
        }
    }

    /// Display name.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_owned()
    }
}

/// Data for inserting a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: Email,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

/// A postal address stored on a user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: Option<String>,
}

/// The identity an operation is performed as.
///
/// Passed explicitly to every service call that needs authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub role: UserRole,
}

impl Principal {
    /// Whether this principal may perform administrative operations.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

//! Admin user management.
//!
//! # Usage
//!
//! ```bash
//! # Create a verified administrator with a generated password
//! vic-cli admin create -e admin@example.com -f Ada -l Lovelace
//!
//! # ...or with a chosen one
//! vic-cli admin create -e admin@example.com -f Ada -l Lovelace -p 'long passphrase'
//! ```
//!
//! Further administrators should be invited from the API instead.

use vic_shop_core::UserId;
use vic_shop_storefront::services::accounts::generate_temporary_password;
use vic_shop_storefront::services::{AccountService, LogNotifier, SystemClock};

use super::{CliError, store};

/// Create a verified administrator and return its id.
pub async fn create_user(
    email: &str,
    first_name: &str,
    last_name: &str,
    password: Option<String>,
) -> Result<UserId, CliError> {
    let store = store().await?;
    let clock = SystemClock;
    let notifier = LogNotifier;
    let accounts = AccountService::new(&store, &clock, &notifier, "");

    let generated = password.is_none();
    let password = password.unwrap_or_else(generate_temporary_password);

    tracing::info!("Creating admin user: {email}");
    let user = accounts
        .create_admin_account(email, &password, first_name, last_name)
        .await?;

    tracing::info!("Admin user created successfully! ID: {}, Email: {}", user.id, user.email);
    if generated {
        tracing::warn!("Generated password: {password}");
        tracing::warn!("Change it after the first login.");
    }

    Ok(user.id)
}

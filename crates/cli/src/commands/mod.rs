//! CLI subcommands.

pub mod admin;
pub mod migrate;
pub mod tokens;

use std::time::Duration;

use secrecy::SecretString;
use sqlx::PgPool;
use thiserror::Error;

use vic_shop_storefront::db::{self, PgStore};
use vic_shop_storefront::services::ServiceError;

/// Lock timeout for CLI units of work. Operators can wait longer than
/// requests.
const CLI_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Connect to the storefront database.
pub async fn connect() -> Result<PgPool, CliError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("STOREFRONT_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| CliError::MissingEnvVar("STOREFRONT_DATABASE_URL"))?;

    tracing::info!("Connecting to storefront database...");
    Ok(db::create_pool(&database_url).await?)
}

/// A store over a fresh connection pool.
pub async fn store() -> Result<PgStore, CliError> {
    Ok(PgStore::new(connect().await?, CLI_LOCK_TIMEOUT))
}

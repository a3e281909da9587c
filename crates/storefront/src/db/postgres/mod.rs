//! `PostgreSQL` store.
//!
//! Each unit of work is one `READ COMMITTED` transaction. Rows are locked with
//! `SELECT ... FOR UPDATE` before any check-then-write, and
//! `SET LOCAL lock_timeout` bounds how long a lock wait may take.

mod carts;
mod orders;
mod products;
mod tokens;
mod users;

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use super::{RepositoryError, Store, UnitOfWork};

/// `PostgreSQL`-backed [`Store`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgStore {
    /// Create a store over `pool`. Lock waits longer than `lock_timeout`
    /// fail with [`RepositoryError::Contention`].
    #[must_use]
    pub const fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // SET does not accept bind parameters; the value is a formatted integer.
        let statement = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout.as_millis());
        sqlx::query(&statement).execute(&mut *tx).await?;

        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// A unit of work over one `PostgreSQL` transaction.
///
/// Dropping it without [`UnitOfWork::commit`] rolls the transaction back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let Self { tx } = *self;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        let Self { tx } = *self;
        tx.rollback().await?;
        Ok(())
    }
}

/// Map a unique violation to `Conflict`, everything else through `From`.
fn conflict_on_unique(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::from(e)
}

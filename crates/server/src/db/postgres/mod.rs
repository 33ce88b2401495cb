//! `PostgreSQL` implementation of the store traits.
//!
//! Queries are runtime-checked (`sqlx::query_as` + `FromRow` row types) and
//! always run on the transaction owned by [`PgTx`].

mod carts;
mod checkouts;
mod products;
mod tokens;
mod users;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use super::{RepoResult, RepositoryError, Store, StoreTx};

/// Store backed by a `PostgreSQL` pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// An open `PostgreSQL` transaction.
///
/// Dropping it without committing rolls back.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> RepoResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn health_check(&self) -> RepoResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn commit(self: Box<Self>) -> RepoResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

/// Map a unique violation to `Conflict`, anything else to `Database`.
fn conflict_or_database(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(what.to_owned());
    }
    RepositoryError::Database(e)
}

/// Convert a stored `INTEGER` quantity into the domain type.
fn quantity_from_db(quantity: i32) -> RepoResult<u32> {
    u32::try_from(quantity)
        .map_err(|_| RepositoryError::DataCorruption(format!("negative quantity {quantity}")))
}

/// Convert a domain quantity into the stored `INTEGER`.
fn quantity_to_db(quantity: u32) -> RepoResult<i32> {
    i32::try_from(quantity)
        .map_err(|_| RepositoryError::Conflict(format!("quantity {quantity} out of range")))
}

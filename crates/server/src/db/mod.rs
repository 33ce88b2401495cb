//! Persistence for the server.
//!
//! # Database schema: `shop`
//!
//! ## Tables
//!
//! - `user` / `user_password` - Accounts and Argon2 password hashes
//! - `token` - Digests of issued access/refresh tokens
//! - `product` - Catalogue (soft-deleted rows are never read)
//! - `cart` / `cart_item` - Carts, at most one `active` cart per user
//! - `checkout` - Immutable checkout records
//!
//! # Backends
//!
//! Services talk to the [`Store`] trait. [`PgStore`] is the production
//! implementation; [`MemoryStore`] keeps everything in-process and backs the
//! test suites.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p marketstall-cli -- migrate
//! ```

pub mod memory;
pub mod postgres;
mod store;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use memory::{Fault, MemoryStore};
pub use postgres::PgStore;
pub use store::{CartRepo, CheckoutRepo, ProductRepo, Store, StoreTx, TokenRepo, UserRepo};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// Failure injected by [`MemoryStore`] for tests.
    #[error("injected failure: {0}")]
    Injected(&'static str),
}

/// Result alias for repository operations.
pub type RepoResult<T> = Result<T, RepositoryError>;

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

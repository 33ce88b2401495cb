//! Database migrations.
//!
//! Migrations live in `crates/server/migrations/` and are embedded at
//! compile time. The server never runs them itself.

use super::{CliError, connect};

/// Apply pending migrations.
pub async fn run() -> Result<(), CliError> {
    let pool = connect().await?;

    tracing::info!("Running migrations...");
    sqlx::migrate!("../server/migrations").run(&pool).await?;

    tracing::info!("Migrations complete!");
    Ok(())
}

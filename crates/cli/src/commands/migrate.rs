//! Database migration commands.
//!
//! # Usage
//!
//! ```bash
//! # Apply pending migrations
//! storehub-cli migrate
//!
//! # List applied and pending migrations without changing anything
//! storehub-cli migrate --status
//! ```
//!
//! # Environment Variables
//!
//! - `STOREHUB_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! Migration files live in `crates/storefront/migrations/` and are embedded
//! into the binary at build time.

use std::collections::HashSet;

use tracing::info;

use storehub_storefront::db::{self, MIGRATOR};

use super::{CommandError, database_url};

/// Apply all pending migrations.
///
/// # Errors
///
/// Returns `CommandError` if the database is unreachable or a migration fails.
pub async fn run() -> Result<(), CommandError> {
    let database_url = database_url()?;

    info!("Connecting to database...");
    let pool = db::create_pool(&database_url, 1).await?;

    info!("Running migrations...");
    db::run_migrations(&pool).await?;

    info!("Migrations complete!");
    pool.close().await;
    Ok(())
}

/// Report which embedded migrations are applied.
///
/// # Errors
///
/// Returns `CommandError` if the database is unreachable.
pub async fn status() -> Result<(), CommandError> {
    let database_url = database_url()?;
    let pool = db::create_pool(&database_url, 1).await?;

    // `_sqlx_migrations` is created by the first `migrate` run.
    let tracked: bool =
        sqlx::query_scalar("SELECT to_regclass('_sqlx_migrations') IS NOT NULL")
            .fetch_one(&pool)
            .await?;
    let applied: HashSet<i64> = if tracked {
        sqlx::query_scalar::<_, i64>("SELECT version FROM _sqlx_migrations WHERE success")
            .fetch_all(&pool)
            .await?
            .into_iter()
            .collect()
    } else {
        HashSet::new()
    };

    for migration in MIGRATOR.iter() {
        let state = if applied.contains(&migration.version) {
            "applied"
        } else {
            "pending"
        };
        info!(
            version = migration.version,
            description = %migration.description,
            "{state}"
        );
    }

    pool.close().await;
    Ok(())
}

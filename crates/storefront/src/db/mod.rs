//! Database connection management for `PostgreSQL`.
//!
//! # Database: `storehub`
//!
//! ## Tables (schema `storehub`)
//!
//! - `store` - Merchant stores (tenant scope, addressed by slug)
//! - `product` - Catalog with a non-negative `stock` counter and soft-delete flag
//! - `customer_order` - Orders with status and `delivered_at` stamp
//! - `order_item` - Immutable order lines (cascade-deleted with their order)
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p storehub-cli -- migrate
//! ```
//!
//! The pool is created once at start-up and handed to
//! [`PgLedger`](crate::ledger::PgLedger); close it on shutdown with
//! [`PgPool::close`].

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

/// Embedded schema migrations.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Errors that can occur during storage operations.
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

    /// Constraint violation (e.g., duplicate idempotency key).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// The storage backend cannot serve requests.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Create a `PostgreSQL` connection pool.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
/// * `max_connections` - Upper bound on pooled connections
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(
    database_url: &secrecy::SecretString,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(2.min(max_connections))
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Apply all pending migrations.
///
/// # Errors
///
/// Returns `MigrateError` if a migration fails or the history diverges.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}

/// Map a unique-constraint violation to `RepositoryError::Conflict`.
pub(crate) fn map_unique_violation(err: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(err)
}

//! CLI subcommands.

pub mod migrate;
pub mod seed;

use secrecy::SecretString;
use thiserror::Error;

use storehub_storefront::db::RepositoryError;

/// Errors from CLI commands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Storage error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid seed file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Seed file failed validation with {0} error(s)")]
    Invalid(usize),
}

/// Database URL from `STOREHUB_DATABASE_URL`, falling back to `DATABASE_URL`.
fn database_url() -> Result<SecretString, CommandError> {
    // Load .env file if present (ignore errors if not found)
    dotenvy::dotenv().ok();

    std::env::var("STOREHUB_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| CommandError::MissingEnvVar("STOREHUB_DATABASE_URL"))
}

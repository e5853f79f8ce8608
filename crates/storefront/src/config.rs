//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREHUB_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! ## Optional
//! - `STOREHUB_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREHUB_PORT` - Listen port (default: 3000)
//! - `STOREHUB_DB_MAX_CONNECTIONS` - Pool size (default: 10)
//! - `STOREHUB_LOW_STOCK_THRESHOLD` - Stock at or below which a product is "low" (default: 5)
//! - `STOREHUB_ORDER_TIMEOUT_MS` - Bound on one order placement, 0 disables (default: 5000)
//! - `STOREHUB_ALLOWED_ORIGINS` - Comma-separated CORS origins (default: none)
//! - `STOREHUB_LOG_FORMAT` - `text` or `json` (default: text)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error event sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Performance trace sample rate (default: 0.0)

use std::fmt::Display;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("expected `text` or `json`, got `{other}`")),
        }
    }
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Upper bound on pooled database connections
    pub db_max_connections: u32,
    /// Stock at or below which products are reported as low
    pub low_stock_threshold: i32,
    /// Bound on one order placement (`None` = unbounded)
    pub order_timeout: Option<Duration>,
    /// Origins allowed by CORS (empty = same-origin only)
    pub allowed_origins: Vec<String>,
    /// Log output format
    pub log_format: LogFormat,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate
    pub sentry_traces_sample_rate: f32,
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvSource { lookup };

        let database_url = env.database_url("STOREHUB_DATABASE_URL")?;
        let host = env.parsed::<IpAddr>("STOREHUB_HOST", "127.0.0.1")?;
        let port = env.parsed::<u16>("STOREHUB_PORT", "3000")?;
        let db_max_connections = env.parsed::<u32>("STOREHUB_DB_MAX_CONNECTIONS", "10")?;
        if db_max_connections == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "STOREHUB_DB_MAX_CONNECTIONS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let low_stock_threshold = env.parsed::<i32>("STOREHUB_LOW_STOCK_THRESHOLD", "5")?;
        let timeout_ms = env.parsed::<u64>("STOREHUB_ORDER_TIMEOUT_MS", "5000")?;
        let order_timeout = (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms));
        let allowed_origins = env
            .optional("STOREHUB_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        let log_format = env.parsed::<LogFormat>("STOREHUB_LOG_FORMAT", "text")?;

        Ok(Self {
            database_url,
            host,
            port,
            db_max_connections,
            low_stock_threshold,
            order_timeout,
            allowed_origins,
            log_format,
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: env.rate("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: env.rate("SENTRY_TRACES_SAMPLE_RATE", "0.0")?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct EnvSource<F> {
    lookup: F,
}

impl<F> EnvSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Get an optional variable. Blank values count as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    /// Parse a variable, falling back to `default` when unset.
    fn parsed<T>(&self, key: &str, default: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self.optional(key).unwrap_or_else(|| default.to_string());
        raw.trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    }

    /// Parse a sample rate in `0.0..=1.0`.
    fn rate(&self, key: &str, default: &str) -> Result<f32, ConfigError> {
        let rate = self.parsed::<f32>(key, default)?;
        if !(0.0..=1.0).contains(&rate) {
            return Err(ConfigError::InvalidEnvVar(
                key.to_string(),
                format!("must be between 0.0 and 1.0 (got {rate})"),
            ));
        }
        Ok(rate)
    }

    /// Get database URL with fallback to generic `DATABASE_URL` (set by most hosting providers).
    fn database_url(&self, primary_key: &str) -> Result<SecretString, ConfigError> {
        self.optional(primary_key)
            .or_else(|| self.optional("DATABASE_URL"))
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar(primary_key.to_string()))
    }
}

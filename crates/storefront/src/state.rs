//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tracing::debug;

use crate::config::StorefrontConfig;
use crate::db::RepositoryError;
use crate::ledger::Storage;
use crate::models::Store;
use crate::services::{OrderService, Reporting};

/// How long a resolved store slug stays cached.
const STORE_CACHE_TTL: Duration = Duration::from_secs(60);

/// Engine settings that do not depend on the storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub low_stock_threshold: i32,
    pub order_timeout: Option<Duration>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            low_stock_threshold: 5,
            order_timeout: Some(Duration::from_secs(5)),
        }
    }
}

impl From<&StorefrontConfig> for EngineSettings {
    fn from(config: &StorefrontConfig) -> Self {
        Self {
            low_stock_threshold: config.low_stock_threshold,
            order_timeout: config.order_timeout,
        }
    }
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and is generic over the storage
/// backend so the same router serves `PostgreSQL` and in-memory storage.
pub struct AppState<S> {
    inner: Arc<AppStateInner<S>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct AppStateInner<S> {
    storage: S,
    orders: OrderService<S>,
    reporting: Reporting<S>,
    stores: Cache<String, Store>,
    settings: EngineSettings,
}

impl<S: Storage> AppState<S> {
    /// Create a new application state over `storage`.
    #[must_use]
    pub fn new(storage: S, settings: EngineSettings) -> Self {
        let stores = Cache::builder()
            .max_capacity(1000)
            .time_to_live(STORE_CACHE_TTL)
            .build();

        Self {
            inner: Arc::new(AppStateInner {
                orders: OrderService::new(storage.clone(), settings.order_timeout),
                reporting: Reporting::new(storage.clone(), settings.low_stock_threshold),
                storage,
                stores,
                settings,
            }),
        }
    }

    /// Get a reference to the storage backend.
    #[must_use]
    pub fn storage(&self) -> &S {
        &self.inner.storage
    }

    /// Get a reference to the order engine.
    #[must_use]
    pub fn orders(&self) -> &OrderService<S> {
        &self.inner.orders
    }

    /// Get a reference to the reporting aggregator.
    #[must_use]
    pub fn reporting(&self) -> &Reporting<S> {
        &self.inner.reporting
    }

    /// Get the engine settings.
    #[must_use]
    pub fn settings(&self) -> EngineSettings {
        self.inner.settings
    }

    /// Resolve a store by slug, caching hits.
    ///
    /// Misses are not cached so a newly created store is visible immediately.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the lookup fails.
    pub async fn store_by_slug(&self, slug: &str) -> Result<Option<Store>, RepositoryError> {
        if let Some(store) = self.inner.stores.get(slug).await {
            debug!(slug, "Cache hit for store");
            return Ok(Some(store));
        }

        let store = self.inner.storage.store_by_slug(slug).await?;
        if let Some(store) = &store {
            self.inner
                .stores
                .insert(slug.to_owned(), store.clone())
                .await;
        }
        Ok(store)
    }
}

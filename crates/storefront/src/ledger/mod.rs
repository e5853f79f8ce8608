//! Storage seams for the order engine.
//!
//! Three traits split storage by access pattern:
//!
//! - [`OrderLedger`] - the write path. Hands out [`LedgerTx`] units of work for
//!   order placement and applies status transitions.
//! - [`ReportSource`] - read-only reporting queries.
//! - [`Catalog`] - storefront and merchant reads (stores, products, orders).
//!
//! [`Storage`] is the blanket combination used by the HTTP layer.
//!
//! ## Backends
//!
//! - [`PgLedger`] - `PostgreSQL` via sqlx (production)
//! - [`MemoryLedger`] - in-process maps with the same guard semantics (tests, dev)
//!
//! ## Unit-of-work contract
//!
//! A `LedgerTx` groups reads and writes that become visible together on
//! [`LedgerTx::commit`] or not at all. [`LedgerTx::decrement_stock`] is the only
//! way stock changes: it evaluates `stock >= quantity` at update time and
//! reports `false` when the guard fails instead of writing. Dropping a
//! `LedgerTx` without committing discards its effects.

pub mod memory;
pub mod postgres;

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};

use storehub_core::{OrderId, OrderStatus, ProductId, Quantity, StoreId};

use crate::db::RepositoryError;
use crate::models::{
    LineItem, LowStockProduct, NewOrder, Order, OrderDetail, OrderFilter, OrderStats, Product,
    RecentOrder, RevenuePoint, Store,
};

pub use memory::{MemoryLedger, MemoryTx};
pub use postgres::{PgLedger, PgTx};

/// A status transition as applied to storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub status: OrderStatus,
    /// Timestamp used if the transition stamps `delivered_at`.
    pub at: DateTime<Utc>,
}

/// One atomic order-placement attempt.
pub trait LedgerTx: Send {
    /// Current stock of a live (not deleted) product of `store_id`.
    ///
    /// Returns `None` if the product does not exist, belongs to another store,
    /// or is soft-deleted. The value is advisory: it may be stale by the time
    /// stock is decremented.
    fn product_stock(
        &mut self,
        store_id: StoreId,
        product_id: ProductId,
    ) -> impl Future<Output = Result<Option<i32>, RepositoryError>> + Send;

    /// Insert the order row with status `pending`.
    ///
    /// Returns `RepositoryError::Conflict` if the order's idempotency key is
    /// already used in this store.
    fn insert_order(
        &mut self,
        store_id: StoreId,
        order: &NewOrder,
    ) -> impl Future<Output = Result<OrderId, RepositoryError>> + Send;

    /// Insert one order line, snapshotting `item.unit_price`.
    fn insert_item(
        &mut self,
        order_id: OrderId,
        item: &LineItem,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Guarded decrement: `stock = stock - quantity` iff `stock >= quantity`.
    ///
    /// Returns `true` if exactly one row was updated, `false` if the guard
    /// failed (or the product vanished).
    fn decrement_stock(
        &mut self,
        store_id: StoreId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;

    /// Publish every effect of this unit of work.
    fn commit(self) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Discard every effect of this unit of work.
    fn rollback(self) -> impl Future<Output = Result<(), RepositoryError>> + Send;
}

/// Write-side storage for orders and stock.
pub trait OrderLedger: Clone + Send + Sync + 'static {
    type Tx: LedgerTx;

    /// Open a unit of work.
    fn begin(&self) -> impl Future<Output = Result<Self::Tx, RepositoryError>> + Send;

    /// Look up an order previously placed with `key` in this store.
    fn find_order_by_key(
        &self,
        store_id: StoreId,
        key: &str,
    ) -> impl Future<Output = Result<Option<OrderId>, RepositoryError>> + Send;

    /// Apply a status transition to an order of `store_id`.
    ///
    /// Only `status` and `delivered_at` change, following
    /// [`OrderStatus::delivered_at_after`]. Returns the number of rows
    /// updated: `0` when the order does not exist or belongs to another store.
    fn set_status(
        &self,
        order_id: OrderId,
        store_id: StoreId,
        change: StatusChange,
    ) -> impl Future<Output = Result<u64, RepositoryError>> + Send;
}

/// Read-only queries behind the merchant dashboard.
pub trait ReportSource: Clone + Send + Sync + 'static {
    /// Number of delivered orders.
    fn delivered_count(
        &self,
        store_id: StoreId,
    ) -> impl Future<Output = Result<i64, RepositoryError>> + Send;

    /// Delivered revenue per day for every date in `first..=last`.
    ///
    /// Days without deliveries are present with zero revenue; the result is
    /// chronological and contiguous.
    fn revenue_series(
        &self,
        store_id: StoreId,
        first: NaiveDate,
        last: NaiveDate,
    ) -> impl Future<Output = Result<Vec<RevenuePoint>, RepositoryError>> + Send;

    /// Number of live products.
    fn product_count(
        &self,
        store_id: StoreId,
    ) -> impl Future<Output = Result<i64, RepositoryError>> + Send;

    /// Live products with `stock <= threshold`.
    fn low_stock(
        &self,
        store_id: StoreId,
        threshold: i32,
    ) -> impl Future<Output = Result<Vec<LowStockProduct>, RepositoryError>> + Send;

    /// The newest `limit` orders, any status.
    fn recent_orders(
        &self,
        store_id: StoreId,
        limit: i64,
    ) -> impl Future<Output = Result<Vec<RecentOrder>, RepositoryError>> + Send;
}

/// Storefront and merchant read access.
pub trait Catalog: Clone + Send + Sync + 'static {
    fn store_by_slug(
        &self,
        slug: &str,
    ) -> impl Future<Output = Result<Option<Store>, RepositoryError>> + Send;

    /// Live products of a store, by id.
    fn products(
        &self,
        store_id: StoreId,
    ) -> impl Future<Output = Result<Vec<Product>, RepositoryError>> + Send;

    /// Orders of a store matching `filter`, newest first.
    fn orders(
        &self,
        store_id: StoreId,
        filter: &OrderFilter,
    ) -> impl Future<Output = Result<Vec<Order>, RepositoryError>> + Send;

    /// One order of `store_id` with its items.
    fn order_detail(
        &self,
        store_id: StoreId,
        order_id: OrderId,
    ) -> impl Future<Output = Result<Option<OrderDetail>, RepositoryError>> + Send;

    fn order_stats(
        &self,
        store_id: StoreId,
    ) -> impl Future<Output = Result<OrderStats, RepositoryError>> + Send;
}

/// Everything the HTTP layer needs from storage.
pub trait Storage: OrderLedger + ReportSource + Catalog {}

impl<T> Storage for T where T: OrderLedger + ReportSource + Catalog {}

/// Escape `%`, `_` and `\` so user input matches literally inside `LIKE`.
pub(crate) fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

//! Merchant dashboard aggregation.
//!
//! Four independent read queries, run concurrently. Results may be slightly
//! stale relative to in-flight orders.

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use tracing::instrument;

use storehub_core::StoreId;

use crate::db::RepositoryError;
use crate::ledger::ReportSource;
use crate::models::{LowStockProduct, RecentOrder, RevenuePoint};

/// Number of calendar days in the revenue chart, today included.
pub const REVENUE_WINDOW_DAYS: i64 = 7;

/// Number of orders in the recent-orders feed.
pub const RECENT_ORDER_LIMIT: i64 = 7;

/// Dashboard payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    /// Delivered orders, all time.
    pub sales_count: i64,
    /// Exactly [`REVENUE_WINDOW_DAYS`] entries, oldest first.
    pub revenue_chart: Vec<RevenuePoint>,
    pub product_count: i64,
    pub low_stock: Vec<LowStockProduct>,
    pub recent_orders: Vec<RecentOrder>,
}

/// Builds dashboard statistics from a [`ReportSource`].
#[derive(Debug, Clone)]
pub struct Reporting<S> {
    source: S,
    low_stock_threshold: i32,
}

impl<S: ReportSource> Reporting<S> {
    #[must_use]
    pub const fn new(source: S, low_stock_threshold: i32) -> Self {
        Self {
            source,
            low_stock_threshold,
        }
    }

    /// Dashboard statistics for `store_id`, with `today` closing the revenue window.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if any query fails, or
    /// `RepositoryError::DataCorruption` if the revenue series is not one
    /// entry per day of the window.
    #[instrument(skip(self), fields(store_id = %store_id))]
    pub async fn dashboard(
        &self,
        store_id: StoreId,
        today: NaiveDate,
    ) -> Result<DashboardStats, RepositoryError> {
        let first = today - Duration::days(REVENUE_WINDOW_DAYS - 1);

        let (sales_count, revenue_chart, product_count, low_stock, recent_orders) = tokio::try_join!(
            self.source.delivered_count(store_id),
            self.source.revenue_series(store_id, first, today),
            self.source.product_count(store_id),
            self.source.low_stock(store_id, self.low_stock_threshold),
            self.source.recent_orders(store_id, RECENT_ORDER_LIMIT),
        )?;

        check_window(&revenue_chart, first)?;

        Ok(DashboardStats {
            sales_count,
            revenue_chart,
            product_count,
            low_stock,
            recent_orders,
        })
    }
}

/// The series must hold one point per consecutive day starting at `first`.
fn check_window(series: &[RevenuePoint], first: NaiveDate) -> Result<(), RepositoryError> {
    let contiguous = series
        .iter()
        .zip(first.iter_days())
        .all(|(point, day)| point.date == day);
    let complete = i64::try_from(series.len()).is_ok_and(|n| n == REVENUE_WINDOW_DAYS);

    if contiguous && complete {
        Ok(())
    } else {
        Err(RepositoryError::DataCorruption(format!(
            "revenue series has {} entries, expected {REVENUE_WINDOW_DAYS} consecutive days from {first}",
            series.len()
        )))
    }
}

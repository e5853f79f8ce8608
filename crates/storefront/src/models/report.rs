//! Read models produced by the reporting queries.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use storehub_core::{OrderId, OrderStatus, ProductId};

/// Delivered revenue for one calendar day (UTC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevenuePoint {
    pub date: NaiveDate,
    pub revenue: Decimal,
}

/// A product at or below the low-stock threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LowStockProduct {
    pub id: ProductId,
    pub name: String,
    pub stock: i32,
}

/// Summary row for the recent-orders feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecentOrder {
    pub id: OrderId,
    pub customer_name: String,
    pub phone: String,
    pub total_price: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

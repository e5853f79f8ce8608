//! Status enums for orders, payments and stock levels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Error returned when parsing an unknown enum value.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}

/// Order lifecycle status.
///
/// `Pending` is the initial state. Orders move `Pending -> Shipped -> Delivered`;
/// only delivered orders count towards sales and revenue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storehub.order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Shipped,
    Delivered,
}

impl OrderStatus {
    /// All valid statuses, in lifecycle order.
    pub const ALL: [Self; 3] = [Self::Pending, Self::Shipped, Self::Delivered];

    /// The wire/storage name of this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
        }
    }

    /// The `delivered_at` value an order carries after moving to `self`.
    ///
    /// Moving to `Delivered` stamps `now`, unless the order was already
    /// delivered, in which case the original stamp is kept. Moving to any other
    /// status clears the stamp, so `delivered_at` is set iff the order is
    /// delivered.
    #[must_use]
    pub fn delivered_at_after(
        self,
        previous: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match self {
            Self::Delivered => Some(previous.unwrap_or(now)),
            Self::Pending | Self::Shipped => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            _ => Err(ParseEnumError::new("order status", s)),
        }
    }
}

/// Supported payment methods. Only cash on delivery is accepted today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storehub.payment_method", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    CashOnDelivery,
}

impl PaymentMethod {
    /// The wire/storage name of this payment method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CashOnDelivery => "cash_on_delivery",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash_on_delivery" => Ok(Self::CashOnDelivery),
            _ => Err(ParseEnumError::new("payment method", s)),
        }
    }
}

/// Storefront badge derived from a product's stock counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StockAlert {
    #[serde(rename = "Out of Stock")]
    OutOfStock,
    #[serde(rename = "Low Stock")]
    LowStock,
}

impl StockAlert {
    /// Classify a stock level against the low-stock threshold.
    ///
    /// Returns `None` when the product is comfortably in stock.
    #[must_use]
    pub const fn for_stock(stock: i32, low_stock_threshold: i32) -> Option<Self> {
        if stock <= 0 {
            Some(Self::OutOfStock)
        } else if stock <= low_stock_threshold {
            Some(Self::LowStock)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_order_status_parse() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
        }
        assert!("cancelled".parse::<OrderStatus>().is_err());
        assert!("Delivered".parse::<OrderStatus>().is_err());
        assert!("".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_order_status_serde() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Shipped).unwrap(),
            "\"shipped\""
        );
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
    }

    #[test]
    fn test_delivery_stamps_now() {
        let now = Utc::now();
        assert_eq!(OrderStatus::Delivered.delivered_at_after(None, now), Some(now));
    }

    #[test]
    fn test_redelivery_keeps_first_stamp() {
        let first = Utc::now() - Duration::days(2);
        let now = Utc::now();
        assert_eq!(
            OrderStatus::Delivered.delivered_at_after(Some(first), now),
            Some(first)
        );
    }

    #[test]
    fn test_reversal_clears_stamp() {
        let stamped = Some(Utc::now());
        let now = Utc::now();
        assert_eq!(OrderStatus::Pending.delivered_at_after(stamped, now), None);
        assert_eq!(OrderStatus::Shipped.delivered_at_after(stamped, now), None);
    }

    #[test]
    fn test_payment_method_parse() {
        assert_eq!(
            "cash_on_delivery".parse::<PaymentMethod>(),
            Ok(PaymentMethod::CashOnDelivery)
        );
        let err = "credit_card".parse::<PaymentMethod>().unwrap_err();
        assert_eq!(err.to_string(), "invalid payment method: credit_card");
    }

    #[test]
    fn test_stock_alert() {
        assert_eq!(StockAlert::for_stock(0, 5), Some(StockAlert::OutOfStock));
        assert_eq!(StockAlert::for_stock(5, 5), Some(StockAlert::LowStock));
        assert_eq!(StockAlert::for_stock(6, 5), None);
        assert_eq!(
            serde_json::to_string(&StockAlert::LowStock).unwrap(),
            "\"Low Stock\""
        );
    }
}

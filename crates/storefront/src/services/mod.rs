//! Business logic services.
//!
//! # Services
//!
//! - `orders` - Order placement (atomic, stock-guarded) and status transitions
//! - `reporting` - Merchant dashboard aggregation

pub mod orders;
pub mod reporting;

pub use orders::{ErrorKind, OrderError, OrderService, StatusUpdate};
pub use reporting::{DashboardStats, Reporting};

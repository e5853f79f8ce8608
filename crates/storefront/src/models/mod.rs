//! Domain models for the order engine.
//!
//! These are validated domain objects, separate from the storage row types in
//! [`crate::ledger`].

pub mod catalog;
pub mod order;
pub mod report;

pub use catalog::{NewProduct, Product, Store};
pub use order::{
    CustomerInfo, LineItem, NewOrder, Order, OrderDetail, OrderFilter, OrderItem, OrderStats,
    ValidationError,
};
pub use report::{LowStockProduct, RecentOrder, RevenuePoint};

//! Order engine error types.

use std::time::Duration;

use thiserror::Error;

use storehub_core::ProductId;

use crate::db::RepositoryError;
use crate::models::ValidationError;

/// Coarse classification of an [`OrderError`], used by the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input was rejected before storage was touched.
    Validation,
    /// A referenced store, product or order does not exist in scope.
    NotFound,
    /// The guarded decrement found fewer units than requested.
    InsufficientStock,
    /// Storage failed; the unit of work was rolled back.
    TransactionFailure,
}

/// Errors that can occur while placing or updating orders.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Invalid checkout or status input.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No store with that slug or id.
    #[error("Store not found")]
    StoreNotFound,

    /// Product is missing, soft-deleted, or belongs to another store.
    #[error("Product with ID {0} not found")]
    ProductNotFound(ProductId),

    /// Not enough units to fulfil a line item.
    #[error(
        "Insufficient stock for product ID {product_id}. Available: {available}, Requested: {requested}"
    )]
    InsufficientStock {
        product_id: ProductId,
        available: i32,
        requested: i32,
    },

    /// No order with that id in the caller's store.
    #[error("Order not found")]
    OrderNotFound,

    /// Storage failed mid-transaction.
    #[error("Failed to create order: {0}")]
    Transaction(#[from] RepositoryError),

    /// The atomic unit did not finish in time and was rolled back.
    #[error("Order processing timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),
}

impl OrderError {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::StoreNotFound | Self::ProductNotFound(_) | Self::OrderNotFound => {
                ErrorKind::NotFound
            }
            Self::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            Self::Transaction(_) | Self::TimedOut(_) => ErrorKind::TransactionFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_stock_message() {
        let err = OrderError::InsufficientStock {
            product_id: ProductId::new(7),
            available: 2,
            requested: 3,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for product ID 7. Available: 2, Requested: 3"
        );
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(
            OrderError::ProductNotFound(ProductId::new(1)).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(OrderError::OrderNotFound.kind(), ErrorKind::NotFound);
        assert_eq!(
            OrderError::from(ValidationError::EmptyCart).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            OrderError::TimedOut(Duration::from_millis(5)).kind(),
            ErrorKind::TransactionFailure
        );
        assert_eq!(
            OrderError::from(RepositoryError::NotFound).kind(),
            ErrorKind::TransactionFailure
        );
    }
}

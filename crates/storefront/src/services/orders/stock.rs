//! Guarded stock mutation.
//!
//! [`StockLedger`] borrows an open unit of work, so stock can only be touched
//! while an order placement is in flight.

use storehub_core::{ProductId, Quantity, StoreId};

use super::OrderError;
use crate::ledger::LedgerTx;

/// Stock operations for one store, bound to one unit of work.
pub struct StockLedger<'t, T: LedgerTx> {
    tx: &'t mut T,
    store_id: StoreId,
}

impl<'t, T: LedgerTx> StockLedger<'t, T> {
    /// Borrow `tx` for stock operations on products of `store_id`.
    pub const fn within(tx: &'t mut T, store_id: StoreId) -> Self {
        Self { tx, store_id }
    }

    /// Advisory check that `quantity` units are available right now.
    ///
    /// Returns the available stock. The answer may be stale by the time
    /// [`reserve`](Self::reserve) runs; only `reserve` is authoritative.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::ProductNotFound` or `OrderError::InsufficientStock`.
    pub async fn check(&mut self, product_id: ProductId, quantity: Quantity) -> Result<i32, OrderError> {
        let available = self.available(product_id).await?;
        if available < quantity.get() {
            return Err(OrderError::InsufficientStock {
                product_id,
                available,
                requested: quantity.get(),
            });
        }
        Ok(available)
    }

    /// Decrement stock by `quantity` iff at least `quantity` units remain.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::InsufficientStock` when the guard fails, with the
    /// stock observed after the failed update, or `OrderError::ProductNotFound`
    /// if the product disappeared in the meantime.
    pub async fn reserve(&mut self, product_id: ProductId, quantity: Quantity) -> Result<(), OrderError> {
        if self
            .tx
            .decrement_stock(self.store_id, product_id, quantity)
            .await?
        {
            return Ok(());
        }

        let available = self.available(product_id).await?;
        tracing::debug!(
            product_id = %product_id,
            available,
            requested = quantity.get(),
            "stock guard rejected decrement"
        );
        Err(OrderError::InsufficientStock {
            product_id,
            available,
            requested: quantity.get(),
        })
    }

    async fn available(&mut self, product_id: ProductId) -> Result<i32, OrderError> {
        self.tx
            .product_stock(self.store_id, product_id)
            .await?
            .ok_or(OrderError::ProductNotFound(product_id))
    }
}

//! Order placement and status transitions.
//!
//! [`OrderService::place_order`] runs checkout as one unit of work:
//!
//! 1. Every line is checked for an existing product with enough stock (advisory).
//! 2. The order row is inserted as `pending`.
//! 3. Each line is inserted with its unit price snapshot, then stock is
//!    decremented through the guard `stock >= quantity` (authoritative).
//! 4. Commit.
//!
//! Any failure rolls the unit of work back, leaving stock and orders untouched.

mod error;
mod stock;

pub use error::{ErrorKind, OrderError};
pub use stock::StockLedger;

use std::time::Duration;

use chrono::Utc;
use tracing::instrument;

use storehub_core::{OrderId, OrderStatus, StoreId};

use crate::ledger::{LedgerTx, OrderLedger, StatusChange};
use crate::models::{NewOrder, ValidationError};

/// Outcome of a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    Updated,
    /// No order with that id in the caller's store. Nothing changed.
    NotFound,
}

/// Parse a client-submitted status.
///
/// # Errors
///
/// Returns `ValidationError::InvalidStatus` for anything but
/// `pending`, `shipped` or `delivered`.
pub fn parse_status(raw: &str) -> Result<OrderStatus, ValidationError> {
    raw.parse()
        .map_err(|_| ValidationError::InvalidStatus(raw.to_owned()))
}

/// The order transaction engine.
#[derive(Debug, Clone)]
pub struct OrderService<L> {
    ledger: L,
    timeout: Option<Duration>,
}

impl<L: OrderLedger> OrderService<L> {
    /// Create an engine over `ledger`.
    ///
    /// `timeout` bounds each placement's unit of work; `None` leaves it unbounded.
    #[must_use]
    pub const fn new(ledger: L, timeout: Option<Duration>) -> Self {
        Self { ledger, timeout }
    }

    /// Place an order atomically and return its id.
    ///
    /// If the order carries an idempotency key already used in this store, the
    /// existing order id is returned and nothing is written.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::ProductNotFound`, `OrderError::InsufficientStock`,
    /// `OrderError::Transaction` or `OrderError::TimedOut`. In every case no
    /// effect of this call persists.
    #[instrument(
        skip(self, order),
        fields(store_id = %store_id, items = order.items().len())
    )]
    pub async fn place_order(&self, store_id: StoreId, order: NewOrder) -> Result<OrderId, OrderError> {
        if let Some(key) = order.idempotency_key()
            && let Some(existing) = self.ledger.find_order_by_key(store_id, key).await?
        {
            tracing::info!(order_id = %existing, "replayed order submission");
            return Ok(existing);
        }

        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.place_atomically(store_id, &order))
                .await
                .unwrap_or(Err(OrderError::TimedOut(limit))),
            None => self.place_atomically(store_id, &order).await,
        };

        match result {
            Ok(order_id) => {
                tracing::info!(order_id = %order_id, "order placed");
                Ok(order_id)
            }
            Err(err) => {
                // A concurrent submission with the same key may have won while
                // this one failed, on the key itself or on the stock it took.
                if let Some(winner) = self.winner_for(store_id, &order).await {
                    tracing::info!(order_id = %winner, error = %err, "same-key submission already placed");
                    return Ok(winner);
                }

                match err.kind() {
                    ErrorKind::TransactionFailure => {
                        tracing::error!(error = %err, "order placement failed");
                    }
                    _ => tracing::info!(error = %err, "order rejected"),
                }
                Err(err)
            }
        }
    }

    async fn winner_for(&self, store_id: StoreId, order: &NewOrder) -> Option<OrderId> {
        let key = order.idempotency_key()?;
        match self.ledger.find_order_by_key(store_id, key).await {
            Ok(winner) => winner,
            Err(err) => {
                tracing::warn!(error = %err, "idempotency key lookup failed");
                None
            }
        }
    }

    async fn place_atomically(&self, store_id: StoreId, order: &NewOrder) -> Result<OrderId, OrderError> {
        let mut tx = self.ledger.begin().await?;
        match Self::apply(&mut tx, store_id, order).await {
            Ok(order_id) => {
                tx.commit().await?;
                Ok(order_id)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn apply(tx: &mut L::Tx, store_id: StoreId, order: &NewOrder) -> Result<OrderId, OrderError> {
        {
            let mut stock = StockLedger::within(&mut *tx, store_id);
            for item in order.items() {
                stock.check(item.product_id, item.quantity).await?;
            }
        }

        let order_id = tx.insert_order(store_id, order).await?;
        for item in order.items() {
            tx.insert_item(order_id, item).await?;
            StockLedger::within(&mut *tx, store_id)
                .reserve(item.product_id, item.quantity)
                .await?;
        }
        Ok(order_id)
    }

    /// Move an order of `store_id` to `status`.
    ///
    /// Delivering stamps `delivered_at` (kept on redelivery); any other
    /// status clears it.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Transaction` if storage fails. An order that does
    /// not exist in this store is reported as `StatusUpdate::NotFound`.
    #[instrument(skip(self), fields(order_id = %order_id, store_id = %store_id, status = %status))]
    pub async fn set_status(
        &self,
        order_id: OrderId,
        store_id: StoreId,
        status: OrderStatus,
    ) -> Result<StatusUpdate, OrderError> {
        let change = StatusChange {
            status,
            at: Utc::now(),
        };
        if self.ledger.set_status(order_id, store_id, change).await? == 0 {
            tracing::info!("status update matched no order");
            return Ok(StatusUpdate::NotFound);
        }

        tracing::info!("order status updated");
        Ok(StatusUpdate::Updated)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use storehub_core::{ProductId, Quantity};

    use super::*;
    use crate::db::RepositoryError;
    use crate::ledger::{Catalog, MemoryLedger, MemoryTx};
    use crate::models::{CustomerInfo, LineItem, NewProduct};

    struct Fixture {
        ledger: MemoryLedger,
        service: OrderService<MemoryLedger>,
        store: StoreId,
    }

    fn fixture() -> Fixture {
        let ledger = MemoryLedger::new();
        let store = ledger.add_store("acme", "Acme").id;
        Fixture {
            service: OrderService::new(ledger.clone(), None),
            ledger,
            store,
        }
    }

    impl Fixture {
        fn product(&self, stock: i32) -> ProductId {
            self.ledger
                .add_product(self.store, NewProduct::new("Tee", Decimal::new(2500, 2), stock))
                .id
        }

        fn stock(&self, product: ProductId) -> i32 {
            self.ledger.product(product).unwrap().stock
        }
    }

    fn cart(lines: &[(ProductId, i64)]) -> NewOrder {
        let customer =
            CustomerInfo::new("Rana", "rana@example.com", "Beirut", "+961 1 234 567").unwrap();
        let items = lines
            .iter()
            .enumerate()
            .map(|(i, (product, qty))| {
                LineItem::new(i + 1, *product, *qty, Decimal::new(2500, 2), None, None).unwrap()
            })
            .collect();
        NewOrder::new(customer, "cash_on_delivery", items, Decimal::new(7500, 2)).unwrap()
    }

    #[tokio::test]
    async fn test_second_order_rejected_when_stock_runs_low() {
        let f = fixture();
        let tee = f.product(5);

        let first = f.service.place_order(f.store, cart(&[(tee, 3)])).await.unwrap();
        assert_eq!(f.stock(tee), 2);
        let detail = f.ledger.order_detail(f.store, first).await.unwrap().unwrap();
        assert_eq!(detail.order.status, OrderStatus::Pending);
        assert_eq!(detail.items.len(), 1);

        let err = f
            .service
            .place_order(f.store, cart(&[(tee, 3)]))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Insufficient stock for product ID {tee}. Available: 2, Requested: 3")
        );
        assert_eq!(f.stock(tee), 2);
        assert_eq!(f.ledger.order_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_line_leaves_other_lines_untouched() {
        let f = fixture();
        let plenty = f.product(10);
        let scarce = f.product(1);

        let err = f
            .service
            .place_order(f.store, cart(&[(plenty, 4), (scarce, 2)]))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        assert_eq!(f.stock(plenty), 10);
        assert_eq!(f.stock(scarce), 1);
        assert_eq!(f.ledger.order_count(), 0);
        assert_eq!(f.ledger.item_count(), 0);
    }

    #[tokio::test]
    async fn test_repeated_product_lines_hit_the_guard() {
        let f = fixture();
        let tee = f.product(5);

        let err = f
            .service
            .place_order(f.store, cart(&[(tee, 3), (tee, 3)]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrderError::InsufficientStock {
                available: 2,
                requested: 3,
                ..
            }
        ));
        assert_eq!(f.stock(tee), 5);
        assert_eq!(f.ledger.order_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_deleted_and_foreign_products() {
        let f = fixture();
        let deleted = f.product(5);
        f.ledger.set_product_deleted(deleted, true);
        let other_store = f.ledger.add_store("other", "Other").id;
        let foreign = f
            .ledger
            .add_product(other_store, NewProduct::new("Cap", Decimal::ONE, 9))
            .id;

        for product in [ProductId::new(9_999), deleted, foreign] {
            let err = f
                .service
                .place_order(f.store, cart(&[(product, 1)]))
                .await
                .unwrap_err();
            assert!(matches!(err, OrderError::ProductNotFound(id) if id == product));
        }
        assert_eq!(f.stock(foreign), 9);
        assert_eq!(f.ledger.order_count(), 0);
    }

    #[tokio::test]
    async fn test_storage_failure_rolls_back() {
        let f = fixture();
        let tee = f.product(5);
        f.ledger.fail_next_item_insert();

        let err = f
            .service
            .place_order(f.store, cart(&[(tee, 2)]))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TransactionFailure);
        assert_eq!(f.stock(tee), 5);
        assert_eq!(f.ledger.order_count(), 0);
    }

    #[tokio::test]
    async fn test_idempotent_resubmission() {
        let f = fixture();
        let tee = f.product(5);
        let order = cart(&[(tee, 2)]).with_idempotency_key("cart-1").unwrap();

        let first = f.service.place_order(f.store, order.clone()).await.unwrap();
        let again = f.service.place_order(f.store, order).await.unwrap();

        assert_eq!(first, again);
        assert_eq!(f.stock(tee), 3);
        assert_eq!(f.ledger.order_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_same_key_race_for_last_unit_returns_one_order() {
        for _ in 0..100 {
            let f = fixture();
            let mug = f.product(1);

            let submit = || {
                let service = f.service.clone();
                let store = f.store;
                let order = cart(&[(mug, 1)]).with_idempotency_key("cart-1").unwrap();
                tokio::spawn(async move { service.place_order(store, order).await })
            };
            let (first, second) = tokio::join!(submit(), submit());
            let first = first.unwrap().unwrap();
            let second = second.unwrap().unwrap();

            assert_eq!(first, second);
            assert_eq!(f.stock(mug), 0);
            assert_eq!(f.ledger.order_count(), 1);
        }
    }

    /// Ledger whose units of work hang after taking stock.
    #[derive(Clone)]
    struct StallingLedger(MemoryLedger);

    struct StallingTx(MemoryTx);

    impl LedgerTx for StallingTx {
        async fn product_stock(
            &mut self,
            store_id: StoreId,
            product_id: ProductId,
        ) -> Result<Option<i32>, RepositoryError> {
            self.0.product_stock(store_id, product_id).await
        }

        async fn insert_order(
            &mut self,
            store_id: StoreId,
            order: &NewOrder,
        ) -> Result<OrderId, RepositoryError> {
            self.0.insert_order(store_id, order).await
        }

        async fn insert_item(&mut self, order_id: OrderId, item: &LineItem) -> Result<(), RepositoryError> {
            self.0.insert_item(order_id, item).await
        }

        async fn decrement_stock(
            &mut self,
            store_id: StoreId,
            product_id: ProductId,
            quantity: Quantity,
        ) -> Result<bool, RepositoryError> {
            let applied = self.0.decrement_stock(store_id, product_id, quantity).await?;
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(applied)
        }

        async fn commit(self) -> Result<(), RepositoryError> {
            self.0.commit().await
        }

        async fn rollback(self) -> Result<(), RepositoryError> {
            self.0.rollback().await
        }
    }

    impl OrderLedger for StallingLedger {
        type Tx = StallingTx;

        async fn begin(&self) -> Result<StallingTx, RepositoryError> {
            Ok(StallingTx(self.0.begin().await?))
        }

        async fn find_order_by_key(
            &self,
            store_id: StoreId,
            key: &str,
        ) -> Result<Option<OrderId>, RepositoryError> {
            self.0.find_order_by_key(store_id, key).await
        }

        async fn set_status(
            &self,
            order_id: OrderId,
            store_id: StoreId,
            change: StatusChange,
        ) -> Result<u64, RepositoryError> {
            self.0.set_status(order_id, store_id, change).await
        }
    }

    #[tokio::test]
    async fn test_timeout_discards_the_unit_of_work() {
        let f = fixture();
        let tee = f.product(5);
        let service = OrderService::new(
            StallingLedger(f.ledger.clone()),
            Some(Duration::from_millis(10)),
        );

        let order = cart(&[(tee, 2)]).with_idempotency_key("cart-slow").unwrap();
        let err = service.place_order(f.store, order).await.unwrap_err();

        assert!(matches!(err, OrderError::TimedOut(limit) if limit == Duration::from_millis(10)));
        assert_eq!(err.kind(), ErrorKind::TransactionFailure);
        assert_eq!(f.stock(tee), 5);
        assert_eq!(f.ledger.order_count(), 0);
        assert_eq!(f.ledger.item_count(), 0);
        assert_eq!(
            f.ledger.find_order_by_key(f.store, "cart-slow").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_status_transitions() {
        let f = fixture();
        let tee = f.product(5);
        let id = f.service.place_order(f.store, cart(&[(tee, 1)])).await.unwrap();

        let update = f
            .service
            .set_status(id, f.store, OrderStatus::Delivered)
            .await
            .unwrap();
        assert_eq!(update, StatusUpdate::Updated);
        let detail = f.ledger.order_detail(f.store, id).await.unwrap().unwrap();
        assert!(detail.order.delivered_at.is_some());

        f.service
            .set_status(id, f.store, OrderStatus::Pending)
            .await
            .unwrap();
        let detail = f.ledger.order_detail(f.store, id).await.unwrap().unwrap();
        assert_eq!(detail.order.status, OrderStatus::Pending);
        assert_eq!(detail.order.delivered_at, None);
        assert_eq!(detail.order.total_price, Decimal::new(7500, 2));
    }

    #[tokio::test]
    async fn test_status_update_is_store_scoped() {
        let f = fixture();
        let tee = f.product(5);
        let id = f.service.place_order(f.store, cart(&[(tee, 1)])).await.unwrap();
        let other = f.ledger.add_store("other", "Other").id;

        let update = f
            .service
            .set_status(id, other, OrderStatus::Shipped)
            .await
            .unwrap();
        assert_eq!(update, StatusUpdate::NotFound);
        let detail = f.ledger.order_detail(f.store, id).await.unwrap().unwrap();
        assert_eq!(detail.order.status, OrderStatus::Pending);
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("shipped"), Ok(OrderStatus::Shipped));
        assert_eq!(
            parse_status("cancelled"),
            Err(ValidationError::InvalidStatus("cancelled".to_owned()))
        );
    }
}

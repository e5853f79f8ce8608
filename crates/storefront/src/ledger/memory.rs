//! In-process storage backend.
//!
//! Shares the guard semantics of the `PostgreSQL` backend: stock only changes
//! through a guarded decrement, and a unit of work publishes its order and
//! items on commit or not at all.
//!
//! Differences from `PostgreSQL` worth knowing when reading test results:
//!
//! - A decrement is applied to the shared counter immediately and undone on
//!   rollback. A concurrent unit of work may therefore fail its guard against
//!   stock that is later restored, where `PostgreSQL` would block on the row
//!   lock instead. Stock is never oversold either way.
//! - Ids are drawn from counters that are not rolled back, like sequences.
//! - An idempotency key staged by an open unit of work makes
//!   [`OrderLedger::find_order_by_key`] wait until that unit commits or rolls
//!   back, as a `PostgreSQL` unique index makes a competing insert wait.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;

use storehub_core::{OrderId, OrderItemId, OrderStatus, ProductId, Quantity, StoreId};

use super::{Catalog, LedgerTx, OrderLedger, ReportSource, StatusChange};
use crate::db::RepositoryError;
use crate::models::{
    LineItem, LowStockProduct, NewOrder, NewProduct, Order, OrderDetail, OrderFilter, OrderItem,
    OrderStats, Product, RecentOrder, RevenuePoint, Store,
};

#[derive(Debug)]
struct ProductRecord {
    product: Product,
    deleted: bool,
}

#[derive(Debug)]
struct OrderRecord {
    order: Order,
    idempotency_key: Option<String>,
}

#[derive(Debug)]
struct ItemRecord {
    order_id: OrderId,
    id: OrderItemId,
    product_id: ProductId,
    quantity: i32,
    price: Decimal,
    selected_size: Option<String>,
    selected_color: Option<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    last_id: i64,
    stores: BTreeMap<StoreId, Store>,
    products: BTreeMap<ProductId, ProductRecord>,
    orders: BTreeMap<OrderId, OrderRecord>,
    items: Vec<ItemRecord>,
    /// Idempotency keys staged by open units of work, with their holder count.
    pending_keys: BTreeMap<(StoreId, String), usize>,
    fail_next_item_insert: bool,
}

impl MemoryState {
    const fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn key_taken(&self, store_id: StoreId, key: &str) -> Option<OrderId> {
        self.orders
            .values()
            .find(|r| r.order.store_id == store_id && r.idempotency_key.as_deref() == Some(key))
            .map(|r| r.order.id)
    }

    fn release_key(&mut self, pending: (StoreId, String)) {
        if let Some(count) = self.pending_keys.get_mut(&pending) {
            *count -= 1;
            if *count == 0 {
                self.pending_keys.remove(&pending);
            }
        }
    }

    fn live_product(&self, store_id: StoreId, product_id: ProductId) -> Option<&ProductRecord> {
        self.products
            .get(&product_id)
            .filter(|r| !r.deleted && r.product.store_id == store_id)
    }
}

/// Poll interval while an idempotency key is held by an open unit of work.
const KEY_WAIT_INTERVAL: Duration = Duration::from_millis(1);

/// In-memory storage. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    state: Arc<Mutex<MemoryState>>,
}

// Nothing panics while holding the lock, so a poisoned state is still consistent.
fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store.
    pub fn add_store(&self, slug: &str, name: &str) -> Store {
        let mut state = lock(&self.state);
        let store = Store {
            id: StoreId::new(state.next_id()),
            slug: slug.to_owned(),
            name: name.to_owned(),
            description: None,
            logo_url: None,
            contact_number: None,
        };
        state.stores.insert(store.id, store.clone());
        store
    }

    /// Create a product in `store_id`.
    pub fn add_product(&self, store_id: StoreId, new: NewProduct) -> Product {
        let mut state = lock(&self.state);
        let product = Product {
            id: ProductId::new(state.next_id()),
            store_id,
            name: new.name,
            price: new.price,
            stock: new.stock,
            description: new.description,
            image_url: new.image_url,
            available_sizes: new.available_sizes,
            available_colors: new.available_colors,
            created_at: Utc::now(),
        };
        state.products.insert(
            product.id,
            ProductRecord {
                product: product.clone(),
                deleted: false,
            },
        );
        product
    }

    /// A product by id, including soft-deleted ones.
    #[must_use]
    pub fn product(&self, product_id: ProductId) -> Option<Product> {
        lock(&self.state)
            .products
            .get(&product_id)
            .map(|r| r.product.clone())
    }

    /// Soft-delete (or restore) a product.
    pub fn set_product_deleted(&self, product_id: ProductId, deleted: bool) {
        if let Some(record) = lock(&self.state).products.get_mut(&product_id) {
            record.deleted = deleted;
        }
    }

    /// Number of committed orders across all stores.
    #[must_use]
    pub fn order_count(&self) -> usize {
        lock(&self.state).orders.len()
    }

    /// Number of committed order items across all stores.
    #[must_use]
    pub fn item_count(&self) -> usize {
        lock(&self.state).items.len()
    }

    /// Make the next `insert_item` call fail with `RepositoryError::Unavailable`.
    #[cfg(any(test, feature = "test-util"))]
    pub fn fail_next_item_insert(&self) {
        lock(&self.state).fail_next_item_insert = true;
    }
}

/// Staged effects of one order placement.
#[derive(Debug)]
pub struct MemoryTx {
    state: Arc<Mutex<MemoryState>>,
    order: Option<OrderRecord>,
    items: Vec<ItemRecord>,
    /// Decrements already applied to shared stock, undone on rollback.
    undo: Vec<(ProductId, i32)>,
    /// Idempotency key registered in `MemoryState::pending_keys`.
    pending_key: Option<(StoreId, String)>,
    finished: bool,
}

impl MemoryTx {
    fn restore_stock(&mut self, state: &mut MemoryState) {
        for (product_id, quantity) in self.undo.drain(..) {
            if let Some(record) = state.products.get_mut(&product_id) {
                record.product.stock += quantity;
            }
        }
    }

    fn release_key(&mut self, state: &mut MemoryState) {
        if let Some(pending) = self.pending_key.take() {
            state.release_key(pending);
        }
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if !self.finished && (!self.undo.is_empty() || self.pending_key.is_some()) {
            let state = Arc::clone(&self.state);
            let mut guard = lock(&state);
            self.restore_stock(&mut guard);
            self.release_key(&mut guard);
        }
    }
}

impl LedgerTx for MemoryTx {
    async fn product_stock(
        &mut self,
        store_id: StoreId,
        product_id: ProductId,
    ) -> Result<Option<i32>, RepositoryError> {
        tokio::task::yield_now().await;
        let state = lock(&self.state);
        Ok(state
            .live_product(store_id, product_id)
            .map(|r| r.product.stock))
    }

    async fn insert_order(
        &mut self,
        store_id: StoreId,
        order: &NewOrder,
    ) -> Result<OrderId, RepositoryError> {
        tokio::task::yield_now().await;
        let mut state = lock(&self.state);
        if let Some(key) = order.idempotency_key()
            && state.key_taken(store_id, key).is_some()
        {
            return Err(RepositoryError::Conflict(
                "idempotency key already exists".to_owned(),
            ));
        }

        if let Some(key) = order.idempotency_key() {
            let pending = (store_id, key.to_owned());
            *state.pending_keys.entry(pending.clone()).or_default() += 1;
            if let Some(previous) = self.pending_key.replace(pending) {
                state.release_key(previous);
            }
        }

        let customer = order.customer();
        let id = OrderId::new(state.next_id());
        self.order = Some(OrderRecord {
            order: Order {
                id,
                store_id,
                customer_name: customer.name.clone(),
                customer_email: customer.email.clone(),
                location: customer.location.clone(),
                phone: customer.phone.clone(),
                payment_method: order.payment_method(),
                total_price: order.total_price(),
                status: OrderStatus::Pending,
                created_at: Utc::now(),
                delivered_at: None,
            },
            idempotency_key: order.idempotency_key().map(str::to_owned),
        });
        Ok(id)
    }

    async fn insert_item(&mut self, order_id: OrderId, item: &LineItem) -> Result<(), RepositoryError> {
        tokio::task::yield_now().await;
        let mut state = lock(&self.state);
        if std::mem::take(&mut state.fail_next_item_insert) {
            return Err(RepositoryError::Unavailable(
                "order item insert failed".to_owned(),
            ));
        }
        if self.order.as_ref().map(|r| r.order.id) != Some(order_id) {
            return Err(RepositoryError::NotFound);
        }

        let id = OrderItemId::new(state.next_id());
        self.items.push(ItemRecord {
            order_id,
            id,
            product_id: item.product_id,
            quantity: item.quantity.get(),
            price: item.unit_price,
            selected_size: item.size.clone(),
            selected_color: item.color.clone(),
        });
        Ok(())
    }

    async fn decrement_stock(
        &mut self,
        store_id: StoreId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<bool, RepositoryError> {
        tokio::task::yield_now().await;
        let mut state = lock(&self.state);
        let Some(record) = state
            .products
            .get_mut(&product_id)
            .filter(|r| !r.deleted && r.product.store_id == store_id)
        else {
            return Ok(false);
        };
        if record.product.stock < quantity.get() {
            return Ok(false);
        }

        record.product.stock -= quantity.get();
        self.undo.push((product_id, quantity.get()));
        Ok(true)
    }

    async fn commit(mut self) -> Result<(), RepositoryError> {
        tokio::task::yield_now().await;
        let state = Arc::clone(&self.state);
        let mut state = lock(&state);

        // A concurrent unit of work may have committed the same key since insert.
        if let Some(record) = &self.order
            && let Some(key) = record.idempotency_key.as_deref()
            && state.key_taken(record.order.store_id, key).is_some()
        {
            self.restore_stock(&mut state);
            self.release_key(&mut state);
            self.finished = true;
            return Err(RepositoryError::Conflict(
                "idempotency key already exists".to_owned(),
            ));
        }

        if let Some(record) = self.order.take() {
            state.orders.insert(record.order.id, record);
        }
        state.items.append(&mut self.items);
        self.undo.clear();
        self.release_key(&mut state);
        self.finished = true;
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), RepositoryError> {
        let state = Arc::clone(&self.state);
        let mut state = lock(&state);
        self.restore_stock(&mut state);
        self.release_key(&mut state);
        self.finished = true;
        Ok(())
    }
}

impl OrderLedger for MemoryLedger {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, RepositoryError> {
        Ok(MemoryTx {
            state: Arc::clone(&self.state),
            order: None,
            items: Vec::new(),
            undo: Vec::new(),
            pending_key: None,
            finished: false,
        })
    }

    async fn find_order_by_key(
        &self,
        store_id: StoreId,
        key: &str,
    ) -> Result<Option<OrderId>, RepositoryError> {
        let pending = (store_id, key.to_owned());
        loop {
            {
                let state = lock(&self.state);
                if let Some(order_id) = state.key_taken(store_id, key) {
                    return Ok(Some(order_id));
                }
                if !state.pending_keys.contains_key(&pending) {
                    return Ok(None);
                }
            }
            tokio::time::sleep(KEY_WAIT_INTERVAL).await;
        }
    }

    async fn set_status(
        &self,
        order_id: OrderId,
        store_id: StoreId,
        change: StatusChange,
    ) -> Result<u64, RepositoryError> {
        let mut state = lock(&self.state);
        let Some(record) = state
            .orders
            .get_mut(&order_id)
            .filter(|r| r.order.store_id == store_id)
        else {
            return Ok(0);
        };

        let order = &mut record.order;
        order.delivered_at = change
            .status
            .delivered_at_after(order.delivered_at, change.at);
        order.status = change.status;
        Ok(1)
    }
}

impl ReportSource for MemoryLedger {
    async fn delivered_count(&self, store_id: StoreId) -> Result<i64, RepositoryError> {
        let state = lock(&self.state);
        let count = state
            .orders
            .values()
            .filter(|r| r.order.store_id == store_id && r.order.status == OrderStatus::Delivered)
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn revenue_series(
        &self,
        store_id: StoreId,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<Vec<RevenuePoint>, RepositoryError> {
        let state = lock(&self.state);
        let mut by_day: BTreeMap<NaiveDate, Decimal> = first
            .iter_days()
            .take_while(|day| *day <= last)
            .map(|day| (day, Decimal::ZERO))
            .collect();

        for record in state.orders.values() {
            let order = &record.order;
            if order.store_id != store_id || order.status != OrderStatus::Delivered {
                continue;
            }
            if let Some(revenue) = order
                .delivered_at
                .and_then(|at| by_day.get_mut(&at.date_naive()))
            {
                *revenue += order.total_price;
            }
        }

        Ok(by_day
            .into_iter()
            .map(|(date, revenue)| RevenuePoint { date, revenue })
            .collect())
    }

    async fn product_count(&self, store_id: StoreId) -> Result<i64, RepositoryError> {
        let state = lock(&self.state);
        let count = state
            .products
            .values()
            .filter(|r| !r.deleted && r.product.store_id == store_id)
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn low_stock(
        &self,
        store_id: StoreId,
        threshold: i32,
    ) -> Result<Vec<LowStockProduct>, RepositoryError> {
        let state = lock(&self.state);
        let mut rows: Vec<LowStockProduct> = state
            .products
            .values()
            .filter(|r| !r.deleted && r.product.store_id == store_id)
            .filter(|r| r.product.stock <= threshold)
            .map(|r| LowStockProduct {
                id: r.product.id,
                name: r.product.name.clone(),
                stock: r.product.stock,
            })
            .collect();
        rows.sort_by_key(|p| (p.stock, p.id));
        Ok(rows)
    }

    async fn recent_orders(
        &self,
        store_id: StoreId,
        limit: i64,
    ) -> Result<Vec<RecentOrder>, RepositoryError> {
        let state = lock(&self.state);
        let mut orders: Vec<&Order> = state
            .orders
            .values()
            .map(|r| &r.order)
            .filter(|o| o.store_id == store_id)
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(orders
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|o| RecentOrder {
                id: o.id,
                customer_name: o.customer_name.clone(),
                phone: o.phone.clone(),
                total_price: o.total_price,
                status: o.status,
                created_at: o.created_at,
            })
            .collect())
    }
}

impl Catalog for MemoryLedger {
    async fn store_by_slug(&self, slug: &str) -> Result<Option<Store>, RepositoryError> {
        let state = lock(&self.state);
        Ok(state.stores.values().find(|s| s.slug == slug).cloned())
    }

    async fn products(&self, store_id: StoreId) -> Result<Vec<Product>, RepositoryError> {
        let state = lock(&self.state);
        Ok(state
            .products
            .values()
            .filter(|r| !r.deleted && r.product.store_id == store_id)
            .map(|r| r.product.clone())
            .collect())
    }

    async fn orders(
        &self,
        store_id: StoreId,
        filter: &OrderFilter,
    ) -> Result<Vec<Order>, RepositoryError> {
        let name = filter.customer_name.as_deref().map(str::to_lowercase);
        let phone = filter.customer_phone.as_deref().map(str::to_lowercase);

        let state = lock(&self.state);
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .map(|r| &r.order)
            .filter(|o| o.store_id == store_id)
            .filter(|o| {
                name.as_deref()
                    .is_none_or(|n| o.customer_name.to_lowercase().contains(n))
            })
            .filter(|o| {
                phone
                    .as_deref()
                    .is_none_or(|p| o.phone.to_lowercase().contains(p))
            })
            .filter(|o| filter.status.is_none_or(|s| o.status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }

    async fn order_detail(
        &self,
        store_id: StoreId,
        order_id: OrderId,
    ) -> Result<Option<OrderDetail>, RepositoryError> {
        let state = lock(&self.state);
        let Some(record) = state
            .orders
            .get(&order_id)
            .filter(|r| r.order.store_id == store_id)
        else {
            return Ok(None);
        };

        let items = state
            .items
            .iter()
            .filter(|i| i.order_id == order_id)
            .map(|i| OrderItem {
                id: i.id,
                product_id: i.product_id,
                product_name: state
                    .products
                    .get(&i.product_id)
                    .map(|p| p.product.name.clone()),
                quantity: i.quantity,
                price: i.price,
                selected_size: i.selected_size.clone(),
                selected_color: i.selected_color.clone(),
            })
            .collect();

        Ok(Some(OrderDetail {
            order: record.order.clone(),
            items,
        }))
    }

    async fn order_stats(&self, store_id: StoreId) -> Result<OrderStats, RepositoryError> {
        let state = lock(&self.state);
        let mut stats = OrderStats {
            total_orders: 0,
            total_revenue: Decimal::ZERO,
        };
        for record in state.orders.values().filter(|r| r.order.store_id == store_id) {
            stats.total_orders += 1;
            if record.order.status == OrderStatus::Delivered {
                stats.total_revenue += record.order.total_price;
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::CustomerInfo;

    fn ledger_with_product(stock: i32) -> (MemoryLedger, StoreId, ProductId) {
        let ledger = MemoryLedger::new();
        let store = ledger.add_store("acme", "Acme");
        let product = ledger.add_product(store.id, NewProduct::new("Mug", Decimal::TEN, stock));
        (ledger, store.id, product.id)
    }

    fn order(product_id: ProductId, quantity: i64) -> NewOrder {
        let customer =
            CustomerInfo::new("Rana", "rana@example.com", "Beirut", "+961 1 234 567").unwrap();
        let item = LineItem::new(1, product_id, quantity, Decimal::TEN, None, None).unwrap();
        NewOrder::new(customer, "cash_on_delivery", vec![item], Decimal::TEN).unwrap()
    }

    #[tokio::test]
    async fn test_guarded_decrement() {
        let (ledger, store, product) = ledger_with_product(3);
        let mut tx = ledger.begin().await.unwrap();
        let two = Quantity::new(2).unwrap();

        assert!(tx.decrement_stock(store, product, two).await.unwrap());
        assert!(!tx.decrement_stock(store, product, two).await.unwrap());
        tx.commit().await.unwrap();

        assert_eq!(ledger.product(product).unwrap().stock, 1);
    }

    #[tokio::test]
    async fn test_decrement_is_store_scoped() {
        let (ledger, _, product) = ledger_with_product(3);
        let other = ledger.add_store("other", "Other");
        let mut tx = ledger.begin().await.unwrap();

        let one = Quantity::new(1).unwrap();
        assert!(!tx.decrement_stock(other.id, product, one).await.unwrap());
        assert_eq!(tx.product_stock(other.id, product).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_drop_without_commit_restores_stock() {
        let (ledger, store, product) = ledger_with_product(5);
        {
            let mut tx = ledger.begin().await.unwrap();
            let id = tx.insert_order(store, &order(product, 4)).await.unwrap();
            let line = order(product, 4).items()[0].clone();
            tx.insert_item(id, &line).await.unwrap();
            let four = Quantity::new(4).unwrap();
            assert!(tx.decrement_stock(store, product, four).await.unwrap());
        }

        assert_eq!(ledger.product(product).unwrap().stock, 5);
        assert_eq!(ledger.order_count(), 0);
        assert_eq!(ledger.item_count(), 0);
    }

    #[tokio::test]
    async fn test_commit_rejects_key_taken_concurrently() {
        let (ledger, store, product) = ledger_with_product(5);
        let keyed = order(product, 1).with_idempotency_key("k-1").unwrap();

        let mut first = ledger.begin().await.unwrap();
        let mut second = ledger.begin().await.unwrap();
        first.insert_order(store, &keyed).await.unwrap();
        second.insert_order(store, &keyed).await.unwrap();
        let one = Quantity::new(1).unwrap();
        assert!(second.decrement_stock(store, product, one).await.unwrap());

        first.commit().await.unwrap();
        assert!(matches!(
            second.commit().await,
            Err(RepositoryError::Conflict(_))
        ));
        assert_eq!(ledger.order_count(), 1);
        assert_eq!(ledger.product(product).unwrap().stock, 5);
    }

    #[tokio::test]
    async fn test_key_lookup_waits_for_open_unit_of_work() {
        let (ledger, store, product) = ledger_with_product(5);
        let mut tx = ledger.begin().await.unwrap();
        let keyed = order(product, 1).with_idempotency_key("k-2").unwrap();
        let id = tx.insert_order(store, &keyed).await.unwrap();

        let lookup = tokio::spawn({
            let ledger = ledger.clone();
            async move { ledger.find_order_by_key(store, "k-2").await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!lookup.is_finished());

        tx.commit().await.unwrap();
        assert_eq!(lookup.await.unwrap().unwrap(), Some(id));

        let mut abandoned = ledger.begin().await.unwrap();
        let keyed = order(product, 1).with_idempotency_key("k-3").unwrap();
        abandoned.insert_order(store, &keyed).await.unwrap();
        drop(abandoned);
        assert_eq!(ledger.find_order_by_key(store, "k-3").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_status_stamps_and_clears() {
        let (ledger, store, product) = ledger_with_product(5);
        let mut tx = ledger.begin().await.unwrap();
        let id = tx.insert_order(store, &order(product, 1)).await.unwrap();
        tx.commit().await.unwrap();

        let first = Utc::now() - Duration::hours(3);
        let deliver = |at| StatusChange {
            status: OrderStatus::Delivered,
            at,
        };
        assert_eq!(ledger.set_status(id, store, deliver(first)).await.unwrap(), 1);
        ledger.set_status(id, store, deliver(Utc::now())).await.unwrap();
        let detail = ledger.order_detail(store, id).await.unwrap().unwrap();
        assert_eq!(detail.order.delivered_at, Some(first));

        let ship = StatusChange {
            status: OrderStatus::Shipped,
            at: Utc::now(),
        };
        ledger.set_status(id, store, ship).await.unwrap();
        let detail = ledger.order_detail(store, id).await.unwrap().unwrap();
        assert_eq!(detail.order.delivered_at, None);

        let other = ledger.add_store("other", "Other");
        assert_eq!(ledger.set_status(id, other.id, ship).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_revenue_series_fills_every_day() {
        let (ledger, store, _) = ledger_with_product(5);
        let last = Utc::now().date_naive();
        let first = last - Duration::days(6);

        let series = ledger.revenue_series(store, first, last).await.unwrap();
        assert_eq!(series.len(), 7);
        assert_eq!(series[0].date, first);
        assert_eq!(series[6].date, last);
        assert!(series.iter().all(|p| p.revenue == Decimal::ZERO));
    }
}

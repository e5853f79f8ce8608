//! Order engine guarantees against a real `PostgreSQL` database.
//!
//! These tests require `STOREHUB_TEST_DATABASE_URL` pointing at a disposable
//! database. Migrations are applied on connect; every test creates its own
//! store so runs do not interfere.
//!
//! Run with: cargo test -p storehub-integration-tests -- --ignored

use rust_decimal::Decimal;
use secrecy::SecretString;
use tokio::task::JoinSet;
use uuid::Uuid;

use storehub_core::{OrderStatus, ProductId, StoreId};
use storehub_integration_tests::order;
use storehub_storefront::db;
use storehub_storefront::ledger::{Catalog, PgLedger};
use storehub_storefront::models::NewProduct;
use storehub_storefront::services::{ErrorKind, OrderService, StatusUpdate};

async fn ledger() -> PgLedger {
    let url = std::env::var("STOREHUB_TEST_DATABASE_URL")
        .expect("STOREHUB_TEST_DATABASE_URL must be set");
    let pool = db::create_pool(&SecretString::from(url), 8)
        .await
        .expect("Failed to connect to test database");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    PgLedger::new(pool)
}

async fn store_with_product(ledger: &PgLedger, stock: i32) -> (StoreId, ProductId) {
    let slug = format!("test-{}", Uuid::new_v4());
    let store = ledger
        .create_store(&slug, "Test Store", None)
        .await
        .expect("create store");
    let product = ledger
        .create_product(store.id, &NewProduct::new("Tee", Decimal::TEN, stock))
        .await
        .expect("create product");
    (store.id, product.id)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "Requires STOREHUB_TEST_DATABASE_URL"]
async fn test_pg_last_unit_goes_to_exactly_one_buyer() {
    let ledger = ledger().await;
    let (store, tee) = store_with_product(&ledger, 1).await;
    let service = OrderService::new(ledger.clone(), None);

    let mut tasks = JoinSet::new();
    for _ in 0..2 {
        let service = service.clone();
        tasks.spawn(async move { service.place_order(store, order(&[(tee, 1)])).await });
    }
    let results = tasks.join_all().await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1, "{results:?}");
    let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(loser.kind(), ErrorKind::InsufficientStock);
    assert_eq!(ledger.stock_of(tee).await.unwrap(), Some(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "Requires STOREHUB_TEST_DATABASE_URL"]
async fn test_pg_contention_never_oversells() {
    let ledger = ledger().await;
    let (store, tee) = store_with_product(&ledger, 10).await;
    let service = OrderService::new(ledger.clone(), None);

    let mut tasks = JoinSet::new();
    for _ in 0..25 {
        let service = service.clone();
        tasks.spawn(async move { service.place_order(store, order(&[(tee, 1)])).await });
    }
    let results = tasks.join_all().await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 10);
    assert_eq!(ledger.stock_of(tee).await.unwrap(), Some(0));
}

#[tokio::test]
#[ignore = "Requires STOREHUB_TEST_DATABASE_URL"]
async fn test_pg_failed_line_rolls_back_whole_order() {
    let ledger = ledger().await;
    let (store, tee) = store_with_product(&ledger, 10).await;
    let service = OrderService::new(ledger.clone(), None);

    let missing = ProductId::new(i64::MAX);
    let err = service
        .place_order(store, order(&[(tee, 2), (missing, 1)]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(ledger.stock_of(tee).await.unwrap(), Some(10));
    let stats = ledger.order_stats(store).await.unwrap();
    assert_eq!(stats.total_orders, 0);
}

#[tokio::test]
#[ignore = "Requires STOREHUB_TEST_DATABASE_URL"]
async fn test_pg_status_transitions_stamp_delivery() {
    let ledger = ledger().await;
    let (store, tee) = store_with_product(&ledger, 10).await;
    let (other, _) = store_with_product(&ledger, 1).await;
    let service = OrderService::new(ledger.clone(), None);

    let id = service
        .place_order(store, order(&[(tee, 1)]))
        .await
        .unwrap();
    assert_eq!(
        service
            .set_status(id, other, OrderStatus::Shipped)
            .await
            .unwrap(),
        StatusUpdate::NotFound
    );

    service
        .set_status(id, store, OrderStatus::Delivered)
        .await
        .unwrap();
    let delivered = ledger.order_detail(store, id).await.unwrap().unwrap();
    assert_eq!(delivered.order.status, OrderStatus::Delivered);
    let stamp = delivered.order.delivered_at.unwrap();

    service
        .set_status(id, store, OrderStatus::Delivered)
        .await
        .unwrap();
    let again = ledger.order_detail(store, id).await.unwrap().unwrap();
    assert_eq!(again.order.delivered_at, Some(stamp));

    service
        .set_status(id, store, OrderStatus::Pending)
        .await
        .unwrap();
    let reverted = ledger.order_detail(store, id).await.unwrap().unwrap();
    assert_eq!(reverted.order.delivered_at, None);
}

#[tokio::test]
#[ignore = "Requires STOREHUB_TEST_DATABASE_URL"]
async fn test_pg_idempotent_resubmission() {
    let ledger = ledger().await;
    let (store, tee) = store_with_product(&ledger, 10).await;
    let service = OrderService::new(ledger.clone(), None);

    let key = Uuid::new_v4().to_string();
    let first = service
        .place_order(store, order(&[(tee, 1)]).with_idempotency_key(&key).unwrap())
        .await
        .unwrap();
    let second = service
        .place_order(store, order(&[(tee, 1)]).with_idempotency_key(&key).unwrap())
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(ledger.stock_of(tee).await.unwrap(), Some(9));
}

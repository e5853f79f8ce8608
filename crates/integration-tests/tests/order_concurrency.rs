//! Concurrent checkout against shared stock.
//!
//! Every test runs on a multi-threaded runtime so placements genuinely
//! interleave inside the ledger.

use storehub_integration_tests::{Shop, order};
use storehub_storefront::services::{ErrorKind, OrderError, OrderService};
use tokio::task::JoinSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_last_unit_goes_to_exactly_one_buyer() {
    for _ in 0..50 {
        let shop = Shop::new();
        let mug = shop.product("Mug", 1);
        let service = OrderService::new(shop.ledger.clone(), None);

        let mut tasks = JoinSet::new();
        for _ in 0..2 {
            let service = service.clone();
            let store = shop.store;
            tasks.spawn(async move { service.place_order(store, order(&[(mug, 1)])).await });
        }
        let results = tasks.join_all().await;

        let placed = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(placed, 1, "{results:?}");
        let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert_eq!(loser.kind(), ErrorKind::InsufficientStock);
        assert_eq!(shop.stock(mug), 0);
        assert_eq!(shop.ledger.order_count(), 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stock_never_goes_negative_under_contention() {
    let shop = Shop::new();
    let tee = shop.product("Tee", 10);
    let service = OrderService::new(shop.ledger.clone(), None);

    let mut tasks = JoinSet::new();
    for _ in 0..25 {
        let service = service.clone();
        let store = shop.store;
        tasks.spawn(async move { service.place_order(store, order(&[(tee, 1)])).await });
    }
    let results = tasks.join_all().await;

    let placed = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(placed, 10);
    assert!(results.iter().all(|r| match r {
        Ok(_) => true,
        Err(err) => matches!(err, OrderError::InsufficientStock { .. }),
    }));
    assert_eq!(shop.stock(tee), 0);
    assert_eq!(shop.ledger.order_count(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_multi_line_orders_conserve_stock() {
    let shop = Shop::new();
    let tee = shop.product("Tee", 100);
    let cap = shop.product("Cap", 10);
    let service = OrderService::new(shop.ledger.clone(), None);

    let mut tasks = JoinSet::new();
    for _ in 0..20 {
        let service = service.clone();
        let store = shop.store;
        tasks.spawn(async move {
            service
                .place_order(store, order(&[(tee, 1), (cap, 2)]))
                .await
        });
    }
    let results = tasks.join_all().await;

    // The cap runs out after five orders; rejected orders leave no trace.
    let placed = i32::try_from(results.iter().filter(|r| r.is_ok()).count()).unwrap();
    assert_eq!(placed, 5);
    assert_eq!(shop.stock(tee), 100 - placed);
    assert_eq!(shop.stock(cap), 10 - 2 * placed);
    assert_eq!(shop.ledger.order_count(), 5);
    assert_eq!(shop.ledger.item_count(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_resubmissions_create_one_order() {
    let shop = Shop::new();
    let tee = shop.product("Tee", 10);
    let service = OrderService::new(shop.ledger.clone(), None);

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let service = service.clone();
        let store = shop.store;
        tasks.spawn(async move {
            let order = order(&[(tee, 1)]).with_idempotency_key("cart-7").unwrap();
            service.place_order(store, order).await
        });
    }
    let ids: Vec<_> = tasks
        .join_all()
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    assert!(ids.windows(2).all(|pair| pair[0] == pair[1]), "{ids:?}");
    assert_eq!(shop.ledger.order_count(), 1);
    assert_eq!(shop.stock(tee), 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_key_race_for_last_unit_resolves_to_one_order() {
    for _ in 0..50 {
        let shop = Shop::new();
        let mug = shop.product("Mug", 1);
        let service = OrderService::new(shop.ledger.clone(), None);

        let mut tasks = JoinSet::new();
        for _ in 0..2 {
            let service = service.clone();
            let store = shop.store;
            tasks.spawn(async move {
                let order = order(&[(mug, 1)]).with_idempotency_key("cart-1").unwrap();
                service.place_order(store, order).await
            });
        }
        let results = tasks.join_all().await;

        assert!(results.iter().all(Result::is_ok), "{results:?}");
        let ids: Vec<_> = results.into_iter().map(Result::unwrap).collect();
        assert_eq!(ids[0], ids[1]);
        assert_eq!(shop.stock(mug), 0);
        assert_eq!(shop.ledger.order_count(), 1);
    }
}

//! Integration tests for the Storehub order engine.
//!
//! # Running Tests
//!
//! ```bash
//! # In-memory storage and HTTP tests
//! cargo test -p storehub-integration-tests
//!
//! # PostgreSQL tests (migrations are applied automatically)
//! STOREHUB_TEST_DATABASE_URL=postgres://localhost/storehub_test \
//!     cargo test -p storehub-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `order_concurrency` - Concurrent checkout against shared stock
//! - `reporting` - Dashboard aggregation over placed and delivered orders
//! - `http_api` - The JSON API end to end through the axum router
//! - `postgres_ledger` - The same guarantees against a real database

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use rust_decimal::Decimal;
use serde_json::Value;
use tower::ServiceExt;

use storehub_core::{ProductId, StoreId};
use storehub_storefront::ledger::MemoryLedger;
use storehub_storefront::models::{CustomerInfo, LineItem, NewOrder, NewProduct};
use storehub_storefront::state::{AppState, EngineSettings};

/// A store with one in-memory ledger behind it.
pub struct Shop {
    pub ledger: MemoryLedger,
    pub store: StoreId,
    pub slug: &'static str,
}

impl Shop {
    /// A fresh ledger holding one store, `acme`.
    #[must_use]
    pub fn new() -> Self {
        let ledger = MemoryLedger::new();
        let store = ledger.add_store("acme", "Acme Apparel").id;
        Self {
            ledger,
            store,
            slug: "acme",
        }
    }

    /// Add a product priced at 10.00.
    #[must_use]
    pub fn product(&self, name: &str, stock: i32) -> ProductId {
        self.ledger
            .add_product(self.store, NewProduct::new(name, Decimal::TEN, stock))
            .id
    }

    /// Current stock of a product.
    #[must_use]
    pub fn stock(&self, product: ProductId) -> i32 {
        self.ledger
            .product(product)
            .map_or(-1, |product| product.stock)
    }

    /// The HTTP API over this shop's ledger.
    #[must_use]
    pub fn app(&self) -> Router {
        storehub_storefront::app(AppState::new(
            self.ledger.clone(),
            EngineSettings::default(),
        ))
    }
}

impl Default for Shop {
    fn default() -> Self {
        Self::new()
    }
}

/// A cash-on-delivery order for `lines` of `(product, quantity)`, each at 10.00.
///
/// # Panics
///
/// Panics if a quantity is not positive.
#[must_use]
pub fn order(lines: &[(ProductId, i64)]) -> NewOrder {
    let customer = CustomerInfo::new("Rana Haddad", "rana@example.com", "Beirut", "+961 1 234 567")
        .expect("valid customer");
    let items: Vec<LineItem> = lines
        .iter()
        .enumerate()
        .map(|(i, &(product, quantity))| {
            LineItem::new(i + 1, product, quantity, Decimal::TEN, None, None)
                .expect("valid line item")
        })
        .collect();
    let total = lines
        .iter()
        .map(|&(_, quantity)| Decimal::TEN * Decimal::from(quantity))
        .sum();
    NewOrder::new(customer, "cash_on_delivery", items, total).expect("valid order")
}

/// Checkout request body for `lines` of `(product, quantity)`.
#[must_use]
pub fn checkout_body(slug: &str, lines: &[(ProductId, i64)]) -> Value {
    let items: Vec<Value> = lines
        .iter()
        .map(|&(product, quantity)| {
            serde_json::json!({
                "product_id": product,
                "quantity": quantity,
                "price": "10.00",
                "selected_size": "M",
            })
        })
        .collect();
    let total: i64 = lines.iter().map(|&(_, quantity)| quantity * 10).sum();

    serde_json::json!({
        "store_slug": slug,
        "customer_name": "Rana Haddad",
        "customer_email": "rana@example.com",
        "location": "Beirut",
        "phone": "+961 1 234 567",
        "payment_method": "cash_on_delivery",
        "items": items,
        "total_price": total.to_string(),
    })
}

/// Send one request through the router and decode the JSON response.
///
/// # Panics
///
/// Panics if the router fails or the body is not JSON.
pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

/// A JSON request, optionally scoped to a merchant store.
///
/// # Panics
///
/// Panics if the request cannot be built.
#[must_use]
pub fn json_request(method: &str, uri: &str, store: Option<StoreId>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(store) = store {
        builder = builder.header("x-store-id", store.to_string());
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("valid request")
}

/// A GET request, optionally scoped to a merchant store.
///
/// # Panics
///
/// Panics if the request cannot be built.
#[must_use]
pub fn get(uri: &str, store: Option<StoreId>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(store) = store {
        builder = builder.header("x-store-id", store.to_string());
    }
    builder.body(Body::empty()).expect("valid request")
}

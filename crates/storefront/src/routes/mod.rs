//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! # Public
//! GET  /api/storefront/{slug}     - Store profile and products with stock alerts
//! POST /api/orders                - Place an order (optional Idempotency-Key header)
//!
//! # Merchant (requires x-store-id)
//! GET  /api/orders                - Order listing (customer_name, customer_phone, status filters)
//! GET  /api/orders/stats          - Order count and delivered revenue
//! GET  /api/orders/{id}           - Order detail with items
//! PUT  /api/orders/{id}/status    - Status transition
//! GET  /api/dashboard             - Dashboard statistics
//! ```
//!
//! Health endpoints are mounted by the binary.

pub mod dashboard;
pub mod orders;
pub mod storefront;

use axum::{
    Router,
    routing::{get, put},
};

use crate::ledger::Storage;
use crate::state::AppState;

/// Create the order routes router.
pub fn order_routes<S: Storage>() -> Router<AppState<S>> {
    Router::new()
        .route("/", get(orders::list::<S>).post(orders::create::<S>))
        .route("/stats", get(orders::stats::<S>))
        .route("/{id}", get(orders::show::<S>))
        .route("/{id}/status", put(orders::update_status::<S>))
}

/// Create all API routes.
pub fn routes<S: Storage>() -> Router<AppState<S>> {
    Router::new()
        .route("/api/storefront/{slug}", get(storefront::show::<S>))
        .nest("/api/orders", order_routes())
        .route("/api/dashboard", get(dashboard::show::<S>))
}

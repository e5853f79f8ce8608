//! Storehub storefront library.
//!
//! The order transaction engine, merchant reporting and the HTTP API, as a
//! library so the binary, CLI and integration tests share one code path.
//!
//! # Layers
//!
//! - [`models`] - validated domain objects
//! - [`ledger`] - storage traits with `PostgreSQL` and in-memory backends
//! - [`services`] - order engine and reporting, generic over storage
//! - [`routes`] - axum handlers, generic over storage
//!
//! [`app`] assembles the API router for any [`ledger::Storage`] backend.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use axum::{Router, body::Body, http::Request};
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::ledger::Storage;
use crate::state::AppState;

/// Build the API router with request tracing and request ids.
///
/// Health checks, CORS and Sentry layers are added by the binary.
pub fn app<S: Storage>(state: AppState<S>) -> Router {
    routes::routes::<S>()
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .with_state(state)
}

/// Span for one HTTP request. `request_id` is filled in by the request id middleware.
fn request_span(request: &Request<Body>) -> Span {
    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = tracing::field::Empty,
    )
}

//! Public storefront route handler.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;

use storehub_core::StockAlert;

use crate::error::{AppError, Result};
use crate::ledger::Storage;
use crate::models::{Product, Store};
use crate::state::AppState;

/// A product as shown on the storefront.
#[derive(Debug, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub stock_alert: Option<StockAlert>,
}

/// Storefront response body.
#[derive(Debug, Serialize)]
pub struct StorefrontResponse {
    pub store: Store,
    pub products: Vec<ProductView>,
}

/// Store profile and live products.
///
/// GET /api/storefront/{slug}
///
/// # Errors
///
/// Returns 404 if no store has this slug.
pub async fn show<S: Storage>(
    State(state): State<AppState<S>>,
    Path(slug): Path<String>,
) -> Result<Json<StorefrontResponse>> {
    let store = state
        .store_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound("Store not found".to_string()))?;

    let threshold = state.settings().low_stock_threshold;
    let products = state
        .storage()
        .products(store.id)
        .await?
        .into_iter()
        .map(|product| ProductView {
            stock_alert: StockAlert::for_stock(product.stock, threshold),
            product,
        })
        .collect();

    Ok(Json(StorefrontResponse { store, products }))
}

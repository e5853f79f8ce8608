//! Merchant dashboard route handler.

use axum::{Json, extract::State};
use chrono::Utc;

use crate::error::Result;
use crate::ledger::Storage;
use crate::middleware::MerchantStore;
use crate::services::DashboardStats;
use crate::state::AppState;

/// Dashboard statistics for the merchant's store.
///
/// GET /api/dashboard
///
/// The revenue window closes on the current UTC date.
///
/// # Errors
///
/// Returns 500 if any reporting query fails.
pub async fn show<S: Storage>(
    State(state): State<AppState<S>>,
    MerchantStore(store_id): MerchantStore,
) -> Result<Json<DashboardStats>> {
    let today = Utc::now().date_naive();
    let stats = state.reporting().dashboard(store_id, today).await?;
    Ok(Json(stats))
}

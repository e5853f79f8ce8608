//! Order route handlers.
//!
//! Checkout (`POST /api/orders`) is public and addressed by store slug. All
//! other handlers are merchant-scoped through [`MerchantStore`].

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use storehub_core::{OrderId, ProductId};

use crate::error::{AppError, Result};
use crate::ledger::Storage;
use crate::middleware::MerchantStore;
use crate::models::{
    CustomerInfo, LineItem, NewOrder, Order, OrderDetail, OrderFilter, OrderStats,
    ValidationError,
};
use crate::services::orders::{OrderError, StatusUpdate, parse_status};
use crate::state::AppState;

/// Header carrying a client-chosen key that makes checkout retries safe.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

// ============================================================================
// Checkout
// ============================================================================

/// Checkout request body.
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub store_slug: String,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub customer_email: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub items: Vec<CreateOrderItem>,
    #[serde(default)]
    pub total_price: Decimal,
}

/// One cart line in a checkout request.
#[derive(Debug, Deserialize)]
pub struct CreateOrderItem {
    pub product_id: ProductId,
    pub quantity: i64,
    /// Unit price shown to the customer.
    pub price: Decimal,
    pub selected_size: Option<String>,
    pub selected_color: Option<String>,
}

impl CreateOrderRequest {
    /// Validate the request into a store slug and an order.
    ///
    /// # Errors
    ///
    /// Returns the first `ValidationError` found.
    pub fn into_order(self) -> std::result::Result<(String, NewOrder), ValidationError> {
        let slug = self.store_slug.trim();
        if slug.is_empty() {
            return Err(ValidationError::MissingField("Store slug"));
        }

        let customer = CustomerInfo::new(
            &self.customer_name,
            &self.customer_email,
            &self.location,
            &self.phone,
        )?;
        let items = self
            .items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                LineItem::new(
                    i + 1,
                    item.product_id,
                    item.quantity,
                    item.price,
                    item.selected_size,
                    item.selected_color,
                )
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let order = NewOrder::new(customer, &self.payment_method, items, self.total_price)?;

        Ok((slug.to_owned(), order))
    }
}

/// Checkout response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    pub message: &'static str,
    pub order_id: OrderId,
}

/// Place an order.
///
/// POST /api/orders
///
/// # Errors
///
/// Returns 400 for invalid input, 404 for an unknown store or product,
/// 409 when stock runs out, 500 if the transaction fails.
pub async fn create<S: Storage>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    payload: std::result::Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderCreated>)> {
    let Json(request) = payload?;
    let (slug, mut order) = request.into_order()?;
    if let Some(key) = headers.get(IDEMPOTENCY_KEY_HEADER) {
        let key = key
            .to_str()
            .map_err(|_| ValidationError::InvalidIdempotencyKey)?;
        order = order.with_idempotency_key(key)?;
    }

    let store = state
        .store_by_slug(&slug)
        .await?
        .ok_or(OrderError::StoreNotFound)?;
    let order_id = state.orders().place_order(store.id, order).await?;

    Ok((
        StatusCode::CREATED,
        Json(OrderCreated {
            message: "Order placed successfully",
            order_id,
        }),
    ))
}

// ============================================================================
// Merchant
// ============================================================================

/// Order listing response body.
#[derive(Debug, Serialize)]
pub struct OrderList {
    pub orders: Vec<Order>,
    pub count: usize,
}

/// List the merchant's orders, newest first.
///
/// GET /api/orders?customer_name=&customer_phone=&status=
///
/// # Errors
///
/// Returns 400 for an unknown status filter, 500 if storage fails.
pub async fn list<S: Storage>(
    State(state): State<AppState<S>>,
    MerchantStore(store_id): MerchantStore,
    query: std::result::Result<Query<OrderFilter>, QueryRejection>,
) -> Result<Json<OrderList>> {
    let Query(filter) = query?;
    let orders = state.storage().orders(store_id, &filter.normalized()).await?;

    Ok(Json(OrderList {
        count: orders.len(),
        orders,
    }))
}

/// Order detail response body.
#[derive(Debug, Serialize)]
pub struct OrderDetailResponse {
    pub order: OrderDetail,
}

/// Show one of the merchant's orders with its items.
///
/// GET /api/orders/{id}
///
/// # Errors
///
/// Returns 404 if the order does not exist in the merchant's store.
pub async fn show<S: Storage>(
    State(state): State<AppState<S>>,
    MerchantStore(store_id): MerchantStore,
    path: std::result::Result<Path<OrderId>, PathRejection>,
) -> Result<Json<OrderDetailResponse>> {
    let Path(order_id) = path?;
    let order = state
        .storage()
        .order_detail(store_id, order_id)
        .await?
        .ok_or(OrderError::OrderNotFound)?;

    Ok(Json(OrderDetailResponse { order }))
}

/// Order stats response body.
#[derive(Debug, Serialize)]
pub struct OrderStatsResponse {
    pub stats: OrderStats,
}

/// Store-wide order totals.
///
/// GET /api/orders/stats
///
/// # Errors
///
/// Returns 500 if storage fails.
pub async fn stats<S: Storage>(
    State(state): State<AppState<S>>,
    MerchantStore(store_id): MerchantStore,
) -> Result<Json<OrderStatsResponse>> {
    let stats = state.storage().order_stats(store_id).await?;
    Ok(Json(OrderStatsResponse { stats }))
}

/// Status update request body.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    #[serde(default)]
    pub status: String,
}

/// Acknowledgement body.
#[derive(Debug, Serialize)]
pub struct Message {
    pub message: &'static str,
}

/// Move one of the merchant's orders to a new status.
///
/// PUT /api/orders/{id}/status
///
/// # Errors
///
/// Returns 400 for an invalid status, 404 if the order does not exist in the
/// merchant's store.
pub async fn update_status<S: Storage>(
    State(state): State<AppState<S>>,
    MerchantStore(store_id): MerchantStore,
    path: std::result::Result<Path<OrderId>, PathRejection>,
    payload: std::result::Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<Message>> {
    let Path(order_id) = path?;
    let Json(request) = payload?;
    let status = parse_status(request.status.trim())?;

    match state.orders().set_status(order_id, store_id, status).await? {
        StatusUpdate::Updated => Ok(Json(Message {
            message: "Order status updated",
        })),
        StatusUpdate::NotFound => Err(AppError::from(OrderError::OrderNotFound)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: serde_json::Value) -> CreateOrderRequest {
        serde_json::from_value(json).unwrap()
    }

    fn valid() -> serde_json::Value {
        serde_json::json!({
            "store_slug": "acme",
            "customer_name": "Rana",
            "customer_email": "rana@example.com",
            "location": "Beirut",
            "phone": "+961 1 234 567",
            "payment_method": "cash_on_delivery",
            "items": [
                { "product_id": 3, "quantity": 2, "price": "12.50", "selected_size": "M" }
            ],
            "total_price": 25
        })
    }

    #[test]
    fn test_into_order() {
        let (slug, order) = request(valid()).into_order().unwrap();
        assert_eq!(slug, "acme");
        assert_eq!(order.items().len(), 1);
        assert_eq!(order.items()[0].unit_price, Decimal::new(1250, 2));
        assert_eq!(order.items()[0].size.as_deref(), Some("M"));
        assert_eq!(order.total_price(), Decimal::new(25, 0));
    }

    #[test]
    fn test_into_order_rejections() {
        let cases = [
            ("store_slug", serde_json::json!(""), ValidationError::MissingField("Store slug")),
            ("items", serde_json::json!([]), ValidationError::EmptyCart),
            ("total_price", serde_json::json!(0), ValidationError::InvalidTotal),
            (
                "payment_method",
                serde_json::json!("card"),
                ValidationError::UnsupportedPaymentMethod("card".to_owned()),
            ),
        ];
        for (field, value, expected) in cases {
            let mut json = valid();
            json[field] = value;
            assert_eq!(request(json).into_order().unwrap_err(), expected, "{field}");
        }
    }

    #[test]
    fn test_into_order_rejects_zero_quantity() {
        let mut json = valid();
        json["items"][0]["quantity"] = serde_json::json!(0);
        assert!(matches!(
            request(json).into_order(),
            Err(ValidationError::InvalidQuantity { line: 1, .. })
        ));
    }

    #[test]
    fn test_order_created_shape() {
        let body = serde_json::to_value(OrderCreated {
            message: "Order placed successfully",
            order_id: OrderId::new(9),
        })
        .unwrap();
        assert_eq!(body["orderId"], 9);
    }
}

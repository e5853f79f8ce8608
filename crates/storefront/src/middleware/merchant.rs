//! Merchant scoping extractor.
//!
//! Authentication happens upstream. The gateway forwards the authenticated
//! merchant's store id in `x-store-id`; handlers that act on a merchant's data
//! take a [`MerchantStore`] and pass its id to every storage call.

use axum::{extract::FromRequestParts, http::request::Parts};

use storehub_core::StoreId;

use crate::error::AppError;

/// The HTTP header carrying the merchant's store id.
pub const STORE_ID_HEADER: &str = "x-store-id";

/// Extractor for the caller's store.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(MerchantStore(store_id): MerchantStore) -> impl IntoResponse {
///     format!("store {store_id}")
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MerchantStore(pub StoreId);

impl<S> FromRequestParts<S> for MerchantStore
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let store_id = parts
            .headers
            .get(STORE_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.parse::<StoreId>().ok())
            .filter(|id| id.as_i64() > 0)
            .ok_or_else(|| AppError::Unauthorized("Store authentication required".to_string()))?;

        sentry::configure_scope(|scope| {
            scope.set_tag("store_id", store_id);
        });

        Ok(Self(store_id))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{Request, StatusCode};
    use axum::response::IntoResponse;

    use super::*;

    async fn extract(value: Option<&str>) -> Result<MerchantStore, AppError> {
        let mut builder = Request::get("/api/orders");
        if let Some(value) = value {
            builder = builder.header(STORE_ID_HEADER, value);
        }
        let (mut parts, ()) = builder.body(()).unwrap().into_parts();
        MerchantStore::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_valid_store_id() {
        assert_eq!(
            extract(Some(" 42 ")).await.unwrap(),
            MerchantStore(StoreId::new(42))
        );
    }

    #[tokio::test]
    async fn test_missing_or_invalid_store_id() {
        for value in [None, Some("abc"), Some("0"), Some("-3")] {
            let err = extract(value).await.unwrap_err();
            assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
        }
    }
}

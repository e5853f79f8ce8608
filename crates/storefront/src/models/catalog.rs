//! Store and product domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use storehub_core::{ProductId, StoreId};

/// A merchant's store (tenant scope).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Store {
    pub id: StoreId,
    /// URL-friendly identifier used by the public storefront.
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub contact_number: Option<String>,
}

/// A sellable product.
///
/// Soft-deleted products never surface as a `Product`; storage filters them out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub store_id: StoreId,
    pub name: String,
    pub price: Decimal,
    /// Sellable units. Never negative.
    pub stock: i32,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub available_sizes: Vec<String>,
    pub available_colors: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a product (seeding and tests; product CRUD lives elsewhere).
#[derive(Debug, Clone, Default)]
pub struct NewProduct {
    pub name: String,
    pub price: Decimal,
    pub stock: i32,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub available_sizes: Vec<String>,
    pub available_colors: Vec<String>,
}

impl NewProduct {
    /// A product with just a name, price and starting stock.
    #[must_use]
    pub fn new(name: impl Into<String>, price: Decimal, stock: i32) -> Self {
        Self {
            name: name.into(),
            price,
            stock,
            ..Self::default()
        }
    }
}

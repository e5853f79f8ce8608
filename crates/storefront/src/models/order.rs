//! Order domain types and checkout input validation.
//!
//! [`NewOrder`] can only be built through its validating constructors, so the
//! order engine never sees an empty cart, a non-positive quantity or price, or
//! an unsupported payment method.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use storehub_core::{
    Email, EmailError, OrderId, OrderItemId, OrderStatus, PaymentMethod, ProductId, Quantity,
    QuantityError, StoreId,
};

/// Longest accepted `Idempotency-Key`.
pub const MAX_IDEMPOTENCY_KEY_LENGTH: usize = 255;

/// Input rejected before any storage access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required text field is missing or blank.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// Customer email is malformed.
    #[error("Valid email is required: {0}")]
    InvalidEmail(#[from] EmailError),

    /// Any payment method other than cash on delivery.
    #[error("Only cash on delivery is currently supported (got {0:?})")]
    UnsupportedPaymentMethod(String),

    /// The cart has no line items.
    #[error("At least one item is required")]
    EmptyCart,

    /// A line item has a zero or negative quantity.
    #[error("Item {line}: {source}")]
    InvalidQuantity {
        line: usize,
        #[source]
        source: QuantityError,
    },

    /// A line item has a zero or negative unit price.
    #[error("Item {line}: price must be greater than 0")]
    InvalidUnitPrice { line: usize },

    /// Order total is zero or negative.
    #[error("Total price must be greater than 0")]
    InvalidTotal,

    /// Status outside `pending | shipped | delivered`.
    #[error("Invalid status: {0:?}")]
    InvalidStatus(String),

    /// Idempotency key is blank or too long.
    #[error("Idempotency key must be 1-{MAX_IDEMPOTENCY_KEY_LENGTH} characters")]
    InvalidIdempotencyKey,
}

/// Who placed the order and where it ships.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerInfo {
    pub name: String,
    pub email: Email,
    pub location: String,
    pub phone: String,
}

impl CustomerInfo {
    /// Validate and normalize customer details.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if a field is blank or the email is malformed.
    pub fn new(
        name: &str,
        email: &str,
        location: &str,
        phone: &str,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            name: required("Customer name", name)?,
            email: Email::parse(email)?,
            location: required("Location", location)?,
            phone: required("Phone number", phone)?,
        })
    }
}

/// One cart line: which product, how many, and the unit price the customer saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    pub product_id: ProductId,
    pub quantity: Quantity,
    /// Snapshot of the unit price at checkout; never re-read from the product.
    pub unit_price: Decimal,
    pub size: Option<String>,
    pub color: Option<String>,
}

impl LineItem {
    /// Validate one cart line. `line` is the 1-based position used in error messages.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for a non-positive quantity or unit price.
    pub fn new(
        line: usize,
        product_id: ProductId,
        quantity: i64,
        unit_price: Decimal,
        size: Option<String>,
        color: Option<String>,
    ) -> Result<Self, ValidationError> {
        let quantity = Quantity::try_from(quantity)
            .map_err(|source| ValidationError::InvalidQuantity { line, source })?;
        if unit_price <= Decimal::ZERO {
            return Err(ValidationError::InvalidUnitPrice { line });
        }

        Ok(Self {
            product_id,
            quantity,
            unit_price,
            size: optional(size),
            color: optional(color),
        })
    }
}

/// A validated checkout, ready for the order engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    customer: CustomerInfo,
    payment_method: PaymentMethod,
    items: Vec<LineItem>,
    total_price: Decimal,
    idempotency_key: Option<String>,
}

impl NewOrder {
    /// Assemble an order from validated parts.
    ///
    /// `payment_method` is the raw value submitted by the client.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for an unsupported payment method, an empty
    /// cart, or a non-positive total.
    pub fn new(
        customer: CustomerInfo,
        payment_method: &str,
        items: Vec<LineItem>,
        total_price: Decimal,
    ) -> Result<Self, ValidationError> {
        let payment_method = payment_method
            .parse::<PaymentMethod>()
            .map_err(|_| ValidationError::UnsupportedPaymentMethod(payment_method.to_owned()))?;
        if items.is_empty() {
            return Err(ValidationError::EmptyCart);
        }
        if total_price <= Decimal::ZERO {
            return Err(ValidationError::InvalidTotal);
        }

        Ok(Self {
            customer,
            payment_method,
            items,
            total_price,
            idempotency_key: None,
        })
    }

    /// Attach a client-supplied idempotency key.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidIdempotencyKey` if the key is blank or too long.
    pub fn with_idempotency_key(mut self, key: &str) -> Result<Self, ValidationError> {
        let key = key.trim();
        if key.is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LENGTH {
            return Err(ValidationError::InvalidIdempotencyKey);
        }
        self.idempotency_key = Some(key.to_owned());
        Ok(self)
    }

    #[must_use]
    pub const fn customer(&self) -> &CustomerInfo {
        &self.customer
    }

    #[must_use]
    pub const fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    /// Cart lines. Never empty.
    #[must_use]
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    #[must_use]
    pub const fn total_price(&self) -> Decimal {
        self.total_price
    }

    #[must_use]
    pub fn idempotency_key(&self) -> Option<&str> {
        self.idempotency_key.as_deref()
    }
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub store_id: StoreId,
    pub customer_name: String,
    pub customer_email: Email,
    pub location: String,
    pub phone: String,
    pub payment_method: PaymentMethod,
    pub total_price: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    /// Set iff `status` is `Delivered`.
    pub delivered_at: Option<DateTime<Utc>>,
}

/// A persisted order line, joined with the product name for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub product_name: Option<String>,
    pub quantity: i32,
    pub price: Decimal,
    pub selected_size: Option<String>,
    pub selected_color: Option<String>,
}

/// An order with its (immutable) line items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Merchant order-list filters. All are optional and combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OrderFilter {
    /// Case-insensitive substring of the customer name.
    pub customer_name: Option<String>,
    /// Substring of the phone number.
    pub customer_phone: Option<String>,
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    /// Drop blank text filters so `?customer_name=` means "no filter".
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            customer_name: optional(self.customer_name),
            customer_phone: optional(self.customer_phone),
            status: self.status,
        }
    }
}

/// Store-wide order totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderStats {
    pub total_orders: i64,
    /// Sum of `total_price` over delivered orders.
    pub total_revenue: Decimal,
}

fn required(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(value.to_owned())
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

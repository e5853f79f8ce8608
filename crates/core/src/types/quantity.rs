//! Line-item quantity.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Error returned when a quantity is not strictly positive.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("quantity must be greater than 0 (got {0})")]
pub struct QuantityError(pub i64);

/// Number of units requested on one line item. Always `> 0`.
///
/// Stock counters are `i32` in storage, so quantities share that range.
///
/// ```
/// use storehub_core::Quantity;
///
/// assert_eq!(Quantity::new(3).map(Quantity::get), Ok(3));
/// assert!(Quantity::new(0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i32")]
pub struct Quantity(i32);

impl Quantity {
    /// Create a quantity.
    ///
    /// # Errors
    ///
    /// Returns [`QuantityError`] if `value` is zero or negative.
    pub const fn new(value: i32) -> Result<Self, QuantityError> {
        if value > 0 {
            Ok(Self(value))
        } else {
            Err(QuantityError(value as i64))
        }
    }

    /// The number of units.
    #[must_use]
    pub const fn get(self) -> i32 {
        self.0
    }
}

impl TryFrom<i64> for Quantity {
    type Error = QuantityError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        i32::try_from(value)
            .map_err(|_| QuantityError(value))
            .and_then(Self::new)
    }
}

impl From<Quantity> for i32 {
    fn from(quantity: Quantity) -> Self {
        quantity.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

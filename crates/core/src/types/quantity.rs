//! Cart line quantity.

use core::fmt;
use core::num::NonZeroU32;

use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Quantity`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantityError {
    /// A stored line must hold at least one unit.
    #[error("quantity must be at least 1")]
    Zero,
    /// The value does not fit the storage type.
    #[error("quantity {0} is out of range")]
    OutOfRange(i64),
}

/// Number of units of one product in a cart line. Always at least 1.
///
/// A line whose quantity would reach zero is deleted rather than stored, so
/// this type has no zero value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(NonZeroU32);

impl Quantity {
    /// A single unit.
    pub const ONE: Self = Self(NonZeroU32::MIN);

    /// Create a quantity.
    ///
    /// # Errors
    ///
    /// Returns [`QuantityError::Zero`] for `0`.
    pub fn new(value: u32) -> Result<Self, QuantityError> {
        NonZeroU32::new(value).map(Self).ok_or(QuantityError::Zero)
    }

    /// The quantity as a plain integer.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }

    /// Add `delta` units, failing on overflow of the storage range.
    ///
    /// # Errors
    ///
    /// Returns [`QuantityError::OutOfRange`] if the sum exceeds `i32::MAX`.
    pub fn checked_add(self, delta: u32) -> Result<Self, QuantityError> {
        let sum = u64::from(self.get()) + u64::from(delta);
        if sum > u64::from(i32::MAX.unsigned_abs()) {
            return Err(QuantityError::OutOfRange(i64::try_from(sum).unwrap_or(i64::MAX)));
        }
        u32::try_from(sum)
            .map_err(|_| QuantityError::OutOfRange(i64::MAX))
            .and_then(Self::new)
    }
}

impl TryFrom<u32> for Quantity {
    type Error = QuantityError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<i32> for Quantity {
    type Error = QuantityError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        let value = u32::try_from(value).map_err(|_| QuantityError::OutOfRange(value.into()))?;
        Self::new(value)
    }
}

impl From<Quantity> for u32 {
    fn from(quantity: Quantity) -> Self {
        quantity.get()
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_rejected() {
        assert_eq!(Quantity::new(0), Err(QuantityError::Zero));
        assert_eq!(Quantity::try_from(0_i32), Err(QuantityError::Zero));
        assert!(matches!(
            Quantity::try_from(-4_i32),
            Err(QuantityError::OutOfRange(-4))
        ));
    }

    #[test]
    fn test_checked_add() {
        let q = Quantity::ONE.checked_add(2).unwrap();
        assert_eq!(q.get(), 3);
        assert!(Quantity::new(u32::try_from(i32::MAX).unwrap())
            .unwrap()
            .checked_add(1)
            .is_err());
    }

    #[test]
    fn test_serde_rejects_zero() {
        assert!(serde_json::from_str::<Quantity>("0").is_err());
        assert_eq!(serde_json::from_str::<Quantity>("2").unwrap().get(), 2);
    }
}

//! Cart line and quantity types.
//!
//! A cart (guest or user) is a list of [`CartLine`]s with at most one line
//! per product. The same shape is used for the guest cart JSON blob and for
//! rows of the remote `cart_items` table.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use super::id::ProductId;

/// Error returned when a raw integer is not a valid line quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("quantity must be between 1 and {max}, got {0}", max = i32::MAX)]
pub struct QuantityError(pub i64);

/// Number of units on a cart line.
///
/// Always at least 1: a line with no units is represented by the line
/// being absent. Bounded by `i32::MAX` to match the database column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Quantity(i32);

impl Quantity {
    /// A single unit.
    pub const ONE: Self = Self(1);

    /// Create a quantity, returning `None` when `n < 1` or `n > i32::MAX`.
    #[must_use]
    pub fn new(n: i64) -> Option<Self> {
        i32::try_from(n).ok().filter(|&q| q >= 1).map(Self)
    }

    /// Get the raw value.
    #[must_use]
    pub const fn get(self) -> i32 {
        self.0
    }

    /// Add two quantities, returning `None` on overflow.
    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Self::ONE
    }
}

impl TryFrom<i64> for Quantity {
    type Error = QuantityError;

    fn try_from(n: i64) -> Result<Self, Self::Error> {
        Self::new(n).ok_or(QuantityError(n))
    }
}

impl TryFrom<i32> for Quantity {
    type Error = QuantityError;

    fn try_from(n: i32) -> Result<Self, Self::Error> {
        Self::try_from(i64::from(n))
    }
}

impl From<Quantity> for i32 {
    fn from(q: Quantity) -> Self {
        q.0
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        Self::try_from(raw).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One `(product, quantity)` pairing within a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// Product this line refers to.
    pub product_id: ProductId,
    /// Units of the product.
    pub quantity: Quantity,
}

impl CartLine {
    /// Create a new line.
    #[must_use]
    pub const fn new(product_id: ProductId, quantity: Quantity) -> Self {
        Self {
            product_id,
            quantity,
        }
    }

    /// Returns the first product that appears on more than one line, if any.
    #[must_use]
    pub fn find_duplicate(lines: &[Self]) -> Option<ProductId> {
        let mut seen = std::collections::HashSet::with_capacity(lines.len());
        lines
            .iter()
            .map(|line| line.product_id)
            .find(|id| !seen.insert(*id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_bounds() {
        assert!(Quantity::new(0).is_none());
        assert!(Quantity::new(-1).is_none());
        assert!(Quantity::new(i64::from(i32::MAX) + 1).is_none());
        assert_eq!(Quantity::new(1), Some(Quantity::ONE));
        assert_eq!(Quantity::new(7).map(Quantity::get), Some(7));
    }

    #[test]
    fn test_quantity_checked_add() {
        let two = Quantity::new(2).unwrap();
        let three = Quantity::new(3).unwrap();
        assert_eq!(two.checked_add(three), Quantity::new(5));

        let max = Quantity::new(i64::from(i32::MAX)).unwrap();
        assert!(max.checked_add(Quantity::ONE).is_none());
    }

    #[test]
    fn test_quantity_deserialize_rejects_zero() {
        assert!(serde_json::from_str::<Quantity>("0").is_err());
        assert!(serde_json::from_str::<Quantity>("-4").is_err());
        assert_eq!(serde_json::from_str::<Quantity>("4").unwrap().get(), 4);
    }

    #[test]
    fn test_cart_line_json_shape() {
        let id: ProductId = "6f1c2c1e-4a3b-4f4e-9a55-0f0c6ad1c001".parse().unwrap();
        let line = CartLine::new(id, Quantity::new(2).unwrap());
        let json = serde_json::to_value(line).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "product_id": "6f1c2c1e-4a3b-4f4e-9a55-0f0c6ad1c001",
                "quantity": 2
            })
        );
    }

    #[test]
    fn test_find_duplicate() {
        let a = ProductId::generate();
        let b = ProductId::generate();
        let lines = [
            CartLine::new(a, Quantity::ONE),
            CartLine::new(b, Quantity::ONE),
        ];
        assert!(CartLine::find_duplicate(&lines).is_none());

        let dup = [
            CartLine::new(a, Quantity::ONE),
            CartLine::new(b, Quantity::ONE),
            CartLine::new(a, Quantity::ONE),
        ];
        assert_eq!(CartLine::find_duplicate(&dup), Some(a));
    }
}

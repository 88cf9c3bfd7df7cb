//! Core types for Emporium.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod id;
pub mod price;
pub mod product;
pub mod status;

pub use cart::{CartLine, Quantity, QuantityError};
pub use id::*;
pub use price::Price;
pub use product::ProductSnapshot;
pub use status::OrderStatus;

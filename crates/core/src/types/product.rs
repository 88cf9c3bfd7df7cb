//! Product snapshot attached to cart lines.

use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::price::Price;

/// Current product data as read from the catalog.
///
/// A snapshot is taken on every cart read so prices and availability shown
/// in the cart are never older than the request that displays them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    /// Product ID.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// URL slug.
    pub slug: String,
    /// Unit price.
    pub price: Price,
    /// Original price shown struck through, if discounted.
    pub compare_at_price: Option<Price>,
    /// Image URLs, first one is the primary image.
    pub images: Vec<String>,
    /// Units in stock.
    pub stock: i32,
    /// Whether the product is currently sold.
    pub is_active: bool,
}

impl ProductSnapshot {
    /// Primary image URL, if any.
    #[must_use]
    pub fn primary_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }
}

//! Cart view model.

use emporium_core::{CartLine, Price, ProductId, ProductSnapshot};
use serde::Serialize;
use tracing::{debug, warn};

use super::CartError;
use super::catalog::ProductCatalog;
use super::source::CartSource;

/// A cart line enriched with its product snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartItem {
    /// Product and quantity.
    #[serde(flatten)]
    pub line: CartLine,
    /// Current product data.
    pub product: ProductSnapshot,
}

impl CartItem {
    /// Create an item from a line and its product.
    #[must_use]
    pub const fn new(line: CartLine, product: ProductSnapshot) -> Self {
        Self { line, product }
    }

    /// Product ID of this item.
    #[must_use]
    pub const fn product_id(&self) -> ProductId {
        self.line.product_id
    }

    /// Unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.product.price.times(self.line.quantity)
    }
}

/// Derived read model of the authoritative cart.
///
/// Built fresh on every read; holds no state of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartView {
    /// Lines with product data.
    pub items: Vec<CartItem>,
    /// Sum of quantities across all lines.
    pub item_count: u64,
    /// Sum of unit price times quantity across all lines.
    pub subtotal: Price,
}

impl CartView {
    /// An empty cart.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            items: Vec::new(),
            item_count: 0,
            subtotal: Price::ZERO,
        }
    }

    /// Compute the view from enriched items.
    #[must_use]
    pub fn from_items(items: Vec<CartItem>) -> Self {
        let item_count = items
            .iter()
            .map(|item| u64::from(item.line.quantity.get().unsigned_abs()))
            .sum();
        let subtotal = items.iter().map(CartItem::line_total).sum();

        Self {
            items,
            item_count,
            subtotal,
        }
    }

    /// Load and compute the view for the given source.
    ///
    /// Guest lines are enriched through the catalog. Lines whose product no
    /// longer exists are pruned from guest storage so the stored cart and
    /// the view agree. A failed prune is logged and retried on the next read.
    ///
    /// # Errors
    ///
    /// Returns `CartError::BackendUnavailable` if the remote store or the
    /// catalog fails, or `CartError::Storage` if guest storage fails.
    pub async fn load(
        source: &CartSource<'_>,
        catalog: &dyn ProductCatalog,
    ) -> Result<Self, CartError> {
        let items = match source {
            CartSource::Guest(local) => {
                let lines = local.read().await?;
                if lines.is_empty() {
                    return Ok(Self::empty());
                }

                let ids: Vec<ProductId> = lines.iter().map(|line| line.product_id).collect();
                let mut products = catalog.snapshots(&ids).await?;

                let stored = lines.len();
                let mut kept = Vec::with_capacity(stored);
                let mut items = Vec::with_capacity(stored);
                for line in lines {
                    if let Some(product) = products.remove(&line.product_id) {
                        kept.push(line);
                        items.push(CartItem::new(line, product));
                    } else {
                        debug!(product_id = %line.product_id, "Dropping guest cart line with no product");
                    }
                }

                if kept.len() < stored {
                    if let Err(e) = local.write(&kept).await {
                        warn!(error = %e, "Failed to prune guest cart");
                    }
                }
                items
            }
            CartSource::User(remote, user_id) => remote.fetch(*user_id).await?,
        };

        Ok(Self::from_items(items))
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Formatted subtotal, e.g. `$42.00`.
    #[must_use]
    pub fn subtotal_display(&self) -> String {
        self.subtotal.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use emporium_core::Quantity;

    use super::*;
    use crate::cart::local::LocalCartStore;
    use crate::cart::memory::{MemoryCatalog, MemoryGuestStorage};

    fn product(cents: i64) -> ProductSnapshot {
        ProductSnapshot {
            id: ProductId::generate(),
            name: "Widget".to_string(),
            slug: "widget".to_string(),
            price: Price::from_cents(cents),
            compare_at_price: None,
            images: Vec::new(),
            stock: 10,
            is_active: true,
        }
    }

    fn item(cents: i64, qty: i64) -> CartItem {
        let product = product(cents);
        CartItem::new(
            CartLine::new(product.id, Quantity::new(qty).unwrap()),
            product,
        )
    }

    #[test]
    fn test_empty_view() {
        let view = CartView::from_items(Vec::new());
        assert_eq!(view, CartView::empty());
        assert_eq!(view.subtotal_display(), "$0.00");
    }

    #[test]
    fn test_item_count_and_subtotal() {
        let view = CartView::from_items(vec![item(1999, 2), item(500, 3)]);

        assert_eq!(view.item_count, 5);
        assert_eq!(view.subtotal, Price::from_cents(1999 * 2 + 500 * 3));
        assert_eq!(view.subtotal_display(), "$54.98");
    }

    #[test]
    fn test_item_serializes_flat() {
        let item = item(100, 1);
        let json = serde_json::to_value(&item).unwrap();

        assert_eq!(json["quantity"], 1);
        assert_eq!(json["product_id"], item.product.id.to_string());
        assert_eq!(json["product"]["name"], "Widget");
    }

    #[tokio::test]
    async fn test_guest_view_prunes_lines_without_product() {
        let catalog = MemoryCatalog::new();
        let local = LocalCartStore::new(Arc::new(MemoryGuestStorage::new()));
        let mug = product(1200);
        let gone = ProductId::generate();
        catalog.insert(mug.clone());
        let kept = CartLine::new(mug.id, Quantity::ONE);
        local
            .write(&[kept, CartLine::new(gone, Quantity::new(3).unwrap())])
            .await
            .unwrap();

        let view = CartView::load(&CartSource::Guest(&local), &catalog)
            .await
            .unwrap();

        assert_eq!(view.item_count, 1);
        assert_eq!(local.read().await.unwrap(), vec![kept]);
    }
}

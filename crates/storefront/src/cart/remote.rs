//! Remote (per-user) cart store.

use async_trait::async_trait;
use emporium_core::{ProductId, Quantity, UserId};

use super::CartError;
use super::view::CartItem;

/// Per-user cart rows owned by the managed database.
///
/// Rows are unique on `(user_id, product_id)`. Quantities are always at
/// least one; callers route a request for fewer units to [`delete`].
///
/// Every method fails with `CartError::BackendUnavailable` when the data
/// source errors. Callers must then leave their view of the cart unchanged
/// rather than assume it is empty.
///
/// [`delete`]: RemoteCartStore::delete
#[async_trait]
pub trait RemoteCartStore: Send + Sync {
    /// Fetch the user's lines joined with current product data.
    async fn fetch(&self, user_id: UserId) -> Result<Vec<CartItem>, CartError>;

    /// Insert a line, or overwrite its quantity if the user already has one
    /// for this product.
    async fn upsert(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<(), CartError>;

    /// Remove the user's line for a product. No-op if absent.
    async fn delete(&self, user_id: UserId, product_id: ProductId) -> Result<(), CartError>;

    /// Remove every line the user has.
    async fn delete_all(&self, user_id: UserId) -> Result<(), CartError>;
}

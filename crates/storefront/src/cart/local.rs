//! Local (guest) cart store.

use std::sync::Arc;

use emporium_core::CartLine;
use tracing::warn;

use super::CartError;
use super::storage::GuestStorage;

/// Fixed storage key for the guest cart blob.
pub const GUEST_CART_KEY: &str = "ecommerce_cart";

/// Guest cart persisted as a JSON array of [`CartLine`]s.
///
/// Holds at most one line per product. A blob that fails to decode, or
/// that lists a product twice, is treated as corrupt and read as empty.
#[derive(Clone)]
pub struct LocalCartStore {
    storage: Arc<dyn GuestStorage>,
}

impl LocalCartStore {
    /// Create a store over a key-value backend.
    #[must_use]
    pub fn new(storage: Arc<dyn GuestStorage>) -> Self {
        Self { storage }
    }

    /// Read the guest cart.
    ///
    /// Returns an empty list when nothing is stored or the stored blob is
    /// corrupt. Corruption is logged, never returned.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Storage` if the backend itself fails.
    pub async fn read(&self) -> Result<Vec<CartLine>, CartError> {
        let Some(blob) = self.storage.get(GUEST_CART_KEY).await? else {
            return Ok(Vec::new());
        };

        match decode(&blob) {
            Ok(lines) => Ok(lines),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable guest cart");
                Ok(Vec::new())
            }
        }
    }

    /// Replace the guest cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Storage` if the backend fails.
    pub async fn write(&self, lines: &[CartLine]) -> Result<(), CartError> {
        let blob = serde_json::to_string(lines)
            .map_err(|e| CartError::StorageCorrupt(format!("encode failed: {e}")))?;
        self.storage.set(GUEST_CART_KEY, blob).await?;
        Ok(())
    }

    /// Remove the guest cart entirely.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Storage` if the backend fails.
    pub async fn clear(&self) -> Result<(), CartError> {
        self.storage.remove(GUEST_CART_KEY).await?;
        Ok(())
    }
}

/// Decode a stored blob, enforcing one line per product.
fn decode(blob: &str) -> Result<Vec<CartLine>, CartError> {
    let lines: Vec<CartLine> =
        serde_json::from_str(blob).map_err(|e| CartError::StorageCorrupt(e.to_string()))?;

    if let Some(product_id) = CartLine::find_duplicate(&lines) {
        return Err(CartError::StorageCorrupt(format!(
            "product {product_id} appears on more than one line"
        )));
    }

    Ok(lines)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use emporium_core::{ProductId, Quantity};

    use super::*;
    use crate::cart::memory::MemoryGuestStorage;

    fn store() -> (LocalCartStore, Arc<MemoryGuestStorage>) {
        let storage = Arc::new(MemoryGuestStorage::new());
        (LocalCartStore::new(storage.clone()), storage)
    }

    #[tokio::test]
    async fn test_read_absent_is_empty() {
        let (local, _) = store();
        assert!(local.read().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let (local, storage) = store();
        let line = CartLine::new(ProductId::generate(), Quantity::new(3).unwrap());

        local.write(&[line]).await.unwrap();

        assert_eq!(local.read().await.unwrap(), vec![line]);
        assert!(storage.raw(GUEST_CART_KEY).unwrap().contains("\"quantity\":3"));
    }

    #[tokio::test]
    async fn test_corrupt_blob_reads_as_empty() {
        let (local, storage) = store();

        storage.put_raw(GUEST_CART_KEY, "{not json");
        assert!(local.read().await.unwrap().is_empty());

        storage.put_raw(GUEST_CART_KEY, r#"[{"product_id":"nope","quantity":1}]"#);
        assert!(local.read().await.unwrap().is_empty());

        let id = ProductId::generate();
        storage.put_raw(
            GUEST_CART_KEY,
            &format!(r#"[{{"product_id":"{id}","quantity":0}}]"#),
        );
        assert!(local.read().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_lines_are_corrupt() {
        let (local, storage) = store();
        let id = ProductId::generate();
        storage.put_raw(
            GUEST_CART_KEY,
            &format!(
                r#"[{{"product_id":"{id}","quantity":1}},{{"product_id":"{id}","quantity":2}}]"#
            ),
        );

        assert!(local.read().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_removes_key() {
        let (local, storage) = store();
        local
            .write(&[CartLine::new(ProductId::generate(), Quantity::ONE)])
            .await
            .unwrap();

        local.clear().await.unwrap();

        assert!(storage.raw(GUEST_CART_KEY).is_none());
        assert!(local.read().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_is_an_error() {
        let (local, storage) = store();
        storage.set_unavailable(true);

        let err = local.read().await.unwrap_err();
        assert!(matches!(err, CartError::Storage(_)));
    }
}

//! Cart synchronization.
//!
//! A visitor's cart lives in one of two stores:
//!
//! - **Guest cart** ([`LocalCartStore`]) - a JSON blob of [`CartLine`]s kept
//!   in the visitor's session under a fixed key, used while nobody is signed in.
//! - **User cart** ([`RemoteCartStore`]) - `cart_items` rows owned by the
//!   signed-in user, persisted in the managed database.
//!
//! [`CartSource`] names whichever store is authoritative for a request, and
//! every mutation and view computation takes it explicitly. On sign-in,
//! [`reconcile`] copies the guest cart into the user cart (the local quantity
//! overwrites the remote one) and clears the guest cart. [`CartSession`] ties
//! the pieces together for one visitor and reacts to auth transitions.
//!
//! [`CartView`] is a pure projection (items, item count, subtotal) that is
//! recomputed on every read and never stored.
//!
//! [`CartLine`]: emporium_core::CartLine

pub mod catalog;
pub mod local;
pub mod memory;
pub mod reconcile;
pub mod remote;
pub mod session;
pub mod source;
pub mod storage;
pub mod view;

pub use catalog::{ProductCatalog, ProductPage, ProductQuery, ProductSort};
pub use local::{GUEST_CART_KEY, LocalCartStore};
pub use reconcile::{AuthState, AuthTransition, ReconcileReport, reconcile};
pub use remote::RemoteCartStore;
pub use session::{CartSession, watch_auth};
pub use source::CartSource;
pub use storage::{GuestStorage, SessionGuestStorage, StorageError};
pub use view::{CartItem, CartView};

use emporium_core::ProductId;
use serde::Serialize;
use thiserror::Error;

use crate::db::RepositoryError;

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// The stored guest cart blob could not be decoded.
    ///
    /// Never surfaced to the user: reads treat a corrupt blob as empty.
    #[error("guest cart is corrupt: {0}")]
    StorageCorrupt(String),

    /// The guest cart key-value backend failed.
    #[error("guest cart storage error: {0}")]
    Storage(#[from] StorageError),

    /// The remote cart store or the product catalog could not be reached.
    #[error("cart backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The product does not exist or is no longer sold.
    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    /// Adding to a line would exceed the maximum quantity.
    #[error("quantity overflow")]
    QuantityOverflow,
}

impl CartError {
    /// Whether this error should be shown to the user as a transient failure.
    ///
    /// Cart state is left unchanged when a transient error is returned.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_) | Self::Storage(_))
    }
}

impl From<RepositoryError> for CartError {
    fn from(err: RepositoryError) -> Self {
        Self::BackendUnavailable(err.to_string())
    }
}

/// User-visible confirmation emitted by a successful mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CartNotice {
    /// An item was added to the cart.
    Added,
    /// An item was removed from the cart.
    Removed,
}

impl CartNotice {
    /// Short message suitable for a toast.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Added => "Added to cart",
            Self::Removed => "Removed from cart",
        }
    }

    /// Value for the `X-Cart-Notice` response header.
    #[must_use]
    pub const fn as_header_value(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(CartError::BackendUnavailable("down".to_string()).is_transient());
        assert!(CartError::Storage(StorageError::Unavailable("gone".to_string())).is_transient());
        assert!(!CartError::QuantityOverflow.is_transient());
        assert!(!CartError::ProductNotFound(ProductId::generate()).is_transient());
    }

    #[test]
    fn test_repository_error_maps_to_backend_unavailable() {
        let err = CartError::from(RepositoryError::NotFound);
        assert!(matches!(err, CartError::BackendUnavailable(_)));
    }

    #[test]
    fn test_notice_messages() {
        assert_eq!(CartNotice::Added.message(), "Added to cart");
        assert_eq!(CartNotice::Removed.as_header_value(), "removed");
    }
}

//! Per-visitor cart service.

use std::sync::Arc;

use emporium_core::{ProductId, ProductSnapshot, Quantity};
use tokio::sync::watch;
use tracing::{debug, info, instrument};

use super::catalog::ProductCatalog;
use super::local::LocalCartStore;
use super::reconcile::{AuthState, AuthTransition, ReconcileReport, reconcile};
use super::remote::RemoteCartStore;
use super::source::CartSource;
use super::view::CartView;
use super::{CartError, CartNotice};

/// Cart service for one visitor session.
///
/// Constructed explicitly with its collaborators and handed to whatever
/// needs it. The authoritative store is chosen from the current
/// [`AuthState`] on every call through [`CartSession::source`].
#[derive(Clone)]
pub struct CartSession {
    local: LocalCartStore,
    remote: Arc<dyn RemoteCartStore>,
    catalog: Arc<dyn ProductCatalog>,
    auth: AuthState,
}

impl CartSession {
    /// Create a cart session.
    #[must_use]
    pub fn new(
        local: LocalCartStore,
        remote: Arc<dyn RemoteCartStore>,
        catalog: Arc<dyn ProductCatalog>,
        auth: AuthState,
    ) -> Self {
        Self {
            local,
            remote,
            catalog,
            auth,
        }
    }

    /// Current auth state.
    #[must_use]
    pub const fn auth_state(&self) -> AuthState {
        self.auth
    }

    /// The authoritative store for the current auth state.
    #[must_use]
    pub fn source(&self) -> CartSource<'_> {
        match self.auth {
            AuthState::Unauthenticated => CartSource::Guest(&self.local),
            AuthState::Authenticated(user_id) => CartSource::User(self.remote.as_ref(), user_id),
        }
    }

    /// Compute the cart view from the authoritative store.
    ///
    /// # Errors
    ///
    /// Returns `CartError::BackendUnavailable` or `CartError::Storage` if the
    /// cart cannot be read. Callers must not substitute an empty cart.
    pub async fn view(&self) -> Result<CartView, CartError> {
        CartView::load(&self.source(), self.catalog.as_ref()).await
    }

    /// Add units of a known product.
    ///
    /// # Errors
    ///
    /// Returns the authoritative store's error.
    pub async fn add_item(
        &self,
        product: &ProductSnapshot,
        quantity: Quantity,
    ) -> Result<CartNotice, CartError> {
        self.source().add_item(product, quantity).await
    }

    /// Look up a product in the catalog and add units of it.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ProductNotFound` if the product does not exist or
    /// is not active, or the authoritative store's error.
    pub async fn add_product(
        &self,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<CartNotice, CartError> {
        let product = self
            .catalog
            .get(product_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or(CartError::ProductNotFound(product_id))?;

        self.add_item(&product, quantity).await
    }

    /// Remove a product's line.
    ///
    /// # Errors
    ///
    /// Returns the authoritative store's error.
    pub async fn remove_item(&self, product_id: ProductId) -> Result<CartNotice, CartError> {
        self.source().remove_item(product_id).await
    }

    /// Overwrite a line's quantity; below one removes the line.
    ///
    /// # Errors
    ///
    /// Returns the authoritative store's error.
    pub async fn update_quantity(
        &self,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<Option<CartNotice>, CartError> {
        self.source().update_quantity(product_id, quantity).await
    }

    /// Empty the authoritative cart.
    ///
    /// # Errors
    ///
    /// Returns the authoritative store's error.
    pub async fn clear(&self) -> Result<(), CartError> {
        self.source().clear().await
    }

    /// React to an auth state change reported by the auth collaborator.
    ///
    /// Signing in merges the guest cart into the user's cart and returns the
    /// report; the user cart is authoritative from then on. Signing out
    /// moves no data: reads fall back to the guest cart, which starts empty
    /// unless items were added after the last merge.
    #[instrument(skip(self), fields(previous = ?self.auth))]
    pub async fn on_auth_change(&mut self, next: AuthState) -> Option<ReconcileReport> {
        let previous = self.auth;
        self.auth = next;

        match AuthTransition::between(previous, next)? {
            AuthTransition::SignedIn(user_id) => {
                info!(%user_id, "Signed in, merging guest cart");
                Some(reconcile(&self.local, self.remote.as_ref(), user_id).await)
            }
            AuthTransition::SignedOut(user_id) => {
                info!(%user_id, "Signed out, guest cart is authoritative");
                None
            }
            AuthTransition::SwitchedUser { from, to } => {
                debug!(%from, %to, "Switched user without sign-out");
                None
            }
        }
    }
}

/// Drive a cart session from an auth state channel.
///
/// Applies the channel's current value, then every subsequent change, until
/// the sender is dropped. Returns the session so callers can keep using it.
pub async fn watch_auth(
    mut session: CartSession,
    mut events: watch::Receiver<AuthState>,
) -> CartSession {
    loop {
        let next = *events.borrow_and_update();
        session.on_auth_change(next).await;

        if events.changed().await.is_err() {
            break;
        }
    }

    session
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use emporium_core::{CartLine, Price, UserId};

    use super::*;
    use crate::cart::memory::{MemoryCatalog, MemoryGuestStorage, MemoryRemoteCart};

    struct Fixture {
        catalog: Arc<MemoryCatalog>,
        remote: Arc<MemoryRemoteCart>,
        session: CartSession,
    }

    fn fixture() -> Fixture {
        let catalog = Arc::new(MemoryCatalog::new());
        let remote = Arc::new(MemoryRemoteCart::new(catalog.clone()));
        let local = LocalCartStore::new(Arc::new(MemoryGuestStorage::new()));
        let session = CartSession::new(
            local,
            remote.clone(),
            catalog.clone(),
            AuthState::Unauthenticated,
        );
        Fixture {
            catalog,
            remote,
            session,
        }
    }

    fn product(catalog: &MemoryCatalog, cents: i64, active: bool) -> ProductSnapshot {
        let product = ProductSnapshot {
            id: ProductId::generate(),
            name: "Mug".to_string(),
            slug: "mug".to_string(),
            price: Price::from_cents(cents),
            compare_at_price: None,
            images: vec!["https://cdn.example/mug.png".to_string()],
            stock: 3,
            is_active: active,
        };
        catalog.insert(product.clone());
        product
    }

    fn qty(n: i64) -> Quantity {
        Quantity::new(n).unwrap()
    }

    #[tokio::test]
    async fn test_add_product_rejects_unknown_and_inactive() {
        let f = fixture();
        let retired = product(&f.catalog, 100, false);

        let err = f
            .session
            .add_product(ProductId::generate(), Quantity::ONE)
            .await
            .unwrap_err();
        assert!(matches!(err, CartError::ProductNotFound(_)));

        let err = f
            .session
            .add_product(retired.id, Quantity::ONE)
            .await
            .unwrap_err();
        assert!(matches!(err, CartError::ProductNotFound(_)));
    }

    #[tokio::test]
    async fn test_sign_in_merges_and_switches_source() {
        let mut f = fixture();
        let mug = product(&f.catalog, 1200, true);
        f.session.add_product(mug.id, qty(2)).await.unwrap();

        let user = UserId::generate();
        let report = f
            .session
            .on_auth_change(AuthState::Authenticated(user))
            .await
            .unwrap();

        assert_eq!(report.merged, vec![mug.id]);
        assert_eq!(f.session.source().user_id(), Some(user));
        let view = f.session.view().await.unwrap();
        assert_eq!(view.item_count, 2);
        assert_eq!(view.subtotal, Price::from_cents(2400));
    }

    #[tokio::test]
    async fn test_sign_out_reads_empty_guest_cart() {
        let mut f = fixture();
        let mug = product(&f.catalog, 1200, true);
        let user = UserId::generate();
        f.session.on_auth_change(AuthState::Authenticated(user)).await;
        f.session.add_product(mug.id, qty(1)).await.unwrap();

        let report = f.session.on_auth_change(AuthState::Unauthenticated).await;

        assert!(report.is_none());
        assert!(f.session.view().await.unwrap().is_empty());
        assert_eq!(f.remote.lines(user), vec![CartLine::new(mug.id, qty(1))]);
    }

    #[tokio::test]
    async fn test_backend_failure_surfaces_instead_of_empty() {
        let mut f = fixture();
        let mug = product(&f.catalog, 500, true);
        let user = UserId::generate();
        f.session.on_auth_change(AuthState::Authenticated(user)).await;
        f.session.add_product(mug.id, qty(1)).await.unwrap();

        f.remote.set_unavailable(true);
        let err = f.session.view().await.unwrap_err();
        assert!(err.is_transient());

        f.remote.set_unavailable(false);
        assert_eq!(f.session.view().await.unwrap().item_count, 1);
    }

    #[tokio::test]
    async fn test_watch_auth_reconciles_on_sign_in() {
        let f = fixture();
        let mug = product(&f.catalog, 800, true);
        f.session.add_product(mug.id, qty(3)).await.unwrap();

        let (tx, rx) = watch::channel(AuthState::Unauthenticated);
        let task = tokio::spawn(watch_auth(f.session.clone(), rx));

        let user = UserId::generate();
        tx.send(AuthState::Authenticated(user)).unwrap();
        drop(tx);

        let session = task.await.unwrap();
        assert_eq!(session.auth_state(), AuthState::Authenticated(user));
        assert_eq!(f.remote.lines(user), vec![CartLine::new(mug.id, qty(3))]);
    }
}

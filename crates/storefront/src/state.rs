//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;
use tower_sessions::Session;

use crate::auth::{AuthClient, AuthError};
use crate::cart::{
    AuthState, CartSession, LocalCartStore, ProductCatalog, RemoteCartStore, SessionGuestStorage,
};
use crate::config::StorefrontConfig;
use crate::db::{PgCartStore, PgCatalog, PgOrderStore};
use crate::payments::{CheckoutCompletion, OrderStore, PaymentClient, PaymentError};

/// Error building application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("auth client: {0}")]
    Auth(#[from] AuthError),
    #[error("payment client: {0}")]
    Payment(#[from] PaymentError),
}

/// Storage collaborators behind the cart and checkout flows.
#[derive(Clone)]
pub struct Stores {
    pub remote_cart: Arc<dyn RemoteCartStore>,
    pub catalog: Arc<dyn ProductCatalog>,
    pub orders: Arc<dyn OrderStore>,
}

impl Stores {
    /// Postgres-backed stores sharing one pool.
    #[must_use]
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            remote_cart: Arc::new(PgCartStore::new(pool.clone())),
            catalog: Arc::new(PgCatalog::new(pool.clone())),
            orders: Arc::new(PgOrderStore::new(pool.clone())),
        }
    }
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    auth: AuthClient,
    payments: PaymentClient,
    stores: Stores,
    completion: CheckoutCompletion,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the auth or payment client cannot be built from
    /// the configuration.
    pub fn new(config: StorefrontConfig, pool: PgPool, stores: Stores) -> Result<Self, StateError> {
        let auth = AuthClient::new(&config.auth)?;
        let payments = PaymentClient::new(&config.payment, &config.base_url)?;
        let completion = CheckoutCompletion::new(stores.orders.clone(), stores.remote_cart.clone());

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                auth,
                payments,
                stores,
                completion,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the auth provider client.
    #[must_use]
    pub fn auth(&self) -> &AuthClient {
        &self.inner.auth
    }

    /// Get a reference to the payment processor client.
    #[must_use]
    pub fn payments(&self) -> &PaymentClient {
        &self.inner.payments
    }

    /// Get a reference to the checkout completion handler.
    #[must_use]
    pub fn completion(&self) -> &CheckoutCompletion {
        &self.inner.completion
    }

    /// Get a reference to the product catalog.
    #[must_use]
    pub fn catalog(&self) -> &dyn ProductCatalog {
        self.inner.stores.catalog.as_ref()
    }

    /// Get a reference to the order store.
    #[must_use]
    pub fn orders(&self) -> &dyn OrderStore {
        self.inner.stores.orders.as_ref()
    }

    /// Build the cart service for one request.
    ///
    /// The guest cart lives in the visitor's session; `auth` selects the
    /// authoritative store.
    #[must_use]
    pub fn cart_session(&self, session: Session, auth: AuthState) -> CartSession {
        CartSession::new(
            LocalCartStore::new(Arc::new(SessionGuestStorage::new(session))),
            self.inner.stores.remote_cart.clone(),
            self.inner.stores.catalog.clone(),
            auth,
        )
    }
}

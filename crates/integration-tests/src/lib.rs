//! Integration tests for Emporium.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p emporium-integration-tests
//! ```
//!
//! No database or network is needed: the cart, catalog and order stores are
//! the in-memory collaborators from `emporium_storefront`, and the HTTP tests
//! drive the router in-process with a memory session store.
//!
//! # Test Categories
//!
//! - `cart_mutations` - add / remove / update / view properties per store
//! - `cart_reconciliation` - guest-to-user merge at sign-in
//! - `checkout_completion` - webhook verification and order recording
//! - `http_api` - routes, status codes, headers, sign-in, orders and products

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request, Response, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use emporium_core::{Price, ProductId, ProductSnapshot, Quantity, UserId};
use emporium_storefront::cart::memory::{MemoryCatalog, MemoryGuestStorage, MemoryRemoteCart};
use emporium_storefront::cart::{AuthState, CartSession, LocalCartStore};
use emporium_storefront::config::{
    AuthConfig, LogFormat, PaymentConfig, SentryConfig, StorefrontConfig,
};
use emporium_storefront::middleware::session_layer;
use emporium_storefront::payments::memory::MemoryOrderStore;
use emporium_storefront::state::{AppState, Stores};
use secrecy::SecretString;
use tower::ServiceExt;
use tower_sessions::MemoryStore;

/// Webhook signing secret used by [`test_config`].
pub const WEBHOOK_SECRET: &str = "whsec_test_9f8e7d6c5b4a39281706f5e4d3c2b1a0";

/// Quantity from a literal.
#[must_use]
pub fn qty(n: i64) -> Quantity {
    Quantity::new(n).unwrap()
}

/// An active product priced in cents, registered in `catalog`.
pub fn product(catalog: &MemoryCatalog, name: &str, cents: i64) -> ProductSnapshot {
    let product = ProductSnapshot {
        id: ProductId::generate(),
        name: name.to_string(),
        slug: name.to_lowercase().replace(' ', "-"),
        price: Price::from_cents(cents),
        compare_at_price: None,
        images: vec![format!("https://cdn.example.com/{}.jpg", name.to_lowercase())],
        stock: 10,
        is_active: true,
    };
    catalog.insert(product.clone());
    product
}

/// In-memory cart collaborators and a cart session over them.
pub struct CartFixture {
    pub catalog: Arc<MemoryCatalog>,
    pub guest: Arc<MemoryGuestStorage>,
    pub remote: Arc<MemoryRemoteCart>,
    pub session: CartSession,
}

impl CartFixture {
    /// A fresh visitor who is not signed in.
    #[must_use]
    pub fn guest() -> Self {
        Self::with_auth(AuthState::Unauthenticated)
    }

    /// A fresh visitor signed in as `user_id` (no merge runs).
    #[must_use]
    pub fn signed_in(user_id: UserId) -> Self {
        Self::with_auth(AuthState::Authenticated(user_id))
    }

    fn with_auth(auth: AuthState) -> Self {
        let catalog = Arc::new(MemoryCatalog::new());
        let guest = Arc::new(MemoryGuestStorage::new());
        let remote = Arc::new(MemoryRemoteCart::new(catalog.clone()));
        let session = CartSession::new(
            LocalCartStore::new(guest.clone()),
            remote.clone(),
            catalog.clone(),
            auth,
        );
        Self {
            catalog,
            guest,
            remote,
            session,
        }
    }

    /// An active product registered in this fixture's catalog.
    pub fn product(&self, name: &str, cents: i64) -> ProductSnapshot {
        product(&self.catalog, name, cents)
    }

    /// The guest cart's lines, read straight from storage.
    pub async fn guest_lines(&self) -> Vec<emporium_core::CartLine> {
        LocalCartStore::new(self.guest.clone()).read().await.unwrap()
    }
}

/// Configuration that needs no environment.
#[must_use]
pub fn test_config() -> StorefrontConfig {
    StorefrontConfig {
        database_url: SecretString::from("postgres://emporium@localhost/emporium_test"),
        host: "127.0.0.1".parse().unwrap(),
        port: 3000,
        base_url: "http://localhost:3000".to_string(),
        session_secret: SecretString::from("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6v"),
        auth: AuthConfig {
            url: url::Url::parse("http://127.0.0.1:9/auth/v1").unwrap(),
            anon_key: SecretString::from("anon-test-key"),
        },
        payment: PaymentConfig {
            api_url: url::Url::parse("http://127.0.0.1:9").unwrap(),
            api_key: SecretString::from("sk_test_key"),
            webhook_secret: SecretString::from(WEBHOOK_SECRET),
            currency: "usd".to_string(),
        },
        sentry: SentryConfig::default(),
        log_format: LogFormat::Pretty,
    }
}

/// The storefront router over in-memory stores.
pub struct TestApp {
    pub router: Router,
    pub catalog: Arc<MemoryCatalog>,
    pub remote: Arc<MemoryRemoteCart>,
    pub orders: Arc<MemoryOrderStore>,
}

impl TestApp {
    /// Build the app with [`test_config`]. Must run inside a Tokio runtime.
    ///
    /// The pool is lazy and never connects; no route under test touches it.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Build the app over a custom configuration.
    #[must_use]
    pub fn with_config(config: StorefrontConfig) -> Self {
        let catalog = Arc::new(MemoryCatalog::new());
        let remote = Arc::new(MemoryRemoteCart::new(catalog.clone()));
        let orders = Arc::new(MemoryOrderStore::with_catalog(catalog.clone()));
        let stores = Stores {
            remote_cart: remote.clone(),
            catalog: catalog.clone(),
            orders: orders.clone(),
        };

        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://emporium@localhost/emporium_test")
            .unwrap();
        let sessions = session_layer(MemoryStore::default(), false, &config.session_secret);
        let state = AppState::new(config, pool, stores).unwrap();

        let router = emporium_storefront::routes::routes()
            .layer(sessions)
            .with_state(state);

        Self {
            router,
            catalog,
            remote,
            orders,
        }
    }

    /// Send a request and return the response.
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

/// Access token the stand-in auth provider accepts.
pub const VALID_ACCESS_TOKEN: &str = "access-token-valid";

/// Start a stand-in auth provider on a random local port.
///
/// `GET /auth/v1/user` answers with `user_id` for [`VALID_ACCESS_TOKEN`] and
/// 401 for any other bearer token. Returns the base URL for `AuthConfig`.
pub async fn spawn_auth_provider(user_id: UserId) -> url::Url {
    let app = Router::new().route(
        "/auth/v1/user",
        get(move |headers: HeaderMap| async move {
            let expected = format!("Bearer {VALID_ACCESS_TOKEN}");
            let bearer = headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok());
            if bearer == Some(expected.as_str()) {
                Json(serde_json::json!({
                    "id": user_id,
                    "email": "shopper@example.com",
                    "aud": "authenticated",
                }))
                .into_response()
            } else {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(serde_json::json!({ "msg": "invalid JWT" })),
                )
                    .into_response()
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    url::Url::parse(&format!("http://{addr}/auth/v1")).unwrap()
}

/// A JSON request, optionally carrying a session cookie.
#[must_use]
pub fn json_request(
    method: &str,
    uri: &str,
    body: &serde_json::Value,
    cookie: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// A GET request, optionally carrying a session cookie.
#[must_use]
pub fn get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

/// The `name=value` part of the response's session cookie, if it set one.
#[must_use]
pub fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(String::from)
}

/// Status and JSON body of a response.
pub async fn json_body(response: Response<Body>) -> (StatusCode, serde_json::Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// A `checkout.session.completed` event body as the processor sends it.
#[must_use]
pub fn checkout_completed_event(
    session_id: &str,
    user_id: UserId,
    items: &[emporium_storefront::db::NewOrderItem],
) -> Vec<u8> {
    serde_json::json!({
        "id": "evt_test",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": session_id,
                "payment_intent": "pi_test",
                "metadata": {
                    "user_id": user_id.to_string(),
                    "items": serde_json::to_string(items).unwrap(),
                },
            }
        }
    })
    .to_string()
    .into_bytes()
}

/// A signed webhook request for `payload`, timestamped now.
#[must_use]
pub fn signed_webhook_request(payload: Vec<u8>) -> Request<Body> {
    let header = emporium_storefront::payments::webhook::signature_header(
        &payload,
        WEBHOOK_SECRET,
        chrono::Utc::now().timestamp(),
    )
    .unwrap();

    Request::builder()
        .method("POST")
        .uri("/webhooks/payment")
        .header(header::CONTENT_TYPE, "application/json")
        .header(emporium_storefront::payments::webhook::SIGNATURE_HEADER, header)
        .body(Body::from(payload))
        .unwrap()
}

//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness check
//! GET  /health/ready           - Readiness check (database)
//!
//! # Catalog
//! GET  /products               - Active products (page, limit, search, sort)
//!
//! # Cart (guest or signed-in, JSON)
//! GET  /cart                   - Cart view
//! GET  /cart/count             - Cart badge count
//! POST /cart/add               - Add units of a product
//! POST /cart/update            - Overwrite a line's quantity
//! POST /cart/remove            - Remove a line
//! POST /cart/clear             - Empty the cart
//!
//! # Auth
//! POST /auth/session           - Sign in with a provider access token
//! POST /auth/logout            - Sign out
//! GET  /auth/me                - Signed-in user, if any
//!
//! # Checkout and orders (requires auth)
//! POST /checkout               - Create a hosted checkout session
//! GET  /orders                 - Order history
//!
//! # Webhooks
//! POST /webhooks/payment       - Payment processor events
//! ```

pub mod auth;
pub mod cart;
pub mod checkout;
pub mod health;
pub mod orders;
pub mod products;
pub mod webhooks;

use axum::{
    Router,
    routing::{get, post},
};

use crate::middleware::{RateLimitError, api_rate_limiter, auth_rate_limiter};
use crate::state::AppState;

/// Create the health check router.
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
}

/// Create the product listing router.
pub fn product_routes() -> Router<AppState> {
    Router::new().route("/products", get(products::index))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/count", get(cart::count))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
        .route("/clear", post(cart::clear))
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/session", post(auth::sign_in))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
}

/// Create the checkout and order history router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(checkout::create))
        .route("/orders", get(orders::index))
}

/// Create the webhook router.
pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/webhooks/payment", post(webhooks::payment))
}

/// Create all routes for the storefront, without rate limits.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(health_routes())
        .merge(product_routes())
        .nest("/cart", cart_routes())
        .nest("/auth", auth_routes())
        .merge(checkout_routes())
        .merge(webhook_routes())
}

/// Create all routes with per-IP rate limits on products, cart, auth and
/// checkout.
///
/// Health checks and webhooks are not limited. The limiter needs a client
/// IP, so serve with connect info or behind a proxy that sets one.
///
/// # Errors
///
/// Returns `RateLimitError` if a limiter cannot be configured.
pub fn rate_limited_routes() -> Result<Router<AppState>, RateLimitError> {
    let api = api_rate_limiter()?;
    let strict = auth_rate_limiter()?;

    Ok(Router::new()
        .merge(health_routes())
        .merge(product_routes().layer(api.clone()))
        .nest("/cart", cart_routes().layer(api))
        .nest("/auth", auth_routes().layer(strict.clone()))
        .merge(checkout_routes().layer(strict))
        .merge(webhook_routes()))
}

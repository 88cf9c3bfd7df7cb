//! Session middleware configuration.
//!
//! Sessions are stored in `PostgreSQL` via tower-sessions. Besides the
//! signed-in user, the session holds the guest cart, so it outlives a
//! browser restart (expiry is on inactivity).

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha512};
use sqlx::PgPool;
use tower_sessions::cookie::Key;
use tower_sessions::service::SignedCookie;
use tower_sessions::{Expiry, SessionManagerLayer, SessionStore};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::StorefrontConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "emporium_session";

/// Session expiry time in seconds (30 days, so guest carts survive).
const SESSION_EXPIRY_SECONDS: i64 = 30 * 24 * 60 * 60;

/// Create the session layer with `PostgreSQL` store.
///
/// The session table must exist; `emporium migrate` creates it.
#[must_use]
pub fn create_session_layer(
    pool: &PgPool,
    config: &StorefrontConfig,
) -> SessionManagerLayer<PostgresStore, SignedCookie> {
    session_layer(
        PostgresStore::new(pool.clone()),
        config.is_secure(),
        &config.session_secret,
    )
}

/// Cookie signing key derived from the session secret.
///
/// The secret is stretched to the 64 bytes the cookie key requires.
#[must_use]
pub fn signing_key(secret: &SecretString) -> Key {
    let digest = Sha512::digest(secret.expose_secret().as_bytes());
    Key::from(digest.as_slice())
}

/// Apply the storefront cookie settings to any session store.
///
/// Session cookies are signed with a key derived from `secret`.
#[must_use]
pub fn session_layer<S: SessionStore + Clone>(
    store: S,
    secure: bool,
    secret: &SecretString,
) -> SessionManagerLayer<S, SignedCookie> {
    SessionManagerLayer::new(store)
        .with_signed(signing_key(secret))
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(secure)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}

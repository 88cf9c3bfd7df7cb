//! Authentication route handlers.
//!
//! The auth provider issues access tokens to the client. `POST /auth/session`
//! exchanges one for a server session, which is where the guest cart gets
//! merged into the user's cart.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::{info, instrument, warn};

use crate::cart::{AuthState, CartView, ReconcileReport};
use crate::error::{Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{OptionalAuth, clear_current_user, set_current_user};
use crate::models::CurrentUser;
use crate::state::AppState;

/// Sign-in request body.
#[derive(Deserialize)]
pub struct SignInRequest {
    pub access_token: String,
}

/// Sign-in response.
#[derive(Debug, Serialize)]
pub struct SignInResponse {
    pub user: CurrentUser,
    /// The user's cart after the guest cart was merged into it.
    pub cart: CartView,
    /// What the merge did. `None` when the visitor was already signed in.
    pub reconciliation: Option<ReconcileReport>,
    /// Message for the user if some guest lines could not be merged.
    pub warning: Option<String>,
}

/// Exchange an auth provider access token for a signed-in session.
#[instrument(skip(state, session, auth, body))]
pub async fn sign_in(
    State(state): State<AppState>,
    session: Session,
    auth: OptionalAuth,
    body: std::result::Result<Json<SignInRequest>, JsonRejection>,
) -> Result<Json<SignInResponse>> {
    let Json(body) = body?;
    let token = SecretString::from(body.access_token);
    let user = CurrentUser::from(state.auth().get_user(&token).await?);

    // The guest cart must be read from the pre-sign-in state before the
    // session is marked as signed in.
    let mut cart = state.cart_session(session.clone(), auth.auth_state());

    set_current_user(&session, &user).await?;
    set_sentry_user(&user.id, user.email.as_deref());

    let reconciliation = cart.on_auth_change(AuthState::Authenticated(user.id)).await;
    let warning = reconciliation.as_ref().and_then(ReconcileReport::warning);
    if let Some(report) = reconciliation.as_ref().filter(|r| r.has_failures()) {
        warn!(user_id = %user.id, failed = report.failed.len(), "Guest cart partially merged");
    }

    let view = cart.view().await?;
    info!(user_id = %user.id, items = view.item_count, "User signed in");

    Ok(Json(SignInResponse {
        user,
        cart: view,
        reconciliation,
        warning,
    }))
}

/// Sign out.
///
/// The user's cart stays in the database. The session falls back to the
/// guest cart, which the merge at sign-in left empty.
#[instrument(skip(state, session, auth))]
pub async fn logout(
    State(state): State<AppState>,
    session: Session,
    auth: OptionalAuth,
) -> Result<StatusCode> {
    let mut cart = state.cart_session(session.clone(), auth.auth_state());

    clear_current_user(&session).await?;
    clear_sentry_user();
    cart.on_auth_change(AuthState::Unauthenticated).await;

    Ok(StatusCode::NO_CONTENT)
}

/// Who is signed in.
pub async fn me(auth: OptionalAuth) -> Json<Option<CurrentUser>> {
    Json(auth.0)
}

//! Checkout route handler.

use axum::{Json, extract::State};
use serde::Serialize;
use tower_sessions::Session;
use tracing::{info, instrument};

use crate::cart::AuthState;
use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::state::AppState;

/// Hosted checkout page to redirect the browser to.
#[derive(Debug, Serialize)]
pub struct CheckoutRedirect {
    pub url: String,
}

/// Start a hosted checkout for the signed-in user's cart.
///
/// Guests must sign in first; their cart is merged at sign-in, so the user
/// cart is the only one a checkout is ever built from.
#[instrument(skip(state, session, user), fields(user_id = %user.id))]
pub async fn create(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
) -> Result<Json<CheckoutRedirect>> {
    let cart = state.cart_session(session, AuthState::Authenticated(user.id));
    let view = cart.view().await?;

    let url = state.payments().create_checkout_session(&view, &user).await?;
    info!(items = view.item_count, subtotal = %view.subtotal, "Checkout session created");

    Ok(Json(CheckoutRedirect { url }))
}

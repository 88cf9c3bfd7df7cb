//! Order history.

use axum::{Json, extract::State};
use tracing::instrument;

use crate::db::OrderSummary;
use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::state::AppState;

/// The signed-in user's orders, newest first.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<OrderSummary>>> {
    Ok(Json(state.orders().list_for_user(user.id).await?))
}

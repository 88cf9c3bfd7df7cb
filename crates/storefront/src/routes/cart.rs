//! Cart route handlers.
//!
//! Every handler builds a [`CartSession`](crate::cart::CartSession) for the
//! request and answers with the recomputed cart view. Mutations that
//! produce a notice carry it in the `X-Cart-Notice` header so the client
//! can show a toast.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderName, HeaderValue},
    response::{IntoResponse, Response},
};
use emporium_core::{ProductId, Quantity};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::{Span, instrument};

use crate::cart::{CartNotice, CartView};
use crate::error::Result;
use crate::middleware::OptionalAuth;
use crate::state::AppState;

/// Response header carrying the mutation notice.
pub const CART_NOTICE_HEADER: HeaderName = HeaderName::from_static("x-cart-notice");

/// Add to cart request body.
#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub product_id: ProductId,
    #[serde(default = "default_quantity")]
    pub quantity: Quantity,
}

const fn default_quantity() -> Quantity {
    Quantity::ONE
}

/// Update quantity request body.
///
/// `quantity` is signed: anything below one removes the line.
#[derive(Debug, Deserialize)]
pub struct UpdateCartRequest {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Remove from cart request body.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartRequest {
    pub product_id: ProductId,
}

/// Cart badge count.
#[derive(Debug, Serialize)]
pub struct CartCount {
    pub item_count: u64,
}

/// Cart view plus the notice header, if any.
fn with_notice(view: CartView, notice: Option<CartNotice>) -> Response {
    let mut response = Json(view).into_response();
    if let Some(notice) = notice {
        response.headers_mut().insert(
            CART_NOTICE_HEADER,
            HeaderValue::from_static(notice.as_header_value()),
        );
    }
    response
}

/// Show the current cart.
#[instrument(skip(state, session, auth))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    auth: OptionalAuth,
) -> Result<Json<CartView>> {
    let cart = state.cart_session(session, auth.auth_state());
    Ok(Json(cart.view().await?))
}

/// Cart badge count.
#[instrument(skip(state, session, auth))]
pub async fn count(
    State(state): State<AppState>,
    session: Session,
    auth: OptionalAuth,
) -> Result<Json<CartCount>> {
    let cart = state.cart_session(session, auth.auth_state());
    let view = cart.view().await?;
    Ok(Json(CartCount {
        item_count: view.item_count,
    }))
}

/// Add units of a product.
#[instrument(skip_all, fields(product_id = tracing::field::Empty))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    auth: OptionalAuth,
    body: std::result::Result<Json<AddToCartRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(form) = body?;
    Span::current().record("product_id", tracing::field::display(form.product_id));
    let cart = state.cart_session(session, auth.auth_state());
    let notice = cart.add_product(form.product_id, form.quantity).await?;
    let view = cart.view().await?;
    Ok(with_notice(view, Some(notice)))
}

/// Overwrite the quantity of a line.
#[instrument(skip_all, fields(product_id = tracing::field::Empty))]
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    auth: OptionalAuth,
    body: std::result::Result<Json<UpdateCartRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(form) = body?;
    Span::current().record("product_id", tracing::field::display(form.product_id));
    let cart = state.cart_session(session, auth.auth_state());
    let notice = cart.update_quantity(form.product_id, form.quantity).await?;
    let view = cart.view().await?;
    Ok(with_notice(view, notice))
}

/// Remove a product's line.
#[instrument(skip_all, fields(product_id = tracing::field::Empty))]
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    auth: OptionalAuth,
    body: std::result::Result<Json<RemoveFromCartRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(form) = body?;
    Span::current().record("product_id", tracing::field::display(form.product_id));
    let cart = state.cart_session(session, auth.auth_state());
    let notice = cart.remove_item(form.product_id).await?;
    let view = cart.view().await?;
    Ok(with_notice(view, Some(notice)))
}

/// Empty the cart.
#[instrument(skip(state, session, auth))]
pub async fn clear(
    State(state): State<AppState>,
    session: Session,
    auth: OptionalAuth,
) -> Result<Json<CartView>> {
    let cart = state.cart_session(session, auth.auth_state());
    cart.clear().await?;
    Ok(Json(cart.view().await?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_add_request_defaults_to_one() {
        let id = ProductId::generate();
        let form: AddToCartRequest =
            serde_json::from_value(serde_json::json!({ "product_id": id })).unwrap();
        assert_eq!(form.quantity, Quantity::ONE);
    }

    #[test]
    fn test_add_request_rejects_zero() {
        let id = ProductId::generate();
        let result: std::result::Result<AddToCartRequest, _> =
            serde_json::from_value(serde_json::json!({ "product_id": id, "quantity": 0 }));
        assert!(result.is_err());
    }

    #[test]
    fn test_update_request_accepts_negative() {
        let id = ProductId::generate();
        let form: UpdateCartRequest =
            serde_json::from_value(serde_json::json!({ "product_id": id, "quantity": -1 }))
                .unwrap();
        assert_eq!(form.quantity, -1);
    }

    #[test]
    fn test_notice_header() {
        let response = with_notice(CartView::empty(), Some(CartNotice::Added));
        assert_eq!(response.headers()[CART_NOTICE_HEADER], "added");

        let response = with_notice(CartView::empty(), None);
        assert!(response.headers().get(CART_NOTICE_HEADER).is_none());
    }
}

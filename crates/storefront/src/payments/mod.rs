//! Payment processor collaborator.
//!
//! Checkout is hosted by the payment processor. The storefront creates a
//! checkout session from the user's cart, redirects the browser to it, and
//! records the order when the processor reports the session as completed
//! through a signed webhook.
//!
//! # Modules
//!
//! - `webhook` - Signature verification and event parsing
//! - `completion` - Order recording on checkout completion
//! - `memory` - In-memory order store for tests

pub mod completion;
pub mod memory;
pub mod webhook;

use emporium_core::ProductId;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

use crate::cart::CartView;
use crate::config::PaymentConfig;
use crate::db::{NewOrderItem, RepositoryError};
use crate::models::CurrentUser;

pub use completion::{CheckoutCompletion, CompletionOutcome, OrderStore};
pub use webhook::{CompletedCheckout, WebhookEvent, verify_signature};

/// Errors that can occur when talking to the payment processor or
/// handling its webhooks.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Checkout was requested for an empty cart.
    #[error("cart is empty")]
    EmptyCart,

    /// A cart item's price cannot be expressed in minor units.
    #[error("price out of range for product {0}")]
    PriceOutOfRange(ProductId),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse a response or event.
    #[error("parse error: {0}")]
    Parse(String),

    /// Webhook signature header missing, malformed, stale or wrong.
    #[error("invalid webhook signature: {0}")]
    InvalidSignature(String),

    /// A completed checkout lacks the metadata needed to record the order.
    #[error("missing checkout metadata: {0}")]
    MissingMetadata(&'static str),

    /// The order could not be recorded.
    #[error("failed to record order: {0}")]
    Order(#[from] RepositoryError),
}

/// Hosted checkout session as returned by the processor.
#[derive(Debug, Deserialize)]
struct CheckoutSessionResponse {
    id: String,
    url: Option<String>,
}

/// Payment processor API client.
#[derive(Clone)]
pub struct PaymentClient {
    client: reqwest::Client,
    sessions_url: String,
    base_url: String,
    currency: String,
}

impl PaymentClient {
    /// Create a new payment processor client.
    ///
    /// `base_url` is the storefront's public URL, used for the success and
    /// cancel redirects.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &PaymentConfig, base_url: &str) -> Result<Self, PaymentError> {
        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", config.api_key.expose_secret());
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&auth_value)
                .map_err(|e| PaymentError::Parse(format!("invalid API key format: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            sessions_url: format!(
                "{}/v1/checkout/sessions",
                config.api_url.as_str().trim_end_matches('/')
            ),
            base_url: base_url.trim_end_matches('/').to_string(),
            currency: config.currency.clone(),
        })
    }

    /// Create a hosted checkout session for the user's cart and return the
    /// URL to redirect the browser to.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::EmptyCart` without calling the processor if the
    /// cart has no items, or an HTTP/API/parse error from the processor.
    #[instrument(skip(self, cart, user), fields(user_id = %user.id, items = cart.items.len()))]
    pub async fn create_checkout_session(
        &self,
        cart: &CartView,
        user: &CurrentUser,
    ) -> Result<String, PaymentError> {
        let form = checkout_form(cart, user, &self.base_url, &self.currency)?;

        let response = self
            .client
            .post(&self.sessions_url)
            .form(&form)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let session: CheckoutSessionResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::Parse(e.to_string()))?;

        tracing::info!(session_id = %session.id, "Checkout session created");

        session
            .url
            .ok_or_else(|| PaymentError::Parse("checkout session has no url".to_string()))
    }
}

/// Build the form-encoded checkout session request.
///
/// `metadata[items]` carries the priced lines so the order can be recorded
/// from the webhook alone, without trusting the cart at completion time.
fn checkout_form(
    cart: &CartView,
    user: &CurrentUser,
    base_url: &str,
    currency: &str,
) -> Result<Vec<(String, String)>, PaymentError> {
    if cart.is_empty() {
        return Err(PaymentError::EmptyCart);
    }

    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("payment_method_types[0]".to_string(), "card".to_string()),
        (
            "success_url".to_string(),
            format!("{base_url}/checkout/success?session_id={{CHECKOUT_SESSION_ID}}"),
        ),
        ("cancel_url".to_string(), format!("{base_url}/cart")),
        ("metadata[user_id]".to_string(), user.id.to_string()),
    ];

    if let Some(email) = &user.email {
        form.push(("customer_email".to_string(), email.clone()));
    }

    let mut metadata_items = Vec::with_capacity(cart.items.len());
    for (i, item) in cart.items.iter().enumerate() {
        let product = &item.product;
        let unit_amount = product
            .price
            .to_cents()
            .ok_or(PaymentError::PriceOutOfRange(product.id))?;
        let prefix = format!("line_items[{i}]");

        form.push((format!("{prefix}[price_data][currency]"), currency.to_string()));
        form.push((
            format!("{prefix}[price_data][product_data][name]"),
            product.name.clone(),
        ));
        if let Some(image) = product.primary_image() {
            form.push((
                format!("{prefix}[price_data][product_data][images][0]"),
                image.to_string(),
            ));
        }
        form.push((
            format!("{prefix}[price_data][unit_amount]"),
            unit_amount.to_string(),
        ));
        form.push((format!("{prefix}[quantity]"), item.line.quantity.to_string()));

        metadata_items.push(NewOrderItem {
            product_id: product.id,
            quantity: item.line.quantity,
            price: product.price,
        });
    }

    let items_json =
        serde_json::to_string(&metadata_items).map_err(|e| PaymentError::Parse(e.to_string()))?;
    form.push(("metadata[items]".to_string(), items_json));

    Ok(form)
}

//! Payment processor webhook.
//!
//! The processor signs the raw body, so the handler takes `Bytes` and only
//! parses after the signature checks out.

use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::error::{AppError, Result};
use crate::payments::webhook::{SIGNATURE_HEADER, SIGNATURE_TOLERANCE};
use crate::payments::{CompletionOutcome, PaymentError, WebhookEvent, verify_signature};
use crate::state::AppState;

/// Acknowledgement returned to the processor.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<CompletionOutcome>,
}

/// Receive a payment processor event.
///
/// Bad signatures and malformed events are rejected with `400` so the
/// processor does not retry them. A failure to record the order is a `500`,
/// which makes the processor deliver the event again.
#[instrument(skip_all)]
pub async fn payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("missing signature".to_string()))?;

    verify_signature(
        &body,
        signature,
        &state.config().payment.webhook_secret,
        chrono::Utc::now().timestamp(),
        SIGNATURE_TOLERANCE,
    )
    .inspect_err(|e| warn!(error = %e, "Rejected webhook signature"))?;

    let event = WebhookEvent::parse(&body).map_err(|e| match e {
        PaymentError::Parse(message) => AppError::BadRequest(message),
        other => other.into(),
    })?;

    let outcome = match event {
        WebhookEvent::CheckoutCompleted(checkout) => {
            Some(state.completion().complete(&checkout).await?)
        }
        WebhookEvent::Ignored(event_type) => {
            debug!(%event_type, "Ignoring webhook event");
            None
        }
    };

    Ok(Json(WebhookAck {
        received: true,
        outcome,
    }))
}

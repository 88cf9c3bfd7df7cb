//! Payment processor webhooks.
//!
//! The processor signs every delivery with a `t=<unix>,v1=<hex>` header,
//! where `v1` is HMAC-SHA256 of `"{t}.{payload}"` keyed by the webhook
//! secret. Only `checkout.session.completed` is acted on; every other event
//! type is acknowledged and dropped.

use std::collections::HashMap;
use std::time::Duration;

use emporium_core::{Price, UserId};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

use super::PaymentError;
use crate::db::NewOrderItem;

type HmacSha256 = Hmac<Sha256>;

/// Signature header sent with every webhook delivery.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Maximum age of a delivery before it is treated as a replay.
pub const SIGNATURE_TOLERANCE: Duration = Duration::from_secs(300);

/// Event type that records an order.
const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

/// Verify a webhook signature header against the raw request body.
///
/// `now` is the current unix time in seconds. Any of several `v1` entries
/// may match (the processor sends more than one while a secret is rolled).
///
/// # Errors
///
/// Returns `PaymentError::InvalidSignature` if the header is malformed, the
/// timestamp is outside `tolerance`, or no signature matches.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &SecretString,
    now: i64,
    tolerance: Duration,
) -> Result<(), PaymentError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| PaymentError::InvalidSignature("missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(PaymentError::InvalidSignature(
            "no v1 signature".to_string(),
        ));
    }

    if now.abs_diff(timestamp) > tolerance.as_secs() {
        return Err(PaymentError::InvalidSignature(
            "timestamp outside tolerance".to_string(),
        ));
    }

    let mac = signed_payload_mac(payload, secret.expose_secret(), timestamp)?;

    let matched = signatures.iter().any(|candidate| {
        hex::decode(candidate).is_ok_and(|bytes| mac.clone().verify_slice(&bytes).is_ok())
    });

    if !matched {
        return Err(PaymentError::InvalidSignature(
            "signature mismatch".to_string(),
        ));
    }

    debug!("Webhook signature verified");
    Ok(())
}

/// Build the signature header the processor would send for `payload`.
///
/// # Errors
///
/// Returns `PaymentError::InvalidSignature` if the secret cannot key an HMAC.
pub fn signature_header(
    payload: &[u8],
    secret: &str,
    timestamp: i64,
) -> Result<String, PaymentError> {
    let mac = signed_payload_mac(payload, secret, timestamp)?;
    Ok(format!(
        "t={timestamp},v1={}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

fn signed_payload_mac(
    payload: &[u8],
    secret: &str,
    timestamp: i64,
) -> Result<HmacSha256, PaymentError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::InvalidSignature(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

// =============================================================================
// Events
// =============================================================================

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawCheckoutSession {
    id: String,
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    shipping_details: Option<serde_json::Value>,
}

/// A completed hosted checkout, with the metadata written at creation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedCheckout {
    /// Processor checkout session ID.
    pub session_id: String,
    /// Processor payment intent ID.
    pub payment_intent_id: Option<String>,
    /// User who checked out.
    pub user_id: UserId,
    /// Lines priced at checkout time.
    pub items: Vec<NewOrderItem>,
    /// Shipping details collected by the processor, stored verbatim.
    pub shipping_address: Option<serde_json::Value>,
}

impl CompletedCheckout {
    /// Sum of `price * quantity` over the items.
    #[must_use]
    pub fn total(&self) -> Price {
        self.items.iter().map(NewOrderItem::line_total).sum()
    }
}

/// A verified webhook event.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    /// `checkout.session.completed`.
    CheckoutCompleted(CompletedCheckout),
    /// Any other event type; acknowledged without action.
    Ignored(String),
}

impl WebhookEvent {
    /// Parse a webhook body. Call only after [`verify_signature`] succeeds.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Parse` if the body or its metadata is not
    /// valid, or `PaymentError::MissingMetadata` if a completed checkout
    /// lacks `user_id` or `items`.
    pub fn parse(payload: &[u8]) -> Result<Self, PaymentError> {
        let event: RawEvent =
            serde_json::from_slice(payload).map_err(|e| PaymentError::Parse(e.to_string()))?;

        if event.event_type != CHECKOUT_COMPLETED {
            return Ok(Self::Ignored(event.event_type));
        }

        let session: RawCheckoutSession = serde_json::from_value(event.data.object)
            .map_err(|e| PaymentError::Parse(e.to_string()))?;

        let user_id = session
            .metadata
            .get("user_id")
            .ok_or(PaymentError::MissingMetadata("user_id"))?
            .parse::<UserId>()
            .map_err(|e| PaymentError::Parse(format!("invalid user_id metadata: {e}")))?;

        let items: Vec<NewOrderItem> = serde_json::from_str(
            session
                .metadata
                .get("items")
                .ok_or(PaymentError::MissingMetadata("items"))?,
        )
        .map_err(|e| PaymentError::Parse(format!("invalid items metadata: {e}")))?;

        Ok(Self::CheckoutCompleted(CompletedCheckout {
            session_id: session.id,
            payment_intent_id: session.payment_intent,
            user_id,
            items,
            shipping_address: session.shipping_details,
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use emporium_core::ProductId;

    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_760_000_000;

    fn secret() -> SecretString {
        SecretString::from(SECRET.to_string())
    }

    #[test]
    fn test_valid_signature() {
        let payload = br#"{"type":"ping"}"#;
        let header = signature_header(payload, SECRET, NOW).unwrap();

        assert!(verify_signature(payload, &header, &secret(), NOW, SIGNATURE_TOLERANCE).is_ok());
    }

    #[test]
    fn test_any_v1_may_match() {
        let payload = br#"{"type":"ping"}"#;
        let good = signature_header(payload, SECRET, NOW).unwrap();
        let v1 = good.split_once(",v1=").unwrap().1;
        let header = format!("t={NOW},v1=deadbeef,v1={v1}");

        assert!(verify_signature(payload, &header, &secret(), NOW, SIGNATURE_TOLERANCE).is_ok());
    }

    #[test]
    fn test_tampered_payload() {
        let header = signature_header(br#"{"amount":1}"#, SECRET, NOW).unwrap();

        let result = verify_signature(
            br#"{"amount":9}"#,
            &header,
            &secret(),
            NOW,
            SIGNATURE_TOLERANCE,
        );
        assert!(matches!(result, Err(PaymentError::InvalidSignature(_))));
    }

    #[test]
    fn test_wrong_secret() {
        let payload = b"{}";
        let header = signature_header(payload, "whsec_other", NOW).unwrap();

        let result = verify_signature(payload, &header, &secret(), NOW, SIGNATURE_TOLERANCE);
        assert!(matches!(result, Err(PaymentError::InvalidSignature(_))));
    }

    #[test]
    fn test_stale_timestamp() {
        let payload = b"{}";
        let header = signature_header(payload, SECRET, NOW - 301).unwrap();

        let result = verify_signature(payload, &header, &secret(), NOW, SIGNATURE_TOLERANCE);
        assert!(matches!(result, Err(PaymentError::InvalidSignature(_))));

        let header = signature_header(payload, SECRET, NOW - 300).unwrap();
        assert!(verify_signature(payload, &header, &secret(), NOW, SIGNATURE_TOLERANCE).is_ok());
    }

    #[test]
    fn test_malformed_headers() {
        let no_signature = format!("t={NOW}");
        for header in ["", "v1=abc", "t=abc,v1=abc", no_signature.as_str()] {
            let result = verify_signature(b"{}", header, &secret(), NOW, SIGNATURE_TOLERANCE);
            assert!(
                matches!(result, Err(PaymentError::InvalidSignature(_))),
                "header {header:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_ignored_event() {
        let event = WebhookEvent::parse(br#"{"type":"charge.refunded","data":{"object":{}}}"#)
            .unwrap();
        assert_eq!(event, WebhookEvent::Ignored("charge.refunded".to_string()));
    }

    #[test]
    fn test_parse_completed_checkout() {
        let user = UserId::generate();
        let product = ProductId::generate();
        let body = serde_json::json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {"object": {
                "id": "cs_test_1",
                "payment_intent": "pi_1",
                "metadata": {
                    "user_id": user.to_string(),
                    "items": format!(r#"[{{"product_id":"{product}","price":12.5,"quantity":2}}]"#),
                }
            }}
        });

        let WebhookEvent::CheckoutCompleted(checkout) =
            WebhookEvent::parse(body.to_string().as_bytes()).unwrap()
        else {
            panic!("expected a completed checkout");
        };

        assert_eq!(checkout.session_id, "cs_test_1");
        assert_eq!(checkout.payment_intent_id.as_deref(), Some("pi_1"));
        assert_eq!(checkout.user_id, user);
        assert_eq!(checkout.items.len(), 1);
        assert_eq!(checkout.total(), Price::from_cents(2500));
    }

    #[test]
    fn test_parse_missing_metadata() {
        let body = serde_json::json!({
            "type": "checkout.session.completed",
            "data": {"object": {"id": "cs_test_2", "metadata": {"user_id": UserId::generate().to_string()}}}
        });

        let result = WebhookEvent::parse(body.to_string().as_bytes());
        assert!(matches!(result, Err(PaymentError::MissingMetadata("items"))));
    }
}

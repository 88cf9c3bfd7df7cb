//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server faults to Sentry
//! before responding to the client. All route handlers return
//! `Result<T, AppError>`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::auth::AuthError;
use crate::cart::CartError;
use crate::db::RepositoryError;
use crate::payments::PaymentError;

/// Message shown when the cart cannot be read or written.
pub const CART_UNAVAILABLE_MESSAGE: &str = "Cart is temporarily unavailable, please try again";

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Cart operation failed.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Auth provider operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Payment processor operation failed.
    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    /// Session store operation failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Cart(err) => match err {
                CartError::BackendUnavailable(_) | CartError::Storage(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                CartError::ProductNotFound(_) => StatusCode::NOT_FOUND,
                CartError::QuantityOverflow => StatusCode::BAD_REQUEST,
                CartError::StorageCorrupt(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Auth(err) => match err {
                AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
                AuthError::Http(_) | AuthError::Api { .. } | AuthError::Parse(_) => {
                    StatusCode::BAD_GATEWAY
                }
            },
            Self::Payment(err) => match err {
                PaymentError::EmptyCart
                | PaymentError::InvalidSignature(_)
                | PaymentError::MissingMetadata(_) => StatusCode::BAD_REQUEST,
                PaymentError::Http(_) | PaymentError::Api { .. } | PaymentError::Parse(_) => {
                    StatusCode::BAD_GATEWAY
                }
                PaymentError::PriceOutOfRange(_) | PaymentError::Order(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Database(_) | Self::Session(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Client-facing message. Never exposes internal detail for server faults.
    fn public_message(&self) -> String {
        match self {
            Self::Cart(err) => match err {
                CartError::BackendUnavailable(_) | CartError::Storage(_) => {
                    CART_UNAVAILABLE_MESSAGE.to_string()
                }
                CartError::ProductNotFound(_) => "Product not found".to_string(),
                CartError::QuantityOverflow => "Quantity is too large".to_string(),
                CartError::StorageCorrupt(_) => "Internal server error".to_string(),
            },
            Self::Auth(AuthError::InvalidToken) => "Invalid or expired session".to_string(),
            Self::Auth(_) => "Authentication service unavailable".to_string(),
            Self::Payment(err) => match err {
                PaymentError::EmptyCart => "Your cart is empty".to_string(),
                PaymentError::InvalidSignature(_) => "Invalid signature".to_string(),
                PaymentError::MissingMetadata(_) => "Missing metadata".to_string(),
                PaymentError::Http(_) | PaymentError::Api { .. } | PaymentError::Parse(_) => {
                    "Payment service unavailable".to_string()
                }
                PaymentError::PriceOutOfRange(_) | PaymentError::Order(_) => {
                    "Internal server error".to_string()
                }
            },
            Self::Database(_) | Self::Session(_) | Self::Internal(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<axum::extract::rejection::QueryRejection> for AppError {
    fn from(rejection: axum::extract::rejection::QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

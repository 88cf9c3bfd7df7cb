//! Auth provider error types.

use thiserror::Error;

/// Errors that can occur while verifying a session with the auth provider.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The provider rejected the access token (expired, revoked or forged).
    #[error("invalid or expired access token")]
    InvalidToken,

    /// HTTP request to the provider failed.
    #[error("auth provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with an unexpected status.
    #[error("auth provider error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The provider's response could not be understood.
    #[error("could not parse auth provider response: {0}")]
    Parse(String),
}

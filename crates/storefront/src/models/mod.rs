//! Domain models for storefront request handling.

pub mod session;

pub use session::{CurrentUser, keys as session_keys};

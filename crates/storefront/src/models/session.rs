//! Session-stored identity.

use serde::{Deserialize, Serialize};

use emporium_core::UserId;

use crate::auth::AuthUser;

/// Signed-in user as remembered by the session.
///
/// Holds only what the auth provider told us when the access token was
/// verified; the provider remains the owner of the identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// Auth provider user ID.
    pub id: UserId,
    /// Email address, if the provider has one.
    pub email: Option<String>,
}

impl From<AuthUser> for CurrentUser {
    fn from(user: AuthUser) -> Self {
        Self {
            id: user.id,
            email: user.email,
        }
    }
}

/// Session keys.
pub mod keys {
    /// Key for storing the current signed-in user.
    pub const CURRENT_USER: &str = "current_user";
}

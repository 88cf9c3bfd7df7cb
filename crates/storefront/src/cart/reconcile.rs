//! Sign-in reconciliation of the guest cart into the user cart.
//!
//! # Policy
//!
//! On the `Unauthenticated -> Authenticated` transition every guest line is
//! upserted into the user cart with the **guest quantity**. A product that
//! was already in the user cart ends up with the guest quantity; the two are
//! not summed and the larger is not kept.
//!
//! The merge is best effort. Each line is an independent upsert, a failed
//! upsert is logged and recorded in the [`ReconcileReport`], and the
//! remaining lines and the final guest-cart clear still run. Nothing is
//! retried.

use emporium_core::{ProductId, UserId};
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::local::LocalCartStore;
use super::remote::RemoteCartStore;

/// Authentication state as reported by the auth collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AuthState {
    /// No signed-in identity.
    #[default]
    Unauthenticated,
    /// Signed in as this user.
    Authenticated(UserId),
}

impl AuthState {
    /// The signed-in user, if any.
    #[must_use]
    pub const fn user_id(self) -> Option<UserId> {
        match self {
            Self::Unauthenticated => None,
            Self::Authenticated(user_id) => Some(user_id),
        }
    }
}

impl From<Option<UserId>> for AuthState {
    fn from(user_id: Option<UserId>) -> Self {
        user_id.map_or(Self::Unauthenticated, Self::Authenticated)
    }
}

/// A change between two auth states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthTransition {
    /// `Unauthenticated -> Authenticated`: triggers reconciliation.
    SignedIn(UserId),
    /// `Authenticated -> Unauthenticated`: no data transfer.
    SignedOut(UserId),
    /// One user replaced by another without a sign-out in between.
    SwitchedUser {
        /// User that was signed in.
        from: UserId,
        /// User that is now signed in.
        to: UserId,
    },
}

impl AuthTransition {
    /// Classify the change from `previous` to `next`. Returns `None` when
    /// nothing changed.
    #[must_use]
    pub fn between(previous: AuthState, next: AuthState) -> Option<Self> {
        match (previous, next) {
            (AuthState::Unauthenticated, AuthState::Authenticated(user_id)) => {
                Some(Self::SignedIn(user_id))
            }
            (AuthState::Authenticated(user_id), AuthState::Unauthenticated) => {
                Some(Self::SignedOut(user_id))
            }
            (AuthState::Authenticated(from), AuthState::Authenticated(to)) if from != to => {
                Some(Self::SwitchedUser { from, to })
            }
            _ => None,
        }
    }
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Products upserted into the user cart.
    pub merged: Vec<ProductId>,
    /// Products whose upsert failed. Their guest quantity is lost.
    pub failed: Vec<ProductId>,
    /// Whether the guest cart was cleared afterwards.
    pub guest_cart_cleared: bool,
}

impl ReconcileReport {
    /// Whether the guest cart had nothing to merge.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.merged.is_empty() && self.failed.is_empty()
    }

    /// Whether any line failed to merge.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Aggregate warning for the user, if any line failed.
    #[must_use]
    pub fn warning(&self) -> Option<String> {
        match self.failed.len() {
            0 => None,
            1 => Some("1 item from your guest cart could not be saved".to_string()),
            n => Some(format!("{n} items from your guest cart could not be saved")),
        }
    }
}

/// Merge the guest cart into `user_id`'s remote cart and clear it.
///
/// An empty guest cart performs no upserts and leaves the user cart alone.
/// A guest storage read failure is logged and treated as an empty cart.
#[instrument(skip(local, remote))]
pub async fn reconcile(
    local: &LocalCartStore,
    remote: &dyn RemoteCartStore,
    user_id: UserId,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    let lines = match local.read().await {
        Ok(lines) => lines,
        Err(e) => {
            warn!(error = %e, "Could not read guest cart, skipping merge");
            return report;
        }
    };

    if lines.is_empty() {
        return report;
    }

    for line in &lines {
        match remote.upsert(user_id, line.product_id, line.quantity).await {
            Ok(()) => report.merged.push(line.product_id),
            Err(e) => {
                warn!(
                    error = %e,
                    product_id = %line.product_id,
                    quantity = %line.quantity,
                    "Failed to merge guest cart line"
                );
                report.failed.push(line.product_id);
            }
        }
    }

    match local.clear().await {
        Ok(()) => report.guest_cart_cleared = true,
        Err(e) => warn!(error = %e, "Failed to clear guest cart after merge"),
    }

    info!(
        merged = report.merged.len(),
        failed = report.failed.len(),
        "Guest cart reconciled"
    );

    report
}

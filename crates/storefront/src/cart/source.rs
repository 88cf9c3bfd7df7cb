//! The authoritative cart store for a request, and the mutations on it.

use emporium_core::{CartLine, ProductId, ProductSnapshot, Quantity, UserId};
use tracing::{debug, instrument};

use super::local::LocalCartStore;
use super::remote::RemoteCartStore;
use super::{CartError, CartNotice};

/// Which store is the source of truth for the current session.
///
/// Guests read and write the [`LocalCartStore`]; signed-in users read and
/// write the [`RemoteCartStore`] rows owned by their ID.
#[derive(Clone, Copy)]
pub enum CartSource<'a> {
    /// No authenticated identity: the session-scoped guest cart.
    Guest(&'a LocalCartStore),
    /// Authenticated: the remote cart owned by this user.
    User(&'a dyn RemoteCartStore, UserId),
}

impl std::fmt::Debug for CartSource<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Guest(_) => f.write_str("Guest"),
            Self::User(_, user_id) => f.debug_tuple("User").field(user_id).finish(),
        }
    }
}

impl CartSource<'_> {
    /// The owning user, if this is a user cart.
    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        match self {
            Self::Guest(_) => None,
            Self::User(_, user_id) => Some(*user_id),
        }
    }

    /// Current lines without product data.
    ///
    /// # Errors
    ///
    /// Returns the underlying store's error.
    pub async fn lines(&self) -> Result<Vec<CartLine>, CartError> {
        match self {
            Self::Guest(local) => local.read().await,
            Self::User(remote, user_id) => Ok(remote
                .fetch(*user_id)
                .await?
                .into_iter()
                .map(|item| item.line)
                .collect()),
        }
    }

    /// Add units of a product, incrementing an existing line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::QuantityOverflow` if the line would exceed the
    /// maximum quantity, or the underlying store's error.
    #[instrument(skip(self, product), fields(source = ?self, product_id = %product.id))]
    pub async fn add_item(
        &self,
        product: &ProductSnapshot,
        quantity: Quantity,
    ) -> Result<CartNotice, CartError> {
        match self {
            Self::Guest(local) => {
                let mut lines = local.read().await?;
                match lines.iter_mut().find(|line| line.product_id == product.id) {
                    Some(line) => {
                        line.quantity = line
                            .quantity
                            .checked_add(quantity)
                            .ok_or(CartError::QuantityOverflow)?;
                    }
                    None => lines.push(CartLine::new(product.id, quantity)),
                }
                local.write(&lines).await?;
            }
            Self::User(remote, user_id) => {
                let existing = find_line(self, product.id).await?;
                let total = match existing {
                    Some(line) => line
                        .quantity
                        .checked_add(quantity)
                        .ok_or(CartError::QuantityOverflow)?,
                    None => quantity,
                };
                remote.upsert(*user_id, product.id, total).await?;
            }
        }

        debug!(%quantity, "Added to cart");
        Ok(CartNotice::Added)
    }

    /// Remove a product's line. No-op if the line is absent.
    ///
    /// # Errors
    ///
    /// Returns the underlying store's error.
    #[instrument(skip(self), fields(source = ?self))]
    pub async fn remove_item(&self, product_id: ProductId) -> Result<CartNotice, CartError> {
        match self {
            Self::Guest(local) => {
                let mut lines = local.read().await?;
                let before = lines.len();
                lines.retain(|line| line.product_id != product_id);
                if lines.len() != before {
                    local.write(&lines).await?;
                }
            }
            Self::User(remote, user_id) => remote.delete(*user_id, product_id).await?,
        }

        Ok(CartNotice::Removed)
    }

    /// Overwrite a line's quantity.
    ///
    /// A quantity below one removes the line instead (and returns the
    /// removal notice). Updating a product that is not in the cart is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the underlying store's error.
    #[instrument(skip(self), fields(source = ?self))]
    pub async fn update_quantity(
        &self,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<Option<CartNotice>, CartError> {
        let Ok(quantity) = Quantity::try_from(quantity) else {
            if quantity < 1 {
                return self.remove_item(product_id).await.map(Some);
            }
            return Err(CartError::QuantityOverflow);
        };

        match self {
            Self::Guest(local) => {
                let mut lines = local.read().await?;
                if let Some(line) = lines.iter_mut().find(|line| line.product_id == product_id) {
                    line.quantity = quantity;
                    local.write(&lines).await?;
                }
            }
            Self::User(remote, user_id) => {
                if find_line(self, product_id).await?.is_some() {
                    remote.upsert(*user_id, product_id, quantity).await?;
                }
            }
        }

        Ok(None)
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns the underlying store's error.
    #[instrument(skip(self), fields(source = ?self))]
    pub async fn clear(&self) -> Result<(), CartError> {
        match self {
            Self::Guest(local) => local.clear().await,
            Self::User(remote, user_id) => remote.delete_all(*user_id).await,
        }
    }
}

async fn find_line(
    source: &CartSource<'_>,
    product_id: ProductId,
) -> Result<Option<CartLine>, CartError> {
    Ok(source
        .lines()
        .await?
        .into_iter()
        .find(|line| line.product_id == product_id))
}

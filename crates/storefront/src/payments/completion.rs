//! Order recording for completed checkouts.
//!
//! Runs once the processor reports a checkout session as paid:
//!
//! 1. Record the order in `processing` status. A session that already has
//!    an order is reported as such and nothing else runs.
//! 2. Record the order items.
//! 3. Empty the user's remote cart.
//! 4. Take the sold units out of stock.
//!
//! Only step 1 can fail the completion. The payment has already been taken,
//! so failures in later steps are logged for follow-up rather than bounced
//! back to the processor.

use std::sync::Arc;

use async_trait::async_trait;
use emporium_core::{OrderId, ProductId, Quantity, UserId};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use super::PaymentError;
use super::webhook::CompletedCheckout;
use crate::cart::RemoteCartStore;
use crate::db::{NewOrder, NewOrderItem, OrderSummary, RepositoryError};

/// Order persistence: written by checkout completion, read as order history.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert an order in `processing` status.
    ///
    /// Must return `RepositoryError::Conflict` when the payment session
    /// already has an order.
    async fn create_order(&self, order: &NewOrder) -> Result<OrderId, RepositoryError>;

    /// The order recorded for a payment session, if any.
    async fn find_by_payment_session(
        &self,
        payment_session_id: &str,
    ) -> Result<Option<OrderId>, RepositoryError>;

    /// Insert the items of an order.
    async fn insert_items(
        &self,
        order_id: OrderId,
        items: &[NewOrderItem],
    ) -> Result<(), RepositoryError>;

    /// Reduce a product's stock, clamped at zero.
    async fn decrement_stock(
        &self,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<(), RepositoryError>;

    /// A user's orders with their items, newest first.
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<OrderSummary>, RepositoryError>;
}

/// What completing a checkout did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompletionOutcome {
    /// A new order was recorded.
    Recorded {
        order_id: OrderId,
        /// Whether the order items were stored.
        items_recorded: bool,
        /// Whether the user's cart was emptied.
        cart_cleared: bool,
        /// Products whose stock could not be decremented.
        stock_failures: Vec<ProductId>,
    },
    /// The session was already recorded by an earlier delivery.
    AlreadyRecorded { order_id: OrderId },
}

/// Records orders for completed checkouts.
#[derive(Clone)]
pub struct CheckoutCompletion {
    orders: Arc<dyn OrderStore>,
    carts: Arc<dyn RemoteCartStore>,
}

impl CheckoutCompletion {
    /// Create a completion handler.
    #[must_use]
    pub fn new(orders: Arc<dyn OrderStore>, carts: Arc<dyn RemoteCartStore>) -> Self {
        Self { orders, carts }
    }

    /// Record the order for a completed checkout.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Order` if the order itself cannot be recorded.
    #[instrument(skip(self, checkout), fields(session_id = %checkout.session_id, user_id = %checkout.user_id))]
    pub async fn complete(
        &self,
        checkout: &CompletedCheckout,
    ) -> Result<CompletionOutcome, PaymentError> {
        if let Some(order_id) = self
            .orders
            .find_by_payment_session(&checkout.session_id)
            .await?
        {
            info!(%order_id, "Checkout already recorded");
            return Ok(CompletionOutcome::AlreadyRecorded { order_id });
        }

        let order = NewOrder {
            user_id: checkout.user_id,
            total: checkout.total(),
            payment_session_id: checkout.session_id.clone(),
            payment_intent_id: checkout.payment_intent_id.clone(),
            shipping_address: checkout.shipping_address.clone(),
        };

        let order_id = match self.orders.create_order(&order).await {
            Ok(id) => id,
            Err(RepositoryError::Conflict(_)) => {
                // Concurrent delivery of the same event won the insert.
                let order_id = self
                    .orders
                    .find_by_payment_session(&checkout.session_id)
                    .await?
                    .ok_or(RepositoryError::NotFound)?;
                info!(%order_id, "Checkout recorded by a concurrent delivery");
                return Ok(CompletionOutcome::AlreadyRecorded { order_id });
            }
            Err(e) => {
                error!(error = %e, "Failed to create order");
                return Err(e.into());
            }
        };

        let items_recorded = match self.orders.insert_items(order_id, &checkout.items).await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, %order_id, "Failed to record order items");
                false
            }
        };

        let cart_cleared = match self.carts.delete_all(checkout.user_id).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to clear cart after checkout");
                false
            }
        };

        let mut stock_failures = Vec::new();
        for item in &checkout.items {
            if let Err(e) = self
                .orders
                .decrement_stock(item.product_id, item.quantity)
                .await
            {
                warn!(
                    error = %e,
                    product_id = %item.product_id,
                    quantity = %item.quantity,
                    "Failed to decrement stock"
                );
                stock_failures.push(item.product_id);
            }
        }

        info!(%order_id, total = %order.total, "Order recorded");

        Ok(CompletionOutcome::Recorded {
            order_id,
            items_recorded,
            cart_cleared,
            stock_failures,
        })
    }
}

//! In-memory order store.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use emporium_core::{OrderId, OrderStatus, ProductId, Quantity, UserId};

use super::completion::OrderStore;
use crate::cart::memory::MemoryCatalog;
use crate::db::{
    NewOrder, NewOrderItem, OrderLine, OrderSummary, OrderedProduct, RepositoryError,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Orders, order items and stock decrements held in memory.
///
/// Order history joins item display data from the catalog given to
/// [`MemoryOrderStore::with_catalog`].
#[derive(Debug, Default)]
pub struct MemoryOrderStore {
    catalog: Option<Arc<MemoryCatalog>>,
    orders: Mutex<HashMap<OrderId, NewOrder>>,
    placed: Mutex<Vec<(OrderId, DateTime<Utc>)>>,
    items: Mutex<HashMap<OrderId, Vec<NewOrderItem>>>,
    decrements: Mutex<Vec<(ProductId, Quantity)>>,
    failing_decrements: Mutex<HashSet<ProductId>>,
    unavailable: AtomicBool,
    fail_items: AtomicBool,
}

impl MemoryOrderStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that looks up ordered products in `catalog`.
    #[must_use]
    pub fn with_catalog(catalog: Arc<MemoryCatalog>) -> Self {
        Self {
            catalog: Some(catalog),
            ..Self::default()
        }
    }

    /// The recorded order header.
    #[must_use]
    pub fn order(&self, id: OrderId) -> Option<NewOrder> {
        lock(&self.orders).get(&id).cloned()
    }

    /// Number of recorded orders.
    #[must_use]
    pub fn order_count(&self) -> usize {
        lock(&self.orders).len()
    }

    /// The recorded items of an order.
    #[must_use]
    pub fn items(&self, id: OrderId) -> Vec<NewOrderItem> {
        lock(&self.items).get(&id).cloned().unwrap_or_default()
    }

    /// Successful stock decrements, in call order.
    #[must_use]
    pub fn decrements(&self) -> Vec<(ProductId, Quantity)> {
        lock(&self.decrements).clone()
    }

    /// Make every order operation fail as if the pool timed out.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make `insert_items` fail.
    pub fn fail_items(&self, fail: bool) {
        self.fail_items.store(fail, Ordering::SeqCst);
    }

    /// Make `decrement_stock` fail for one product.
    pub fn fail_decrement_for(&self, product_id: ProductId) {
        lock(&self.failing_decrements).insert(product_id);
    }

    fn check(&self) -> Result<(), RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn create_order(&self, order: &NewOrder) -> Result<OrderId, RepositoryError> {
        self.check()?;
        let mut orders = lock(&self.orders);
        if orders
            .values()
            .any(|o| o.payment_session_id == order.payment_session_id)
        {
            return Err(RepositoryError::Conflict(format!(
                "order already recorded for session {}",
                order.payment_session_id
            )));
        }
        let id = OrderId::generate();
        orders.insert(id, order.clone());
        lock(&self.placed).push((id, Utc::now()));
        Ok(id)
    }

    async fn find_by_payment_session(
        &self,
        payment_session_id: &str,
    ) -> Result<Option<OrderId>, RepositoryError> {
        self.check()?;
        Ok(lock(&self.orders)
            .iter()
            .find(|(_, o)| o.payment_session_id == payment_session_id)
            .map(|(id, _)| *id))
    }

    async fn insert_items(
        &self,
        order_id: OrderId,
        items: &[NewOrderItem],
    ) -> Result<(), RepositoryError> {
        self.check()?;
        if self.fail_items.load(Ordering::SeqCst) {
            return Err(RepositoryError::DataCorruption(
                "order items rejected".to_string(),
            ));
        }
        lock(&self.items)
            .entry(order_id)
            .or_default()
            .extend_from_slice(items);
        Ok(())
    }

    async fn decrement_stock(
        &self,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<(), RepositoryError> {
        self.check()?;
        if lock(&self.failing_decrements).contains(&product_id) {
            return Err(RepositoryError::NotFound);
        }
        lock(&self.decrements).push((product_id, quantity));
        Ok(())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<OrderSummary>, RepositoryError> {
        self.check()?;
        let orders = lock(&self.orders);
        let items = lock(&self.items);
        let placed = lock(&self.placed);

        Ok(placed
            .iter()
            .rev()
            .filter_map(|(id, created_at)| {
                let order = orders.get(id).filter(|o| o.user_id == user_id)?;
                Some(OrderSummary {
                    id: *id,
                    status: OrderStatus::Processing,
                    total: order.total,
                    created_at: *created_at,
                    items: items
                        .get(id)
                        .map(|lines| lines.iter().map(|item| self.order_line(item)).collect())
                        .unwrap_or_default(),
                })
            })
            .collect())
    }
}

impl MemoryOrderStore {
    fn order_line(&self, item: &NewOrderItem) -> OrderLine {
        let product = self
            .catalog
            .as_ref()
            .and_then(|catalog| catalog.snapshot(item.product_id))
            .map(|p| OrderedProduct {
                name: p.name,
                image: p.images.into_iter().next(),
            });
        OrderLine {
            product_id: item.product_id,
            quantity: item.quantity,
            price: item.price,
            product,
        }
    }
}

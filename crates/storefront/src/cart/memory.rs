//! In-memory cart collaborators.
//!
//! Used by unit and integration tests and for running the cart flow without
//! a database. Each collaborator can be switched into a failing mode to
//! exercise the error paths (`BackendUnavailable`, storage failures,
//! per-line reconciliation failures).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use emporium_core::{CartLine, ProductId, ProductSnapshot, Quantity, UserId};

use super::CartError;
use super::catalog::{ProductCatalog, ProductPage, ProductQuery, ProductSort};
use super::remote::RemoteCartStore;
use super::storage::{GuestStorage, StorageError};
use super::view::CartItem;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Guest Storage
// =============================================================================

/// Key-value guest storage held in memory.
#[derive(Debug, Default)]
pub struct MemoryGuestStorage {
    values: Mutex<HashMap<String, String>>,
    unavailable: AtomicBool,
}

impl MemoryGuestStorage {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with `StorageError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Inspect the raw stored value.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        lock(&self.values).get(key).cloned()
    }

    /// Store a raw value, bypassing the cart encoder.
    pub fn put_raw(&self, key: &str, value: &str) {
        lock(&self.values).insert(key.to_string(), value.to_string());
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory storage offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl GuestStorage for MemoryGuestStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check()?;
        Ok(self.raw(key))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.check()?;
        lock(&self.values).insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.check()?;
        lock(&self.values).remove(key);
        Ok(())
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// Product catalog held in memory.
///
/// Listing treats insertion order as creation order.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    products: Mutex<HashMap<ProductId, ProductSnapshot>>,
    inserted: Mutex<Vec<ProductId>>,
    unavailable: AtomicBool,
}

impl MemoryCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a product.
    pub fn insert(&self, product: ProductSnapshot) {
        let id = product.id;
        if lock(&self.products).insert(id, product).is_none() {
            lock(&self.inserted).push(id);
        }
    }

    /// Remove a product, as if it were deleted from the store.
    pub fn remove(&self, id: ProductId) {
        lock(&self.products).remove(&id);
        lock(&self.inserted).retain(|listed| *listed != id);
    }

    /// Make every lookup fail with `CartError::BackendUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub(crate) fn snapshot(&self, id: ProductId) -> Option<ProductSnapshot> {
        lock(&self.products).get(&id).cloned()
    }

    fn check(&self) -> Result<(), CartError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CartError::BackendUnavailable(
                "memory catalog offline".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ProductCatalog for MemoryCatalog {
    async fn get(&self, id: ProductId) -> Result<Option<ProductSnapshot>, CartError> {
        self.check()?;
        Ok(self.snapshot(id))
    }

    async fn snapshots(
        &self,
        ids: &[ProductId],
    ) -> Result<HashMap<ProductId, ProductSnapshot>, CartError> {
        self.check()?;
        let products = lock(&self.products);
        Ok(ids
            .iter()
            .filter_map(|id| products.get(id).map(|p| (*id, p.clone())))
            .collect())
    }

    async fn list(&self, query: &ProductQuery) -> Result<ProductPage, CartError> {
        self.check()?;
        let query = query.normalized();
        let needle = query.search.as_deref().map(str::to_lowercase);
        let products = lock(&self.products);
        let inserted = lock(&self.inserted);

        let mut matches: Vec<&ProductSnapshot> = inserted
            .iter()
            .rev()
            .filter_map(|id| products.get(id))
            .filter(|p| p.is_active)
            .filter(|p| {
                needle
                    .as_deref()
                    .is_none_or(|needle| p.name.to_lowercase().contains(needle))
            })
            .collect();
        match query.sort {
            ProductSort::Newest => {}
            ProductSort::PriceAsc => matches.sort_by_key(|p| p.price),
            ProductSort::PriceDesc => matches.sort_by(|a, b| b.price.cmp(&a.price)),
            ProductSort::Name => matches.sort_by(|a, b| a.name.cmp(&b.name)),
        }

        let total = u64::try_from(matches.len()).unwrap_or(u64::MAX);
        let skip = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let take = usize::try_from(query.limit).unwrap_or(usize::MAX);
        Ok(ProductPage {
            products: matches.into_iter().skip(skip).take(take).cloned().collect(),
            total,
            page: query.page,
            limit: query.limit,
        })
    }
}

// =============================================================================
// Remote Cart
// =============================================================================

/// Per-user cart rows held in memory, joined against a [`MemoryCatalog`].
///
/// Rows keep insertion order, and `(user, product)` is unique as in the
/// database table. `upsert` refuses products missing from the catalog.
#[derive(Debug)]
pub struct MemoryRemoteCart {
    catalog: Arc<MemoryCatalog>,
    rows: Mutex<Vec<(UserId, CartLine)>>,
    failing_products: Mutex<HashSet<ProductId>>,
    unavailable: AtomicBool,
    upsert_calls: AtomicUsize,
}

impl MemoryRemoteCart {
    /// Create an empty store joined against `catalog`.
    #[must_use]
    pub fn new(catalog: Arc<MemoryCatalog>) -> Self {
        Self {
            catalog,
            rows: Mutex::new(Vec::new()),
            failing_products: Mutex::new(HashSet::new()),
            unavailable: AtomicBool::new(false),
            upsert_calls: AtomicUsize::new(0),
        }
    }

    /// Insert a row directly, bypassing call accounting.
    pub fn seed(&self, user_id: UserId, product_id: ProductId, quantity: Quantity) {
        put(&mut lock(&self.rows), user_id, product_id, quantity);
    }

    /// The user's lines in insertion order, without product data.
    #[must_use]
    pub fn lines(&self, user_id: UserId) -> Vec<CartLine> {
        lock(&self.rows)
            .iter()
            .filter(|(owner, _)| *owner == user_id)
            .map(|(_, line)| *line)
            .collect()
    }

    /// Number of `upsert` calls made so far (including failed ones).
    #[must_use]
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    /// Make `upsert` fail for one product.
    pub fn fail_upserts_for(&self, product_id: ProductId) {
        lock(&self.failing_products).insert(product_id);
    }

    /// Make every operation fail with `CartError::BackendUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), CartError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CartError::BackendUnavailable(
                "memory cart offline".to_string(),
            ));
        }
        Ok(())
    }
}

fn put(rows: &mut Vec<(UserId, CartLine)>, user_id: UserId, product_id: ProductId, quantity: Quantity) {
    match rows
        .iter_mut()
        .find(|(owner, line)| *owner == user_id && line.product_id == product_id)
    {
        Some((_, line)) => line.quantity = quantity,
        None => rows.push((user_id, CartLine::new(product_id, quantity))),
    }
}

#[async_trait]
impl RemoteCartStore for MemoryRemoteCart {
    async fn fetch(&self, user_id: UserId) -> Result<Vec<CartItem>, CartError> {
        self.check()?;
        Ok(self
            .lines(user_id)
            .into_iter()
            .filter_map(|line| {
                self.catalog
                    .snapshot(line.product_id)
                    .map(|product| CartItem::new(line, product))
            })
            .collect())
    }

    async fn upsert(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<(), CartError> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        if lock(&self.failing_products).contains(&product_id) {
            return Err(CartError::BackendUnavailable(format!(
                "upsert rejected for {product_id}"
            )));
        }
        // Rows reference products, as the foreign key does in Postgres.
        if self.catalog.snapshot(product_id).is_none() {
            return Err(CartError::BackendUnavailable(format!(
                "product {product_id} does not exist"
            )));
        }
        put(&mut lock(&self.rows), user_id, product_id, quantity);
        Ok(())
    }

    async fn delete(&self, user_id: UserId, product_id: ProductId) -> Result<(), CartError> {
        self.check()?;
        lock(&self.rows)
            .retain(|(owner, line)| !(*owner == user_id && line.product_id == product_id));
        Ok(())
    }

    async fn delete_all(&self, user_id: UserId) -> Result<(), CartError> {
        self.check()?;
        lock(&self.rows).retain(|(owner, _)| *owner != user_id);
        Ok(())
    }
}

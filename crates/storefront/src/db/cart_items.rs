//! Cart item repository and the Postgres-backed remote cart store.
//!
//! Rows live in `storefront.cart_items` and are unique on
//! `(user_id, product_id)`, so an upsert either inserts the line or
//! overwrites its quantity.

use async_trait::async_trait;
use emporium_core::{CartLine, Price, ProductId, ProductSnapshot, Quantity, UserId};
use sqlx::PgPool;

use super::RepositoryError;
use crate::cart::{CartError, CartItem, RemoteCartStore};

/// Cart row joined with its product.
#[derive(Debug, sqlx::FromRow)]
struct CartItemRow {
    product_id: ProductId,
    quantity: i32,
    name: String,
    slug: String,
    price: Price,
    compare_at_price: Option<Price>,
    images: Vec<String>,
    stock: i32,
    is_active: bool,
}

impl TryFrom<CartItemRow> for CartItem {
    type Error = RepositoryError;

    fn try_from(row: CartItemRow) -> Result<Self, Self::Error> {
        let quantity = Quantity::try_from(row.quantity).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid cart quantity in database: {e}"))
        })?;

        Ok(Self::new(
            CartLine::new(row.product_id, quantity),
            ProductSnapshot {
                id: row.product_id,
                name: row.name,
                slug: row.slug,
                price: row.price,
                compare_at_price: row.compare_at_price,
                images: row.images,
                stock: row.stock,
                is_active: row.is_active,
            },
        ))
    }
}

/// Repository for cart item database operations.
pub struct CartItemRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartItemRepository<'a> {
    /// Create a new cart item repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List a user's cart lines with current product data, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if a stored quantity is invalid.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<CartItem>, RepositoryError> {
        let rows = sqlx::query_as::<_, CartItemRow>(
            r"
            SELECT ci.product_id, ci.quantity,
                   p.name, p.slug, p.price, p.compare_at_price, p.images, p.stock, p.is_active
            FROM storefront.cart_items ci
            JOIN storefront.products p ON p.id = ci.product_id
            WHERE ci.user_id = $1
            ORDER BY ci.created_at, ci.id
            ",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(CartItem::try_from).collect()
    }

    /// Insert a line or overwrite its quantity.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails (including a
    /// foreign key violation for an unknown product).
    pub async fn upsert(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO storefront.cart_items (user_id, product_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, product_id)
            DO UPDATE SET quantity = EXCLUDED.quantity
            ",
        )
        .bind(user_id)
        .bind(product_id)
        .bind(quantity.get())
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Delete one line. Returns whether a row was removed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(&self, user_id: UserId, product_id: ProductId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            DELETE FROM storefront.cart_items
            WHERE user_id = $1 AND product_id = $2
            ",
        )
        .bind(user_id)
        .bind(product_id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete every line a user has. Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete_all(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            DELETE FROM storefront.cart_items
            WHERE user_id = $1
            ",
        )
        .bind(user_id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Remote cart store backed by `storefront.cart_items`.
#[derive(Debug, Clone)]
pub struct PgCartStore {
    pool: PgPool,
}

impl PgCartStore {
    /// Create a store over a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn repo(&self) -> CartItemRepository<'_> {
        CartItemRepository::new(&self.pool)
    }
}

#[async_trait]
impl RemoteCartStore for PgCartStore {
    async fn fetch(&self, user_id: UserId) -> Result<Vec<CartItem>, CartError> {
        Ok(self.repo().list_for_user(user_id).await?)
    }

    async fn upsert(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<(), CartError> {
        Ok(self.repo().upsert(user_id, product_id, quantity).await?)
    }

    async fn delete(&self, user_id: UserId, product_id: ProductId) -> Result<(), CartError> {
        self.repo().delete(user_id, product_id).await?;
        Ok(())
    }

    async fn delete_all(&self, user_id: UserId) -> Result<(), CartError> {
        let removed = self.repo().delete_all(user_id).await?;
        tracing::debug!(%user_id, removed, "Cleared user cart");
        Ok(())
    }
}

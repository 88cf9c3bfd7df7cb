//! Product repository and the Postgres-backed product catalog.

use std::collections::HashMap;

use async_trait::async_trait;
use emporium_core::{Price, ProductId, ProductSnapshot};
use sqlx::PgPool;
use uuid::Uuid;

use super::RepositoryError;
use crate::cart::{CartError, ProductCatalog, ProductPage, ProductQuery, ProductSort};

/// Product row as stored in `storefront.products`.
#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    name: String,
    slug: String,
    price: Price,
    compare_at_price: Option<Price>,
    images: Vec<String>,
    stock: i32,
    is_active: bool,
}

impl From<ProductRow> for ProductSnapshot {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            slug: row.slug,
            price: row.price,
            compare_at_price: row.compare_at_price,
            images: row.images,
            stock: row.stock,
            is_active: row.is_active,
        }
    }
}

/// Fields for creating or refreshing a catalog product.
#[derive(Debug, Clone)]
pub struct ProductInput {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price: Price,
    pub compare_at_price: Option<Price>,
    pub images: Vec<String>,
    pub stock: i32,
    pub is_featured: bool,
    pub is_active: bool,
}

/// Repository for product database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a product by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: ProductId) -> Result<Option<ProductSnapshot>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, name, slug, price, compare_at_price, images, stock, is_active
            FROM storefront.products
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(ProductSnapshot::from))
    }

    /// Get several products by ID. Unknown IDs are skipped.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_many(&self, ids: &[ProductId]) -> Result<Vec<ProductSnapshot>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = ids.iter().map(ProductId::as_uuid).collect();
        let rows = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, name, slug, price, compare_at_price, images, stock, is_active
            FROM storefront.products
            WHERE id = ANY($1)
            ",
        )
        .bind(&ids)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(ProductSnapshot::from).collect())
    }

    /// One page of active products, filtered by name and sorted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_active(&self, query: &ProductQuery) -> Result<ProductPage, RepositoryError> {
        let query = query.normalized();
        let pattern = query.search.as_deref().map(like_pattern);

        let total: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM storefront.products
            WHERE is_active AND ($1::text IS NULL OR name ILIKE $1)
            ",
        )
        .bind(pattern.as_deref())
        .fetch_one(self.pool)
        .await?;

        let sql = format!(
            r"
            SELECT id, name, slug, price, compare_at_price, images, stock, is_active
            FROM storefront.products
            WHERE is_active AND ($1::text IS NULL OR name ILIKE $1)
            ORDER BY {}
            LIMIT $2 OFFSET $3
            ",
            order_clause(query.sort)
        );
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(pattern.as_deref())
            .bind(i64::from(query.limit))
            .bind(i64::try_from(query.offset()).unwrap_or(i64::MAX))
            .fetch_all(self.pool)
            .await?;

        Ok(ProductPage {
            products: rows.into_iter().map(ProductSnapshot::from).collect(),
            total: u64::try_from(total).unwrap_or(0),
            page: query.page,
            limit: query.limit,
        })
    }

    /// Insert a product, or refresh the existing product with the same slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn upsert_by_slug(&self, input: &ProductInput) -> Result<ProductId, RepositoryError> {
        let id: ProductId = sqlx::query_scalar(
            r"
            INSERT INTO storefront.products
                (name, slug, description, price, compare_at_price, images, stock, is_featured, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (slug) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                price = EXCLUDED.price,
                compare_at_price = EXCLUDED.compare_at_price,
                images = EXCLUDED.images,
                stock = EXCLUDED.stock,
                is_featured = EXCLUDED.is_featured,
                is_active = EXCLUDED.is_active,
                updated_at = NOW()
            RETURNING id
            ",
        )
        .bind(&input.name)
        .bind(&input.slug)
        .bind(input.description.as_deref())
        .bind(input.price)
        .bind(input.compare_at_price)
        .bind(&input.images)
        .bind(input.stock)
        .bind(input.is_featured)
        .bind(input.is_active)
        .fetch_one(self.pool)
        .await?;

        Ok(id)
    }
}

/// `ORDER BY` for a listing sort. `id` breaks ties so pages are stable.
const fn order_clause(sort: ProductSort) -> &'static str {
    match sort {
        ProductSort::Newest => "created_at DESC, id",
        ProductSort::PriceAsc => "price ASC, id",
        ProductSort::PriceDesc => "price DESC, id",
        ProductSort::Name => "name ASC, id",
    }
}

/// `ILIKE` pattern matching `search` anywhere, with wildcards escaped.
fn like_pattern(search: &str) -> String {
    let mut pattern = String::with_capacity(search.len() + 2);
    pattern.push('%');
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Product catalog backed by `storefront.products`.
#[derive(Debug, Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    /// Create a catalog over a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductCatalog for PgCatalog {
    async fn get(&self, id: ProductId) -> Result<Option<ProductSnapshot>, CartError> {
        Ok(ProductRepository::new(&self.pool).get_by_id(id).await?)
    }

    async fn snapshots(
        &self,
        ids: &[ProductId],
    ) -> Result<HashMap<ProductId, ProductSnapshot>, CartError> {
        let products = ProductRepository::new(&self.pool).get_many(ids).await?;
        Ok(products.into_iter().map(|p| (p.id, p)).collect())
    }

    async fn list(&self, query: &ProductQuery) -> Result<ProductPage, CartError> {
        Ok(ProductRepository::new(&self.pool).list_active(query).await?)
    }
}

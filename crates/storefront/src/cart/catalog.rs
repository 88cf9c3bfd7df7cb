//! Product catalog lookups used to enrich cart lines, plus the active
//! product listing shoppers pick from.

use std::collections::HashMap;

use async_trait::async_trait;
use emporium_core::{ProductId, ProductSnapshot};
use serde::{Deserialize, Serialize};

use super::CartError;

/// Page size when the client does not ask for one.
pub const DEFAULT_PAGE_LIMIT: u32 = 12;

/// Largest page a client may request.
pub const MAX_PAGE_LIMIT: u32 = 48;

/// Listing order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProductSort {
    /// Most recently added first.
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    /// Alphabetical by name.
    Name,
}

/// Filters and paging for the product listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProductQuery {
    /// 1-based page number.
    pub page: u32,
    pub limit: u32,
    /// Case-insensitive substring of the product name.
    pub search: Option<String>,
    pub sort: ProductSort,
}

impl Default for ProductQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
            search: None,
            sort: ProductSort::default(),
        }
    }
}

impl ProductQuery {
    /// Clamp page and limit into range and drop a blank search.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            page: self.page.max(1),
            limit: self.limit.clamp(1, MAX_PAGE_LIMIT),
            search: self
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
            sort: self.sort,
        }
    }

    /// Rows before this page.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

/// One page of active products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductPage {
    pub products: Vec<ProductSnapshot>,
    /// Matching products across all pages.
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

/// Read access to current product data.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Look up one product.
    ///
    /// # Errors
    ///
    /// Returns `CartError::BackendUnavailable` if the catalog cannot be read.
    async fn get(&self, id: ProductId) -> Result<Option<ProductSnapshot>, CartError>;

    /// Look up several products at once. Unknown IDs are simply missing
    /// from the result.
    ///
    /// # Errors
    ///
    /// Returns `CartError::BackendUnavailable` if the catalog cannot be read.
    async fn snapshots(
        &self,
        ids: &[ProductId],
    ) -> Result<HashMap<ProductId, ProductSnapshot>, CartError>;

    /// List active products. The query is normalized first.
    ///
    /// # Errors
    ///
    /// Returns `CartError::BackendUnavailable` if the catalog cannot be read.
    async fn list(&self, query: &ProductQuery) -> Result<ProductPage, CartError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_query_defaults_and_sort_names() {
        let query: ProductQuery = serde_json::from_str(r#"{"sort": "price-desc"}"#).unwrap();

        assert_eq!(query.page, 1);
        assert_eq!(query.limit, DEFAULT_PAGE_LIMIT);
        assert_eq!(query.sort, ProductSort::PriceDesc);
        assert!(serde_json::from_str::<ProductQuery>(r#"{"sort": "cheapest"}"#).is_err());
    }

    #[test]
    fn test_normalized_clamps_paging_and_blank_search() {
        let query = ProductQuery {
            page: 0,
            limit: 500,
            search: Some("   ".to_string()),
            sort: ProductSort::Name,
        }
        .normalized();

        assert_eq!(query.page, 1);
        assert_eq!(query.limit, MAX_PAGE_LIMIT);
        assert!(query.search.is_none());
        assert_eq!(query.offset(), 0);
    }

    #[test]
    fn test_offset() {
        let query = ProductQuery {
            page: 3,
            limit: 12,
            ..ProductQuery::default()
        };
        assert_eq!(query.offset(), 24);
    }
}

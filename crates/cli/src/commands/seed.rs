//! Seed the product catalog from a YAML file.
//!
//! ```yaml
//! - name: Enamel Mug
//!   slug: enamel-mug
//!   price: "18.00"
//!   images: ["https://cdn.example.com/mug.jpg"]
//!   stock: 40
//! ```
//!
//! Products are matched by slug, so running the same file twice updates
//! rather than duplicates.

use std::path::Path;

use emporium_core::Price;
use emporium_storefront::db::{self, ProductInput, ProductRepository};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use super::{CommandError, database_url};

/// One product entry in the seed file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SeedProduct {
    name: String,
    slug: String,
    #[serde(default)]
    description: Option<String>,
    price: Price,
    #[serde(default)]
    compare_at_price: Option<Price>,
    #[serde(default)]
    images: Vec<String>,
    #[serde(default)]
    stock: i32,
    #[serde(default)]
    is_featured: bool,
    #[serde(default = "active_by_default")]
    is_active: bool,
}

const fn active_by_default() -> bool {
    true
}

impl TryFrom<SeedProduct> for ProductInput {
    type Error = CommandError;

    fn try_from(p: SeedProduct) -> Result<Self, Self::Error> {
        let invalid = |reason: &str| CommandError::InvalidProduct {
            slug: p.slug.clone(),
            reason: reason.to_string(),
        };

        if p.slug.trim().is_empty() {
            return Err(invalid("slug is empty"));
        }
        if p.price.amount() <= Decimal::ZERO {
            return Err(invalid("price must be positive"));
        }
        if p.stock < 0 {
            return Err(invalid("stock cannot be negative"));
        }

        Ok(Self {
            name: p.name,
            slug: p.slug,
            description: p.description,
            price: p.price,
            compare_at_price: p.compare_at_price,
            images: p.images,
            stock: p.stock,
            is_featured: p.is_featured,
            is_active: p.is_active,
        })
    }
}

/// Parse and validate a seed file's contents.
fn parse(content: &str) -> Result<Vec<ProductInput>, CommandError> {
    let products: Vec<SeedProduct> = serde_yaml::from_str(content)?;
    products.into_iter().map(ProductInput::try_from).collect()
}

/// Upsert products from a YAML file.
///
/// The whole file is validated before connecting to the database.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, an entry is
/// invalid, or a database operation fails.
pub async fn products(path: &Path) -> Result<(), CommandError> {
    info!(path = %path.display(), "Loading products from file");

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CommandError::Io {
            path: path.display().to_string(),
            source,
        })?;
    let products = parse(&content)?;
    info!(count = products.len(), "Parsed and validated products");

    let pool = db::create_pool(&database_url()?).await?;
    let repo = ProductRepository::new(&pool);

    for product in &products {
        let id = repo.upsert_by_slug(product).await?;
        info!(%id, slug = %product.slug, "Upserted product");
    }

    info!("Seeding complete! {} products upserted", products.len());
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_applies_defaults() {
        let products = parse(
            r#"
- name: Enamel Mug
  slug: enamel-mug
  price: "18.00"
"#,
        )
        .unwrap();

        assert_eq!(products.len(), 1);
        let mug = products.first().unwrap();
        assert_eq!(mug.price, Price::from_cents(1800));
        assert!(mug.is_active);
        assert!(!mug.is_featured);
        assert_eq!(mug.stock, 0);
        assert!(mug.images.is_empty());
    }

    #[test]
    fn test_parse_rejects_non_positive_price() {
        let err = parse(
            r#"
- name: Free Mug
  slug: free-mug
  price: "0"
"#,
        )
        .unwrap_err();

        assert!(
            matches!(err, CommandError::InvalidProduct { ref slug, .. } if slug == "free-mug")
        );
    }

    #[test]
    fn test_parse_rejects_unknown_fields() {
        let err = parse(
            r#"
- name: Mug
  slug: mug
  price: "5.00"
  colour: blue
"#,
        )
        .unwrap_err();

        assert!(matches!(err, CommandError::Yaml(_)));
    }

    #[test]
    fn test_parse_rejects_negative_stock() {
        assert!(
            parse(
                r#"
- name: Mug
  slug: mug
  price: "5.00"
  stock: -1
"#,
            )
            .is_err()
        );
    }
}

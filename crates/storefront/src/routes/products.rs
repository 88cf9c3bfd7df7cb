//! Product listing.

use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
};
use tracing::instrument;

use crate::cart::{ProductPage, ProductQuery};
use crate::error::Result;
use crate::state::AppState;

/// List active products: `?page=&limit=&search=&sort=`.
///
/// `sort` is one of `newest`, `price-asc`, `price-desc` or `name`.
#[instrument(skip(state, query))]
pub async fn index(
    State(state): State<AppState>,
    query: std::result::Result<Query<ProductQuery>, QueryRejection>,
) -> Result<Json<ProductPage>> {
    let Query(query) = query?;
    Ok(Json(state.catalog().list(&query).await?))
}

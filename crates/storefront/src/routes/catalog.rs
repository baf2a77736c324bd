//! Catalog route handlers.

use axum::{Json, extract::Query, extract::State};
use serde::Serialize;
use tracing::instrument;

use crate::catalog::{FilterOptions, FilterState, Product, apply_filter};
use crate::error::Result;
use crate::state::AppState;

/// Catalog page payload: the filtered product list plus the option lists
/// the filter dropdowns are populated from.
#[derive(Debug, Serialize)]
pub struct CatalogPage {
    pub count: usize,
    pub products: Vec<Product>,
    pub options: FilterOptions,
}

/// Filtered catalog listing.
///
/// Filter dimensions arrive as query parameters (`?grade=12&term=T1`);
/// missing or `ALL` values are unconstrained. A failed catalog load answers
/// 502 with a user-facing message instead of an empty list.
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    Query(filter): Query<FilterState>,
) -> Result<Json<CatalogPage>> {
    let catalog = state.catalog().catalog().await?;
    let products: Vec<Product> = apply_filter(catalog.products(), &filter)
        .into_iter()
        .cloned()
        .collect();

    Ok(Json(CatalogPage {
        count: products.len(),
        products,
        options: catalog.options().clone(),
    }))
}

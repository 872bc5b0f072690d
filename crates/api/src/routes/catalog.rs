//! Storefront catalog: products, categories and packages.

use axum::{
    Json,
    extract::{Path, Query, State},
};

use crate::db::{PackageRepository, Page, PageRequest, ProductRepository};
use crate::error::Result;
use crate::models::{Package, Product, ProductFilter};
use crate::state::AppState;

/// Active products.
///
/// GET /api/products?category=&q=&sort=&page=&per_page=
pub async fn products(
    State(state): State<AppState>,
    Query(filter): Query<ProductFilter>,
) -> Result<Json<Page<Product>>> {
    let page = PageRequest::new(filter.page, filter.per_page);
    let products = ProductRepository::new(state.pool())
        .list(&filter, false, page)
        .await?;
    Ok(Json(products))
}

/// An active product.
///
/// GET /api/products/{slug}
pub async fn product(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Product>> {
    let product = ProductRepository::new(state.pool())
        .get_by_slug(&slug)
        .await?;
    Ok(Json(product))
}

/// Categories that have active products.
///
/// GET /api/categories
pub async fn categories(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    Ok(Json(ProductRepository::new(state.pool()).categories().await?))
}

/// Active packages.
///
/// GET /api/packages
pub async fn packages(State(state): State<AppState>) -> Result<Json<Vec<Package>>> {
    Ok(Json(PackageRepository::new(state.pool()).list(false).await?))
}

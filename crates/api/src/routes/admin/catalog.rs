//! Back-office catalog management: products and packages.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use nutmart_core::{PackageId, ProductId};

use crate::db::{PackageRepository, Page, PageRequest, ProductRepository};
use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::models::{
    NewPackage, NewProduct, Package, PackagePatch, Product, ProductFilter, ProductPatch,
};
use crate::state::AppState;

/// All products, inactive included.
///
/// GET /api/admin/products?category=&q=&sort=&page=&per_page=
pub async fn list_products(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Query(filter): Query<ProductFilter>,
) -> Result<Json<Page<Product>>> {
    let page = PageRequest::new(filter.page, filter.per_page);
    let products = ProductRepository::new(state.pool())
        .list(&filter, true, page)
        .await?;
    Ok(Json(products))
}

/// POST /api/admin/products
pub async fn create_product(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Json(input): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>)> {
    let draft = input.into_draft()?;
    let product = ProductRepository::new(state.pool()).create(&draft).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// GET /api/admin/products/{id}
pub async fn get_product(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<ProductId>,
) -> Result<Json<Product>> {
    Ok(Json(ProductRepository::new(state.pool()).get(id).await?))
}

/// PATCH /api/admin/products/{id}
pub async fn update_product(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<ProductId>,
    Json(patch): Json<ProductPatch>,
) -> Result<Json<Product>> {
    let products = ProductRepository::new(state.pool());
    let draft = patch.apply(products.get(id).await?)?;
    Ok(Json(products.update(id, &draft).await?))
}

/// DELETE /api/admin/products/{id}
pub async fn delete_product(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<ProductId>,
) -> Result<StatusCode> {
    ProductRepository::new(state.pool()).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/admin/packages
pub async fn list_packages(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<Json<Vec<Package>>> {
    Ok(Json(PackageRepository::new(state.pool()).list(true).await?))
}

/// POST /api/admin/packages
pub async fn create_package(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Json(input): Json<NewPackage>,
) -> Result<(StatusCode, Json<Package>)> {
    let draft = input.into_draft()?;
    let package = PackageRepository::new(state.pool()).create(&draft).await?;
    Ok((StatusCode::CREATED, Json(package)))
}

/// PATCH /api/admin/packages/{id}
pub async fn update_package(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<PackageId>,
    Json(patch): Json<PackagePatch>,
) -> Result<Json<Package>> {
    let packages = PackageRepository::new(state.pool());
    let draft = patch.apply(packages.get(id).await?)?;
    Ok(Json(packages.update(id, &draft).await?))
}

/// DELETE /api/admin/packages/{id}
pub async fn delete_package(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<PackageId>,
) -> Result<StatusCode> {
    PackageRepository::new(state.pool()).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

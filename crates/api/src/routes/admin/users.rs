//! Back-office user management.

use axum::{
    Json,
    extract::{Path, Query, State},
};

use nutmart_core::UserId;

use crate::db::{Page, PageRequest, RepositoryError, UserRepository};
use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::models::{User, UserFilter, UserPatch};
use crate::services::affiliate::AffiliateService;
use crate::state::AppState;

/// GET /api/admin/users?role=&q=&page=&per_page=
pub async fn list_users(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Query(filter): Query<UserFilter>,
) -> Result<Json<Page<User>>> {
    let page = PageRequest::new(filter.page, filter.per_page);
    let users = UserRepository::new(state.pool()).list(&filter, page).await?;
    Ok(Json(users))
}

/// GET /api/admin/users/{id}
pub async fn get_user(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<UserId>,
) -> Result<Json<User>> {
    let user = UserRepository::new(state.pool())
        .get_by_id(id)
        .await?
        .ok_or(RepositoryError::NotFound)?;
    Ok(Json(user))
}

/// Change role, tier, personal rate, manager or active flag.
///
/// Omitted fields are kept; `null` clears tier, personal rate and manager.
///
/// PATCH /api/admin/users/{id}
pub async fn update_user(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<UserId>,
    Json(patch): Json<UserPatch>,
) -> Result<Json<User>> {
    let user = AffiliateService::new(state.pool(), state.config())
        .update_user(id, patch)
        .await?;
    Ok(Json(user))
}

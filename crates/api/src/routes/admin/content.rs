//! Back-office content management: banners, blog posts and events.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use nutmart_core::{BannerId, BlogId, EventId};

use crate::db::{BannerRepository, BlogRepository, EventRepository, Page};
use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::models::{
    Banner, BannerPatch, Blog, BlogPatch, Event, EventPatch, NewBanner, NewBlog, NewEvent,
};
use crate::routes::PageQuery;
use crate::state::AppState;

// =============================================================================
// Banners
// =============================================================================

/// GET /api/admin/banners
pub async fn list_banners(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<Json<Vec<Banner>>> {
    Ok(Json(BannerRepository::new(state.pool()).list_all().await?))
}

/// POST /api/admin/banners
pub async fn create_banner(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Json(input): Json<NewBanner>,
) -> Result<(StatusCode, Json<Banner>)> {
    let draft = input.into_draft()?;
    let banner = BannerRepository::new(state.pool()).create(&draft).await?;
    Ok((StatusCode::CREATED, Json(banner)))
}

/// PATCH /api/admin/banners/{id}
pub async fn update_banner(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<BannerId>,
    Json(patch): Json<BannerPatch>,
) -> Result<Json<Banner>> {
    let banners = BannerRepository::new(state.pool());
    let draft = patch.apply(banners.get(id).await?)?;
    Ok(Json(banners.update(id, &draft).await?))
}

/// DELETE /api/admin/banners/{id}
pub async fn delete_banner(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<BannerId>,
) -> Result<StatusCode> {
    BannerRepository::new(state.pool()).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Blogs
// =============================================================================

/// Posts in any status.
///
/// GET /api/admin/blogs?page=&per_page=
pub async fn list_blogs(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Blog>>> {
    let page = BlogRepository::new(state.pool())
        .list_all(query.request())
        .await?;
    Ok(Json(page))
}

/// POST /api/admin/blogs
pub async fn create_blog(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(input): Json<NewBlog>,
) -> Result<(StatusCode, Json<Blog>)> {
    let draft = input.into_draft()?;
    let blog = BlogRepository::new(state.pool())
        .create(&draft, admin.id)
        .await?;
    Ok((StatusCode::CREATED, Json(blog)))
}

/// GET /api/admin/blogs/{id}
pub async fn get_blog(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<BlogId>,
) -> Result<Json<Blog>> {
    Ok(Json(BlogRepository::new(state.pool()).get(id).await?))
}

/// PATCH /api/admin/blogs/{id}
pub async fn update_blog(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<BlogId>,
    Json(patch): Json<BlogPatch>,
) -> Result<Json<Blog>> {
    let blogs = BlogRepository::new(state.pool());
    let draft = patch.apply(blogs.get(id).await?)?;
    Ok(Json(blogs.update(id, &draft).await?))
}

/// DELETE /api/admin/blogs/{id}
pub async fn delete_blog(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<BlogId>,
) -> Result<StatusCode> {
    BlogRepository::new(state.pool()).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Events
// =============================================================================

/// GET /api/admin/events
pub async fn list_events(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<Json<Vec<Event>>> {
    Ok(Json(EventRepository::new(state.pool()).list_all().await?))
}

/// POST /api/admin/events
pub async fn create_event(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Json(input): Json<NewEvent>,
) -> Result<(StatusCode, Json<Event>)> {
    let draft = input.into_draft()?;
    let event = EventRepository::new(state.pool()).create(&draft).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// PATCH /api/admin/events/{id}
pub async fn update_event(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<EventId>,
    Json(patch): Json<EventPatch>,
) -> Result<Json<Event>> {
    let events = EventRepository::new(state.pool());
    let draft = patch.apply(events.get(id).await?)?;
    Ok(Json(events.update(id, &draft).await?))
}

/// DELETE /api/admin/events/{id}
pub async fn delete_event(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<EventId>,
) -> Result<StatusCode> {
    EventRepository::new(state.pool()).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

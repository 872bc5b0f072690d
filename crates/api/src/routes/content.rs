//! Storefront content: banners, blog posts and events.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use serde::Deserialize;

use nutmart_core::BannerPosition;

use crate::db::{BannerRepository, BlogRepository, EventRepository, Page};
use crate::error::Result;
use crate::models::{Banner, Blog, BlogPage, Event};
use crate::routes::PageQuery;
use crate::services::markdown;
use crate::state::AppState;

/// Banner list query.
#[derive(Debug, Deserialize)]
pub struct BannerQuery {
    pub position: Option<BannerPosition>,
}

/// Banners currently on display.
///
/// GET /api/banners?position=
pub async fn banners(
    State(state): State<AppState>,
    Query(query): Query<BannerQuery>,
) -> Result<Json<Vec<Banner>>> {
    let banners = BannerRepository::new(state.pool())
        .list_displayed(query.position, Utc::now())
        .await?;
    Ok(Json(banners))
}

/// Published posts, newest first.
///
/// GET /api/blogs?page=&per_page=
pub async fn blogs(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Blog>>> {
    let page = BlogRepository::new(state.pool())
        .list_published(query.request())
        .await?;
    Ok(Json(page))
}

/// A published post with its content rendered.
///
/// GET /api/blogs/{slug}
pub async fn blog(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<BlogPage>> {
    let blog = BlogRepository::new(state.pool())
        .get_published(&slug)
        .await?;
    let content_html = markdown::render(&blog.content);
    Ok(Json(BlogPage { blog, content_html }))
}

/// Active events that have not ended.
///
/// GET /api/events
pub async fn events(State(state): State<AppState>) -> Result<Json<Vec<Event>>> {
    let events = EventRepository::new(state.pool())
        .list_upcoming(Utc::now())
        .await?;
    Ok(Json(events))
}

//! Banner repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use nutmart_core::{BannerId, BannerPosition};

use super::RepositoryError;
use crate::models::content::{Banner, BannerDraft};

const BANNER_COLUMNS: &str = "id, title, image_url, link_url, position, sort_order, active, \
     starts_at, ends_at, created_at, updated_at";

/// Repository for banner database operations.
pub struct BannerRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> BannerRepository<'a> {
    /// Create a new banner repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Banners showing on the storefront at `now`, by sort order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_displayed(
        &self,
        position: Option<BannerPosition>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Banner>, RepositoryError> {
        let banners = sqlx::query_as::<_, Banner>(&format!(
            "SELECT {BANNER_COLUMNS} FROM shop.banners \
             WHERE active \
               AND ($1::shop.banner_position IS NULL OR position = $1) \
               AND (starts_at IS NULL OR starts_at <= $2) \
               AND (ends_at IS NULL OR ends_at > $2) \
             ORDER BY sort_order, id"
        ))
        .bind(position)
        .bind(now)
        .fetch_all(self.pool)
        .await?;

        Ok(banners)
    }

    /// Every banner, for the back-office.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(&self) -> Result<Vec<Banner>, RepositoryError> {
        let banners = sqlx::query_as::<_, Banner>(&format!(
            "SELECT {BANNER_COLUMNS} FROM shop.banners ORDER BY position, sort_order, id"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(banners)
    }

    /// Get a banner by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the banner does not exist.
    pub async fn get(&self, id: BannerId) -> Result<Banner, RepositoryError> {
        sqlx::query_as::<_, Banner>(&format!(
            "SELECT {BANNER_COLUMNS} FROM shop.banners WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Create a banner.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(&self, draft: &BannerDraft) -> Result<Banner, RepositoryError> {
        let banner = sqlx::query_as::<_, Banner>(&format!(
            "INSERT INTO shop.banners \
                 (title, image_url, link_url, position, sort_order, active, starts_at, ends_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {BANNER_COLUMNS}"
        ))
        .bind(&draft.title)
        .bind(&draft.image_url)
        .bind(draft.link_url.as_deref())
        .bind(draft.position)
        .bind(draft.sort_order)
        .bind(draft.active)
        .bind(draft.starts_at)
        .bind(draft.ends_at)
        .fetch_one(self.pool)
        .await?;

        Ok(banner)
    }

    /// Overwrite a banner.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the banner does not exist.
    pub async fn update(&self, id: BannerId, draft: &BannerDraft) -> Result<Banner, RepositoryError> {
        sqlx::query_as::<_, Banner>(&format!(
            "UPDATE shop.banners \
             SET title = $2, image_url = $3, link_url = $4, position = $5, sort_order = $6, \
                 active = $7, starts_at = $8, ends_at = $9, updated_at = now() \
             WHERE id = $1 \
             RETURNING {BANNER_COLUMNS}"
        ))
        .bind(id)
        .bind(&draft.title)
        .bind(&draft.image_url)
        .bind(draft.link_url.as_deref())
        .bind(draft.position)
        .bind(draft.sort_order)
        .bind(draft.active)
        .bind(draft.starts_at)
        .bind(draft.ends_at)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete a banner.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the banner does not exist.
    pub async fn delete(&self, id: BannerId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.banners WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

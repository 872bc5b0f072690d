//! Blog post repository.

use sqlx::PgPool;

use nutmart_core::{BlogId, UserId};

use super::{Page, PageRequest, RepositoryError};
use crate::models::content::{Blog, BlogDraft};

const BLOG_COLUMNS: &str = "id, title, slug, excerpt, content, cover_image_url, status, \
     published_at, author_id, created_at, updated_at";

/// Repository for blog database operations.
pub struct BlogRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> BlogRepository<'a> {
    /// Create a new blog repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Published posts, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_published(&self, page: PageRequest) -> Result<Page<Blog>, RepositoryError> {
        let items = sqlx::query_as::<_, Blog>(&format!(
            "SELECT {BLOG_COLUMNS} FROM shop.blogs \
             WHERE status = 'published' \
             ORDER BY published_at DESC, id DESC \
             LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM shop.blogs WHERE status = 'published'")
                .fetch_one(self.pool)
                .await?;

        Ok(Page::new(items, total, page))
    }

    /// A published post by slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no published post has the slug.
    pub async fn get_published(&self, slug: &str) -> Result<Blog, RepositoryError> {
        sqlx::query_as::<_, Blog>(&format!(
            "SELECT {BLOG_COLUMNS} FROM shop.blogs WHERE slug = $1 AND status = 'published'"
        ))
        .bind(slug)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Every post in any status, most recently edited first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(&self, page: PageRequest) -> Result<Page<Blog>, RepositoryError> {
        let items = sqlx::query_as::<_, Blog>(&format!(
            "SELECT {BLOG_COLUMNS} FROM shop.blogs \
             ORDER BY updated_at DESC, id DESC \
             LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM shop.blogs")
            .fetch_one(self.pool)
            .await?;

        Ok(Page::new(items, total, page))
    }

    /// Get a post by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the post does not exist.
    pub async fn get(&self, id: BlogId) -> Result<Blog, RepositoryError> {
        sqlx::query_as::<_, Blog>(&format!("SELECT {BLOG_COLUMNS} FROM shop.blogs WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Create a post. `published_at` is set if it is created published.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the slug is taken.
    pub async fn create(&self, draft: &BlogDraft, author: UserId) -> Result<Blog, RepositoryError> {
        sqlx::query_as::<_, Blog>(&format!(
            "INSERT INTO shop.blogs \
                 (title, slug, excerpt, content, cover_image_url, status, published_at, author_id) \
             VALUES ($1, $2, $3, $4, $5, $6, \
                     CASE WHEN $6 = 'published'::shop.blog_status THEN now() END, $7) \
             RETURNING {BLOG_COLUMNS}"
        ))
        .bind(&draft.title)
        .bind(&draft.slug)
        .bind(&draft.excerpt)
        .bind(&draft.content)
        .bind(draft.cover_image_url.as_deref())
        .bind(draft.status)
        .bind(author)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "slug already exists"))
    }

    /// Overwrite a post. `published_at` is kept once set.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the post does not exist.
    /// Returns `RepositoryError::Conflict` if the slug is taken.
    pub async fn update(&self, id: BlogId, draft: &BlogDraft) -> Result<Blog, RepositoryError> {
        sqlx::query_as::<_, Blog>(&format!(
            "UPDATE shop.blogs \
             SET title = $2, slug = $3, excerpt = $4, content = $5, cover_image_url = $6, \
                 status = $7, \
                 published_at = CASE WHEN $7 = 'published'::shop.blog_status \
                                     THEN COALESCE(published_at, now()) \
                                     ELSE published_at END, \
                 updated_at = now() \
             WHERE id = $1 \
             RETURNING {BLOG_COLUMNS}"
        ))
        .bind(id)
        .bind(&draft.title)
        .bind(&draft.slug)
        .bind(&draft.excerpt)
        .bind(&draft.content)
        .bind(draft.cover_image_url.as_deref())
        .bind(draft.status)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "slug already exists"))?
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete a post.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the post does not exist.
    pub async fn delete(&self, id: BlogId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.blogs WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

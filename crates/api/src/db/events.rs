//! Event repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use nutmart_core::EventId;

use super::RepositoryError;
use crate::models::content::{Event, EventDraft};

const EVENT_COLUMNS: &str =
    "id, title, description, image_url, location, starts_at, ends_at, active, created_at, updated_at";

/// Repository for event database operations.
pub struct EventRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> EventRepository<'a> {
    /// Create a new event repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Active events that have not ended at `now`, soonest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_upcoming(&self, now: DateTime<Utc>) -> Result<Vec<Event>, RepositoryError> {
        let events = sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM shop.events \
             WHERE active AND ends_at > $1 \
             ORDER BY starts_at, id"
        ))
        .bind(now)
        .fetch_all(self.pool)
        .await?;

        Ok(events)
    }

    /// Every event, latest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(&self) -> Result<Vec<Event>, RepositoryError> {
        let events = sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM shop.events ORDER BY starts_at DESC, id DESC"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(events)
    }

    /// Get an event by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the event does not exist.
    pub async fn get(&self, id: EventId) -> Result<Event, RepositoryError> {
        sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM shop.events WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Create an event.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(&self, draft: &EventDraft) -> Result<Event, RepositoryError> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "INSERT INTO shop.events \
                 (title, description, image_url, location, starts_at, ends_at, active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(draft.image_url.as_deref())
        .bind(&draft.location)
        .bind(draft.starts_at)
        .bind(draft.ends_at)
        .bind(draft.active)
        .fetch_one(self.pool)
        .await?;

        Ok(event)
    }

    /// Overwrite an event.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the event does not exist.
    pub async fn update(&self, id: EventId, draft: &EventDraft) -> Result<Event, RepositoryError> {
        sqlx::query_as::<_, Event>(&format!(
            "UPDATE shop.events \
             SET title = $2, description = $3, image_url = $4, location = $5, \
                 starts_at = $6, ends_at = $7, active = $8, updated_at = now() \
             WHERE id = $1 \
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(id)
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(draft.image_url.as_deref())
        .bind(&draft.location)
        .bind(draft.starts_at)
        .bind(draft.ends_at)
        .bind(draft.active)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete an event.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the event does not exist.
    pub async fn delete(&self, id: EventId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.events WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

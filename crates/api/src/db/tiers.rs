//! Commission tier repository.

use sqlx::PgPool;

use nutmart_core::{Rate, TierId};
use nutmart_core::commission::CommissionTier;

use super::RepositoryError;
use crate::models::affiliate::TierDraft;

#[derive(Debug, sqlx::FromRow)]
struct TierRow {
    id: TierId,
    name: String,
    rate: Rate,
    sort_order: i32,
}

impl From<TierRow> for CommissionTier {
    fn from(row: TierRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            rate: row.rate,
            sort_order: row.sort_order,
        }
    }
}

/// Repository for commission tier database operations.
pub struct TierRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> TierRepository<'a> {
    /// Create a new tier repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All tiers by sort order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<CommissionTier>, RepositoryError> {
        let rows = sqlx::query_as::<_, TierRow>(
            "SELECT id, name, rate, sort_order FROM shop.commission_tiers \
             ORDER BY sort_order, id",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(CommissionTier::from).collect())
    }

    /// Get a tier by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the tier does not exist.
    pub async fn get(&self, id: TierId) -> Result<CommissionTier, RepositoryError> {
        sqlx::query_as::<_, TierRow>(
            "SELECT id, name, rate, sort_order FROM shop.commission_tiers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .map(CommissionTier::from)
        .ok_or(RepositoryError::NotFound)
    }

    /// Create a tier.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the name is taken.
    pub async fn create(&self, draft: &TierDraft) -> Result<CommissionTier, RepositoryError> {
        let row = sqlx::query_as::<_, TierRow>(
            "INSERT INTO shop.commission_tiers (name, rate, sort_order) \
             VALUES ($1, $2, $3) \
             RETURNING id, name, rate, sort_order",
        )
        .bind(&draft.name)
        .bind(draft.rate)
        .bind(draft.sort_order)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "tier name already exists"))?;

        Ok(row.into())
    }

    /// Overwrite a tier. Agents in the tier earn the new rate on orders
    /// placed from now on.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the tier does not exist.
    /// Returns `RepositoryError::Conflict` if the name is taken.
    pub async fn update(
        &self,
        id: TierId,
        draft: &TierDraft,
    ) -> Result<CommissionTier, RepositoryError> {
        sqlx::query_as::<_, TierRow>(
            "UPDATE shop.commission_tiers \
             SET name = $2, rate = $3, sort_order = $4, updated_at = now() \
             WHERE id = $1 \
             RETURNING id, name, rate, sort_order",
        )
        .bind(id)
        .bind(&draft.name)
        .bind(draft.rate)
        .bind(draft.sort_order)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "tier name already exists"))?
        .map(CommissionTier::from)
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete a tier that no user or package references.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the tier does not exist.
    /// Returns `RepositoryError::Conflict` if the tier is still assigned.
    pub async fn delete(&self, id: TierId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.commission_tiers WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| RepositoryError::from_constraint(e, "tier is still assigned"))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

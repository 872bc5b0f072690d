//! Membership package repository.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use nutmart_core::{Money, PackageId, TierId};

use super::{RepositoryError, to_i32, to_u32};
use crate::models::catalog::{Package, PackageDraft};

const PACKAGE_COLUMNS: &str = "id, name, description, image_url, price, voucher_count, \
     voucher_value, voucher_min_order, voucher_valid_days, tier_id, sort_order, active, \
     created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct PackageRow {
    id: PackageId,
    name: String,
    description: String,
    image_url: Option<String>,
    price: Money,
    voucher_count: i32,
    voucher_value: Money,
    voucher_min_order: Money,
    voucher_valid_days: i32,
    tier_id: Option<TierId>,
    sort_order: i32,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PackageRow> for Package {
    type Error = RepositoryError;

    fn try_from(row: PackageRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            description: row.description,
            image_url: row.image_url,
            price: row.price,
            voucher_count: to_u32(row.voucher_count, "voucher_count")?,
            voucher_value: row.voucher_value,
            voucher_min_order: row.voucher_min_order,
            voucher_valid_days: to_u32(row.voucher_valid_days, "voucher_valid_days")?,
            tier_id: row.tier_id,
            sort_order: row.sort_order,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Repository for package database operations.
pub struct PackageRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PackageRepository<'a> {
    /// Create a new package repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List packages by sort order. With `include_inactive` false only
    /// packages on sale are returned.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, include_inactive: bool) -> Result<Vec<Package>, RepositoryError> {
        let rows = sqlx::query_as::<_, PackageRow>(&format!(
            "SELECT {PACKAGE_COLUMNS} FROM shop.packages \
             WHERE $1 OR active \
             ORDER BY sort_order, id"
        ))
        .bind(include_inactive)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Package::try_from).collect()
    }

    /// Get a package by ID, active or not.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the package does not exist.
    pub async fn get(&self, id: PackageId) -> Result<Package, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        get_package(&mut conn, id).await
    }

    /// Create a package.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the tier does not exist.
    pub async fn create(&self, draft: &PackageDraft) -> Result<Package, RepositoryError> {
        sqlx::query_as::<_, PackageRow>(&format!(
            "INSERT INTO shop.packages \
                 (name, description, image_url, price, voucher_count, voucher_value, \
                  voucher_min_order, voucher_valid_days, tier_id, sort_order, active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {PACKAGE_COLUMNS}"
        ))
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(draft.image_url.as_deref())
        .bind(draft.price)
        .bind(to_i32(draft.voucher_count, "voucher_count")?)
        .bind(draft.voucher_value)
        .bind(draft.voucher_min_order)
        .bind(to_i32(draft.voucher_valid_days, "voucher_valid_days")?)
        .bind(draft.tier_id)
        .bind(draft.sort_order)
        .bind(draft.active)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "tier does not exist"))?
        .try_into()
    }

    /// Overwrite a package. Orders already placed keep their totals.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the package does not exist.
    /// Returns `RepositoryError::Conflict` if the tier does not exist.
    pub async fn update(
        &self,
        id: PackageId,
        draft: &PackageDraft,
    ) -> Result<Package, RepositoryError> {
        sqlx::query_as::<_, PackageRow>(&format!(
            "UPDATE shop.packages \
             SET name = $2, description = $3, image_url = $4, price = $5, voucher_count = $6, \
                 voucher_value = $7, voucher_min_order = $8, voucher_valid_days = $9, \
                 tier_id = $10, sort_order = $11, active = $12, updated_at = now() \
             WHERE id = $1 \
             RETURNING {PACKAGE_COLUMNS}"
        ))
        .bind(id)
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(draft.image_url.as_deref())
        .bind(draft.price)
        .bind(to_i32(draft.voucher_count, "voucher_count")?)
        .bind(draft.voucher_value)
        .bind(draft.voucher_min_order)
        .bind(to_i32(draft.voucher_valid_days, "voucher_valid_days")?)
        .bind(draft.tier_id)
        .bind(draft.sort_order)
        .bind(draft.active)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "tier does not exist"))?
        .ok_or(RepositoryError::NotFound)?
        .try_into()
    }

    /// Delete a package.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the package does not exist.
    pub async fn delete(&self, id: PackageId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.packages WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

/// Load a package inside a transaction.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the package does not exist.
pub async fn get_package(
    conn: &mut PgConnection,
    id: PackageId,
) -> Result<Package, RepositoryError> {
    sqlx::query_as::<_, PackageRow>(&format!(
        "SELECT {PACKAGE_COLUMNS} FROM shop.packages WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(RepositoryError::NotFound)?
    .try_into()
}

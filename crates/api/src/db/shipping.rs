//! Shipping zone and settings repository.
//!
//! Zone writes go through the transaction steps below so the caller can lock
//! the zone table, validate the whole table with the change applied, and
//! only then write.

use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use nutmart_core::shipping::{WeightTier, ZoneRates};
use nutmart_core::{Money, ShippingZoneId};

use super::{RepositoryError, to_i32, to_u32};
use crate::models::shipping::{ShippingConfig, ZoneDraft};

const ZONE_COLUMNS: &str = "id, name, provinces, tiers, extra_step_grams, extra_step_fee";

#[derive(Debug, sqlx::FromRow)]
struct ZoneRow {
    id: ShippingZoneId,
    name: String,
    provinces: Vec<String>,
    tiers: Json<Vec<WeightTier>>,
    extra_step_grams: i32,
    extra_step_fee: Money,
}

impl TryFrom<ZoneRow> for ZoneRates {
    type Error = RepositoryError;

    fn try_from(row: ZoneRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            provinces: row.provinces,
            tiers: row.tiers.0,
            extra_step_grams: to_u32(row.extra_step_grams, "extra_step_grams")?,
            extra_step_fee: row.extra_step_fee,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SettingsRow {
    fallback_zone_id: Option<ShippingZoneId>,
    free_shipping_threshold: Option<Money>,
}

/// Repository for reading shipping configuration.
pub struct ShippingRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ShippingRepository<'a> {
    /// Create a new shipping repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Load every zone and the store-wide settings.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn load(&self) -> Result<ShippingConfig, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        load_config(&mut conn).await
    }
}

// =============================================================================
// Transaction steps
// =============================================================================

/// Block concurrent zone writes until the transaction ends.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the lock fails.
pub async fn lock_zones(conn: &mut PgConnection) -> Result<(), RepositoryError> {
    sqlx::query("LOCK TABLE shop.shipping_zones, shop.shipping_settings IN EXCLUSIVE MODE")
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Load every zone and the store-wide settings.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn load_config(conn: &mut PgConnection) -> Result<ShippingConfig, RepositoryError> {
    let rows = sqlx::query_as::<_, ZoneRow>(&format!(
        "SELECT {ZONE_COLUMNS} FROM shop.shipping_zones ORDER BY id"
    ))
    .fetch_all(&mut *conn)
    .await?;
    let zones = rows
        .into_iter()
        .map(ZoneRates::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    let settings = sqlx::query_as::<_, SettingsRow>(
        "SELECT fallback_zone_id, free_shipping_threshold FROM shop.shipping_settings",
    )
    .fetch_optional(&mut *conn)
    .await?;

    Ok(ShippingConfig {
        zones,
        fallback_zone_id: settings.as_ref().and_then(|s| s.fallback_zone_id),
        free_shipping_threshold: settings.and_then(|s| s.free_shipping_threshold),
    })
}

/// Next value of the zone ID sequence, so a new zone can be validated
/// under its real ID before it is inserted.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn next_zone_id(conn: &mut PgConnection) -> Result<ShippingZoneId, RepositoryError> {
    let id = sqlx::query_scalar::<_, ShippingZoneId>(
        "SELECT nextval(pg_get_serial_sequence('shop.shipping_zones', 'id'))::int4",
    )
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

/// Insert a zone under a reserved ID.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the name is taken.
pub async fn insert_zone(
    conn: &mut PgConnection,
    id: ShippingZoneId,
    draft: &ZoneDraft,
) -> Result<ZoneRates, RepositoryError> {
    sqlx::query_as::<_, ZoneRow>(&format!(
        "INSERT INTO shop.shipping_zones \
             (id, name, provinces, tiers, extra_step_grams, extra_step_fee) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING {ZONE_COLUMNS}"
    ))
    .bind(id)
    .bind(&draft.name)
    .bind(&draft.provinces)
    .bind(Json(&draft.tiers))
    .bind(to_i32(draft.extra_step_grams, "extra_step_grams")?)
    .bind(draft.extra_step_fee)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| RepositoryError::from_constraint(e, "zone name already exists"))?
    .try_into()
}

/// Overwrite a zone.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the zone does not exist.
/// Returns `RepositoryError::Conflict` if the name is taken.
pub async fn update_zone(
    conn: &mut PgConnection,
    id: ShippingZoneId,
    draft: &ZoneDraft,
) -> Result<ZoneRates, RepositoryError> {
    sqlx::query_as::<_, ZoneRow>(&format!(
        "UPDATE shop.shipping_zones \
         SET name = $2, provinces = $3, tiers = $4, extra_step_grams = $5, \
             extra_step_fee = $6, updated_at = now() \
         WHERE id = $1 \
         RETURNING {ZONE_COLUMNS}"
    ))
    .bind(id)
    .bind(&draft.name)
    .bind(&draft.provinces)
    .bind(Json(&draft.tiers))
    .bind(to_i32(draft.extra_step_grams, "extra_step_grams")?)
    .bind(draft.extra_step_fee)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| RepositoryError::from_constraint(e, "zone name already exists"))?
    .ok_or(RepositoryError::NotFound)?
    .try_into()
}

/// Delete a zone. A fallback pointing at it is cleared by the foreign key.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the zone does not exist.
pub async fn delete_zone(conn: &mut PgConnection, id: ShippingZoneId) -> Result<(), RepositoryError> {
    let result = sqlx::query("DELETE FROM shop.shipping_zones WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

/// Write the store-wide shipping settings.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the fallback zone does not exist.
pub async fn save_settings(
    conn: &mut PgConnection,
    fallback_zone_id: Option<ShippingZoneId>,
    free_shipping_threshold: Option<Money>,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO shop.shipping_settings (id, fallback_zone_id, free_shipping_threshold) \
         VALUES (TRUE, $1, $2) \
         ON CONFLICT (id) DO UPDATE \
         SET fallback_zone_id = EXCLUDED.fallback_zone_id, \
             free_shipping_threshold = EXCLUDED.free_shipping_threshold, \
             updated_at = now()",
    )
    .bind(fallback_zone_id)
    .bind(free_shipping_threshold)
    .execute(&mut *conn)
    .await
    .map_err(|e| RepositoryError::from_constraint(e, "fallback zone does not exist"))?;

    Ok(())
}

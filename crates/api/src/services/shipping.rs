//! Shipping table cache and shipping configuration writes.
//!
//! The validated `ShippingTable` is cached for 5 minutes and dropped after
//! every back-office write, so checkout reads it without touching the
//! database on most requests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::future::Cache;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, instrument};

use nutmart_core::ShippingZoneId;
use nutmart_core::shipping::{ShippingError, ShippingTable, ZoneRates};

use crate::db::RepositoryError;
use crate::db::shipping::{self as zones, ShippingRepository};
use crate::models::shipping::{ShippingConfig, ShippingSettingsInput, ZoneDraft};

/// Errors from loading or changing the shipping configuration.
#[derive(Debug, Error)]
pub enum ShippingServiceError {
    /// Database operation failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// The configuration (as stored, or with the change applied) is invalid.
    #[error(transparent)]
    Invalid(#[from] ShippingError),
}

/// Cache of the validated shipping table.
///
/// Entries are keyed by a generation that every invalidation bumps. A load
/// that started before a write can only fill the old generation's slot,
/// which no later reader asks for.
#[derive(Clone)]
pub struct ShippingCache {
    cache: Cache<u64, Arc<ShippingTable>>,
    generation: Arc<AtomicU64>,
}

impl Default for ShippingCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ShippingCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        let cache = Cache::builder()
            .max_capacity(2)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();
        Self {
            cache,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The current shipping table, loading it on a miss.
    ///
    /// # Errors
    ///
    /// Returns `ShippingServiceError` if loading fails or the stored
    /// configuration is invalid.
    pub async fn table(&self, pool: &PgPool) -> Result<Arc<ShippingTable>, ShippingServiceError> {
        self.get_or_load(|| async {
            let config = ShippingRepository::new(pool).load().await?;
            let table = ShippingTable::new(
                config.zones,
                config.fallback_zone_id,
                config.free_shipping_threshold,
            )?;
            Ok::<_, ShippingServiceError>(table)
        })
        .await
    }

    async fn get_or_load<F, Fut>(&self, load: F) -> Result<Arc<ShippingTable>, ShippingServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ShippingTable, ShippingServiceError>>,
    {
        let generation = self.generation.load(Ordering::Acquire);
        if let Some(table) = self.cache.get(&generation).await {
            return Ok(table);
        }

        debug!(generation, "Shipping table cache miss");
        let table = Arc::new(load().await?);
        if self.generation.load(Ordering::Acquire) == generation {
            self.cache.insert(generation, Arc::clone(&table)).await;
        }
        Ok(table)
    }

    /// Drop the cached table. Call after the write has committed.
    pub async fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }
}

/// Back-office shipping configuration writes.
pub struct ShippingService<'a> {
    pool: &'a PgPool,
    cache: &'a ShippingCache,
}

impl<'a> ShippingService<'a> {
    /// Create a new shipping service.
    #[must_use]
    pub const fn new(pool: &'a PgPool, cache: &'a ShippingCache) -> Self {
        Self { pool, cache }
    }

    /// The stored configuration, bypassing the cache.
    ///
    /// # Errors
    ///
    /// Returns `ShippingServiceError::Repository` if loading fails.
    pub async fn config(&self) -> Result<ShippingConfig, ShippingServiceError> {
        Ok(ShippingRepository::new(self.pool).load().await?)
    }

    /// Add a zone.
    ///
    /// # Errors
    ///
    /// Returns `ShippingServiceError::Invalid` if the zone's tiers are not
    /// ascending or one of its provinces already belongs to another zone.
    #[instrument(skip(self, draft), fields(zone = %draft.name))]
    pub async fn create_zone(&self, draft: &ZoneDraft) -> Result<ZoneRates, ShippingServiceError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        zones::lock_zones(&mut *tx).await?;

        let mut config = zones::load_config(&mut *tx).await?;
        let id = zones::next_zone_id(&mut *tx).await?;
        config.zones.push(draft.to_rates(id));
        validate(config)?;

        let zone = zones::insert_zone(&mut *tx, id, draft).await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        self.cache.invalidate().await;
        Ok(zone)
    }

    /// Replace a zone's name, provinces and tiers.
    ///
    /// # Errors
    ///
    /// Returns `ShippingServiceError::Repository` with `NotFound` if the zone
    /// does not exist, or `Invalid` if the result would be inconsistent.
    #[instrument(skip(self, draft), fields(zone_id = %id))]
    pub async fn replace_zone(
        &self,
        id: ShippingZoneId,
        draft: &ZoneDraft,
    ) -> Result<ZoneRates, ShippingServiceError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        zones::lock_zones(&mut *tx).await?;

        let mut config = zones::load_config(&mut *tx).await?;
        let slot = config
            .zones
            .iter_mut()
            .find(|z| z.id == id)
            .ok_or(RepositoryError::NotFound)?;
        *slot = draft.to_rates(id);
        validate(config)?;

        let zone = zones::update_zone(&mut *tx, id, draft).await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        self.cache.invalidate().await;
        Ok(zone)
    }

    /// Delete a zone. If it was the fallback, there is no fallback afterwards.
    ///
    /// # Errors
    ///
    /// Returns `ShippingServiceError::Repository` with `NotFound` if the zone
    /// does not exist.
    #[instrument(skip(self), fields(zone_id = %id))]
    pub async fn delete_zone(&self, id: ShippingZoneId) -> Result<(), ShippingServiceError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        zones::delete_zone(&mut *tx, id).await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        self.cache.invalidate().await;
        Ok(())
    }

    /// Set the fallback zone and free-shipping threshold.
    ///
    /// # Errors
    ///
    /// Returns `ShippingServiceError::Invalid` if the fallback zone does not
    /// exist.
    #[instrument(skip(self, input))]
    pub async fn save_settings(
        &self,
        input: &ShippingSettingsInput,
    ) -> Result<ShippingConfig, ShippingServiceError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        zones::lock_zones(&mut *tx).await?;

        let mut config = zones::load_config(&mut *tx).await?;
        config.fallback_zone_id = input.fallback_zone_id;
        config.free_shipping_threshold = input.free_shipping_threshold;
        validate(config.clone())?;

        zones::save_settings(&mut *tx, input.fallback_zone_id, input.free_shipping_threshold)
            .await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        self.cache.invalidate().await;
        Ok(config)
    }
}

/// Build a table from a configuration only to check it.
fn validate(config: ShippingConfig) -> Result<(), ShippingError> {
    ShippingTable::new(
        config.zones,
        config.fallback_zone_id,
        config.free_shipping_threshold,
    )
    .map(drop)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use nutmart_core::Money;
    use nutmart_core::shipping::WeightTier;

    use super::*;

    fn zone(id: i32, name: &str, provinces: &[&str]) -> ZoneRates {
        ZoneRates {
            id: ShippingZoneId::new(id),
            name: name.to_string(),
            provinces: provinces.iter().map(ToString::to_string).collect(),
            tiers: vec![WeightTier {
                max_grams: 1_000,
                fee: Money::from_dong(30_000),
            }],
            extra_step_grams: 500,
            extra_step_fee: Money::from_dong(5_000),
        }
    }

    #[test]
    fn test_validate_rejects_province_in_two_zones() {
        let config = ShippingConfig {
            zones: vec![
                zone(1, "Miền Nam", &["TP. Hồ Chí Minh"]),
                zone(2, "Nội thành", &["Hồ Chí Minh"]),
            ],
            fallback_zone_id: None,
            free_shipping_threshold: None,
        };
        assert!(matches!(
            validate(config),
            Err(ShippingError::DuplicateProvince { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_fallback() {
        let config = ShippingConfig {
            zones: vec![zone(1, "Miền Bắc", &["Hà Nội"])],
            fallback_zone_id: Some(ShippingZoneId::new(9)),
            free_shipping_threshold: Some(Money::from_dong(500_000)),
        };
        assert_eq!(
            validate(config),
            Err(ShippingError::UnknownFallbackZone(ShippingZoneId::new(9)))
        );
    }

    fn table(fee: i64) -> ShippingTable {
        let hanoi = ZoneRates {
            tiers: vec![WeightTier {
                max_grams: 1_000,
                fee: Money::from_dong(fee),
            }],
            ..zone(1, "Nội thành", &["Hà Nội"])
        };
        ShippingTable::new(vec![hanoi], None, None).unwrap()
    }

    async fn cached_fee(cache: &ShippingCache, fee: i64) -> Money {
        let table = cache.get_or_load(|| async move { Ok::<_, ShippingServiceError>(table(fee)) }).await.unwrap();
        table.quote("Hà Nội", 500, Money::ZERO).unwrap().fee
    }

    #[tokio::test]
    async fn test_serves_cached_table_until_invalidated() {
        let cache = ShippingCache::new();
        assert_eq!(cached_fee(&cache, 30_000).await, Money::from_dong(30_000));
        assert_eq!(cached_fee(&cache, 45_000).await, Money::from_dong(30_000));

        cache.invalidate().await;
        assert_eq!(cached_fee(&cache, 45_000).await, Money::from_dong(45_000));
    }

    #[tokio::test]
    async fn test_load_racing_a_write_is_not_cached() {
        let cache = ShippingCache::new();

        // The write commits and invalidates while this read is still loading
        let stale = cache
            .get_or_load(|| async {
                cache.invalidate().await;
                Ok::<_, ShippingServiceError>(table(30_000))
            })
            .await
            .unwrap();
        assert_eq!(
            stale.quote("Hà Nội", 500, Money::ZERO).unwrap().fee,
            Money::from_dong(30_000)
        );

        assert_eq!(cached_fee(&cache, 45_000).await, Money::from_dong(45_000));
    }
}

//! Seed the shipping configuration from a YAML file.
//!
//! The file lists zones in the same shape the back-office API accepts, plus
//! the store-wide settings. The fallback zone is named rather than numbered
//! because zone IDs are assigned on insert.
//!
//! ```yaml
//! free_shipping_threshold: 500000
//! fallback_zone: Toàn quốc
//! zones:
//!   - name: Nội thành
//!     provinces: [Hà Nội]
//!     tiers:
//!       - { max_grams: 1000, fee: 20000 }
//!     extra_step_grams: 500
//!     extra_step_fee: 5000
//! ```

use std::path::Path;

use serde::Deserialize;
use tracing::{error, info};

use nutmart_api::db;
use nutmart_api::models::{ShippingSettingsInput, ZoneDraft, ZoneInput};
use nutmart_api::services::shipping::{ShippingCache, ShippingService};
use nutmart_core::shipping::ShippingTable;
use nutmart_core::{Money, ShippingZoneId};

/// Contents of a shipping seed file.
#[derive(Debug, Deserialize)]
pub struct ShippingSeed {
    #[serde(default)]
    pub free_shipping_threshold: Option<Money>,
    #[serde(default)]
    pub fallback_zone: Option<String>,
    pub zones: Vec<ZoneInput>,
}

/// A seed file after validation.
#[derive(Debug)]
pub struct ValidatedSeed {
    zones: Vec<ZoneDraft>,
    fallback_index: Option<usize>,
    free_shipping_threshold: Option<Money>,
}

impl ShippingSeed {
    /// Check the file the same way the API checks a saved configuration.
    ///
    /// # Errors
    ///
    /// Returns a message for the first invalid zone, an unknown fallback
    /// zone or an inconsistent table.
    pub fn validate(self) -> Result<ValidatedSeed, String> {
        let zones = self
            .zones
            .into_iter()
            .map(ZoneInput::into_draft)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.to_string())?;

        let fallback_index = match &self.fallback_zone {
            Some(name) => Some(
                zones
                    .iter()
                    .position(|z| z.name == name.trim())
                    .ok_or_else(|| format!("fallback zone '{name}' is not in the file"))?,
            ),
            None => None,
        };

        let rates = zones
            .iter()
            .zip(1..)
            .map(|(zone, id)| zone.to_rates(ShippingZoneId::new(id)))
            .collect::<Vec<_>>();
        let fallback_id = fallback_index.and_then(|i| rates.get(i)).map(|z| z.id);
        ShippingTable::new(rates, fallback_id, self.free_shipping_threshold)
            .map_err(|e| e.to_string())?;

        Ok(ValidatedSeed {
            zones,
            fallback_index,
            free_shipping_threshold: self.free_shipping_threshold,
        })
    }
}

/// Load shipping zones and settings from a YAML file.
///
/// # Arguments
///
/// * `file_path` - Path to the YAML file
/// * `replace` - If true, delete the existing zones first
///
/// # Errors
///
/// Returns an error if the database URL is missing, the file cannot be read
/// or is invalid, or a database operation fails.
pub async fn shipping(file_path: &str, replace: bool) -> Result<(), Box<dyn std::error::Error>> {
    let database_url = super::database_url().ok_or("API_DATABASE_URL not set")?;

    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading shipping zones from file");

    // Read and validate before connecting to the database
    let content = tokio::fs::read_to_string(path).await?;
    let seed: ShippingSeed = serde_yaml::from_str(&content)?;
    info!(zones = seed.zones.len(), "Parsed configuration");

    let seed = seed.validate().inspect_err(|e| {
        error!("Configuration validation failed: {e}");
    })?;

    let pool = db::create_pool(&database_url).await?;
    info!("Connected to database");

    let cache = ShippingCache::new();
    let service = ShippingService::new(&pool, &cache);

    if replace {
        let existing = service.config().await?;
        for zone in existing.zones {
            service.delete_zone(zone.id).await?;
            info!(zone = %zone.name, "Deleted zone");
        }
    }

    let mut created = Vec::with_capacity(seed.zones.len());
    for draft in &seed.zones {
        let zone = service.create_zone(draft).await?;
        info!(zone_id = %zone.id, zone = %zone.name, "Created zone");
        created.push(zone.id);
    }

    let settings = ShippingSettingsInput {
        fallback_zone_id: seed.fallback_index.and_then(|i| created.get(i).copied()),
        free_shipping_threshold: seed.free_shipping_threshold,
    };
    service.save_settings(&settings).await?;

    info!(
        zones = created.len(),
        fallback = ?settings.fallback_zone_id,
        "Shipping configuration seeded"
    );
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SEED: &str = r"
free_shipping_threshold: 500000
fallback_zone: Toàn quốc
zones:
  - name: Nội thành
    provinces: [Hà Nội]
    tiers:
      - { max_grams: 1000, fee: 20000 }
  - name: Toàn quốc
    provinces: []
    tiers:
      - { max_grams: 1000, fee: 35000 }
      - { max_grams: 3000, fee: 50000 }
    extra_step_grams: 500
    extra_step_fee: 8000
";

    #[test]
    fn test_validate_resolves_fallback_by_name() {
        let seed: ShippingSeed = serde_yaml::from_str(SEED).unwrap();
        let seed = seed.validate().unwrap();
        assert_eq!(seed.zones.len(), 2);
        assert_eq!(seed.fallback_index, Some(1));
        assert_eq!(seed.free_shipping_threshold, Some(Money::from_dong(500_000)));
    }

    #[test]
    fn test_validate_rejects_unknown_fallback() {
        let seed: ShippingSeed =
            serde_yaml::from_str(&SEED.replace("fallback_zone: Toàn quốc", "fallback_zone: Miền Tây"))
                .unwrap();
        let err = seed.validate().unwrap_err();
        assert!(err.contains("Miền Tây"));
    }

    #[test]
    fn test_validate_rejects_duplicate_province() {
        let seed: ShippingSeed =
            serde_yaml::from_str(&SEED.replace("provinces: []", "provinces: [hà nội]")).unwrap();
        assert!(seed.validate().is_err());
    }

    #[test]
    fn test_bundled_seed_file_is_valid() {
        let content = include_str!("../../seeds/shipping.yaml");
        let seed: ShippingSeed = serde_yaml::from_str(content).unwrap();
        assert!(seed.validate().is_ok());
    }
}

//! Shipping configuration models.

use serde::{Deserialize, Serialize};

use nutmart_core::shipping::{WeightTier, ZoneRates};
use nutmart_core::{Money, ShippingZoneId};

use super::{ValidationError, required_text};

/// Full shipping configuration, as shown in the back-office.
#[derive(Debug, Clone, Serialize)]
pub struct ShippingConfig {
    pub zones: Vec<ZoneRates>,
    pub fallback_zone_id: Option<ShippingZoneId>,
    pub free_shipping_threshold: Option<Money>,
}

/// Zone create/replace form.
#[derive(Debug, Clone, Deserialize)]
pub struct ZoneInput {
    pub name: String,
    pub provinces: Vec<String>,
    pub tiers: Vec<WeightTier>,
    #[serde(default)]
    pub extra_step_grams: u32,
    #[serde(default)]
    pub extra_step_fee: Money,
}

/// Validated zone fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneDraft {
    pub name: String,
    pub provinces: Vec<String>,
    pub tiers: Vec<WeightTier>,
    pub extra_step_grams: u32,
    pub extra_step_fee: Money,
}

impl ZoneInput {
    /// Trim names and drop blank provinces.
    ///
    /// Tier ordering and province overlap are checked by building a
    /// `ShippingTable` with the zone in place.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for a blank zone name.
    pub fn into_draft(self) -> Result<ZoneDraft, ValidationError> {
        let name = required_text(&self.name, "name")?;
        let provinces = self
            .provinces
            .into_iter()
            .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|p| !p.is_empty())
            .collect();
        Ok(ZoneDraft {
            name,
            provinces,
            tiers: self.tiers,
            extra_step_grams: self.extra_step_grams,
            extra_step_fee: self.extra_step_fee,
        })
    }
}

impl ZoneDraft {
    /// The zone as it would price parcels under `id`.
    #[must_use]
    pub fn to_rates(&self, id: ShippingZoneId) -> ZoneRates {
        ZoneRates {
            id,
            name: self.name.clone(),
            provinces: self.provinces.clone(),
            tiers: self.tiers.clone(),
            extra_step_grams: self.extra_step_grams,
            extra_step_fee: self.extra_step_fee,
        }
    }
}

/// Store-wide shipping settings form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShippingSettingsInput {
    pub fallback_zone_id: Option<ShippingZoneId>,
    pub free_shipping_threshold: Option<Money>,
}

/// Storefront shipping quote request.
///
/// Either `weight_grams` or `items` gives the parcel weight; with `items`
/// the weight and subtotal are computed from the catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteRequest {
    pub province: String,
    pub weight_grams: Option<u32>,
    #[serde(default)]
    pub items: Vec<crate::services::checkout::CartLine>,
    pub subtotal: Option<Money>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_input_cleans_provinces() {
        let input: ZoneInput = serde_json::from_str(
            r#"{
                "name": " Miền Nam ",
                "provinces": ["  Cần   Thơ ", "", "Đồng Nai"],
                "tiers": [{"max_grams": 1000, "fee": "30000"}]
            }"#,
        )
        .unwrap();
        let draft = input.into_draft().unwrap();
        assert_eq!(draft.name, "Miền Nam");
        assert_eq!(draft.provinces, vec!["Cần Thơ", "Đồng Nai"]);
        assert_eq!(draft.extra_step_grams, 0);

        let rates = draft.to_rates(ShippingZoneId::new(0));
        assert!(rates.validate().is_ok());
    }
}

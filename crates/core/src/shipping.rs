//! Shipping fee calculation by zone and weight.
//!
//! The back-office groups provinces into zones. Each zone prices parcels by
//! weight tiers and charges a fixed step fee for every started step above its
//! heaviest tier. A store-wide free-shipping threshold waives the fee for
//! large orders.
//!
//! ```
//! use nutmart_core::shipping::{ShippingTable, WeightTier, ZoneRates};
//! use nutmart_core::{Money, ShippingZoneId};
//!
//! let hanoi = ZoneRates {
//!     id: ShippingZoneId::new(1),
//!     name: "Nội thành".to_string(),
//!     provinces: vec!["Hà Nội".to_string()],
//!     tiers: vec![
//!         WeightTier { max_grams: 500, fee: Money::from_dong(18_000) },
//!         WeightTier { max_grams: 2_000, fee: Money::from_dong(25_000) },
//!     ],
//!     extra_step_grams: 500,
//!     extra_step_fee: Money::from_dong(5_000),
//! };
//! let table = ShippingTable::new(vec![hanoi], None, None).unwrap();
//!
//! let quote = table.quote("ha noi", 2_600, Money::from_dong(300_000)).unwrap();
//! assert_eq!(quote.fee, Money::from_dong(35_000)); // 25k + two started 500g steps
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::text::fold_diacritics;
use crate::types::{Money, ShippingZoneId};

/// Province name prefixes that do not distinguish provinces.
const PROVINCE_PREFIXES: &[&str] = &["thanh pho ", "tinh ", "tp. ", "tp.", "tp "];

/// Errors from building a shipping table or quoting a fee.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ShippingError {
    /// A province is listed in two zones.
    #[error("province '{province}' is in both '{first_zone}' and '{second_zone}'")]
    DuplicateProvince {
        /// The province as written in the second zone.
        province: String,
        /// Zone that listed it first.
        first_zone: String,
        /// Zone that listed it again.
        second_zone: String,
    },
    /// A zone lists an empty province name.
    #[error("zone '{zone}' has an empty province name")]
    EmptyProvince {
        /// Zone name.
        zone: String,
    },
    /// A zone has no weight tiers.
    #[error("zone '{zone}' has no weight tiers")]
    EmptyTiers {
        /// Zone name.
        zone: String,
    },
    /// Weight tiers are not strictly ascending.
    #[error("weight tiers of zone '{zone}' must be strictly ascending")]
    TiersNotAscending {
        /// Zone name.
        zone: String,
    },
    /// The configured fallback zone does not exist.
    #[error("fallback zone {0} does not exist")]
    UnknownFallbackZone(ShippingZoneId),
    /// No zone covers the province and there is no fallback.
    #[error("no shipping zone covers '{province}'")]
    Unserviceable {
        /// The province as requested.
        province: String,
    },
}

/// Fee for parcels up to `max_grams` (inclusive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightTier {
    /// Heaviest parcel this tier covers, in grams.
    pub max_grams: u32,
    /// Fee for the tier.
    pub fee: Money,
}

/// A shipping zone with its provinces and weight pricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRates {
    /// Zone ID.
    pub id: ShippingZoneId,
    /// Display name ("Nội thành", "Miền Bắc", ...).
    pub name: String,
    /// Provinces covered, as entered by the admin.
    pub provinces: Vec<String>,
    /// Weight tiers, ascending by `max_grams`.
    pub tiers: Vec<WeightTier>,
    /// Step size above the heaviest tier; 0 disables the surcharge.
    pub extra_step_grams: u32,
    /// Fee per started step above the heaviest tier.
    pub extra_step_fee: Money,
}

impl ZoneRates {
    /// Check the zone on its own: non-empty provinces and ascending tiers.
    ///
    /// # Errors
    ///
    /// Returns `EmptyProvince`, `EmptyTiers` or `TiersNotAscending`.
    pub fn validate(&self) -> Result<(), ShippingError> {
        if self.provinces.iter().any(|p| normalize_province(p).is_empty()) {
            return Err(ShippingError::EmptyProvince {
                zone: self.name.clone(),
            });
        }
        if self.tiers.is_empty() {
            return Err(ShippingError::EmptyTiers {
                zone: self.name.clone(),
            });
        }
        if self.tiers.windows(2).any(|w| match w {
            [a, b] => a.max_grams >= b.max_grams,
            _ => false,
        }) {
            return Err(ShippingError::TiersNotAscending {
                zone: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Fee for a parcel of `weight_grams` in this zone.
    #[must_use]
    pub fn fee_for(&self, weight_grams: u32) -> Money {
        if let Some(tier) = self.tiers.iter().find(|t| weight_grams <= t.max_grams) {
            return tier.fee;
        }

        let Some(last) = self.tiers.last() else {
            return Money::ZERO;
        };
        if self.extra_step_grams == 0 {
            return last.fee;
        }

        let excess = weight_grams - last.max_grams;
        let steps = excess.div_ceil(self.extra_step_grams);
        last.fee + self.extra_step_fee.times(steps)
    }
}

/// Normalize a province name for comparison.
///
/// ```
/// use nutmart_core::shipping::normalize_province;
///
/// assert_eq!(normalize_province("TP. Hồ Chí Minh"), "ho chi minh");
/// assert_eq!(normalize_province("Thành phố  Hồ Chí Minh"), "ho chi minh");
/// assert_eq!(normalize_province("tỉnh Bình Phước"), "binh phuoc");
/// ```
#[must_use]
pub fn normalize_province(name: &str) -> String {
    let folded = fold_diacritics(name);
    let collapsed = folded.split_whitespace().collect::<Vec<_>>().join(" ");

    PROVINCE_PREFIXES
        .iter()
        .find_map(|prefix| collapsed.strip_prefix(prefix))
        .map_or(collapsed.clone(), |rest| rest.trim().to_string())
}

/// Result of a shipping fee quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingQuote {
    /// Zone that priced the parcel.
    pub zone_id: ShippingZoneId,
    /// Zone display name.
    pub zone_name: String,
    /// Weight that was priced.
    pub weight_grams: u32,
    /// Fee to charge.
    pub fee: Money,
    /// Whether the free-shipping threshold waived the fee.
    pub free_shipping: bool,
}

/// All zones plus store-wide shipping settings, validated.
#[derive(Debug, Clone)]
pub struct ShippingTable {
    zones: Vec<ZoneRates>,
    by_province: HashMap<String, usize>,
    fallback: Option<usize>,
    free_shipping_threshold: Option<Money>,
}

impl ShippingTable {
    /// Build a table, checking that every zone is valid and that no province
    /// belongs to more than one zone.
    ///
    /// # Errors
    ///
    /// Returns the first invariant violation found.
    pub fn new(
        zones: Vec<ZoneRates>,
        fallback_zone: Option<ShippingZoneId>,
        free_shipping_threshold: Option<Money>,
    ) -> Result<Self, ShippingError> {
        let mut by_province: HashMap<String, usize> = HashMap::new();

        for (index, zone) in zones.iter().enumerate() {
            zone.validate()?;
            for province in &zone.provinces {
                let key = normalize_province(province);
                if let Some(&existing) = by_province.get(&key) {
                    let first_zone = zones
                        .get(existing)
                        .map(|z| z.name.clone())
                        .unwrap_or_default();
                    return Err(ShippingError::DuplicateProvince {
                        province: province.clone(),
                        first_zone,
                        second_zone: zone.name.clone(),
                    });
                }
                by_province.insert(key, index);
            }
        }

        let fallback = match fallback_zone {
            Some(id) => Some(
                zones
                    .iter()
                    .position(|z| z.id == id)
                    .ok_or(ShippingError::UnknownFallbackZone(id))?,
            ),
            None => None,
        };

        Ok(Self {
            zones,
            by_province,
            fallback,
            free_shipping_threshold,
        })
    }

    /// All zones, in the order given.
    #[must_use]
    pub fn zones(&self) -> &[ZoneRates] {
        &self.zones
    }

    /// The free-shipping subtotal threshold, if any.
    #[must_use]
    pub const fn free_shipping_threshold(&self) -> Option<Money> {
        self.free_shipping_threshold
    }

    /// The zone covering `province`, else the fallback zone.
    #[must_use]
    pub fn zone_for(&self, province: &str) -> Option<&ZoneRates> {
        let index = self
            .by_province
            .get(&normalize_province(province))
            .copied()
            .or(self.fallback)?;
        self.zones.get(index)
    }

    /// Quote the shipping fee for a parcel.
    ///
    /// # Errors
    ///
    /// Returns `ShippingError::Unserviceable` if no zone covers the province.
    pub fn quote(
        &self,
        province: &str,
        weight_grams: u32,
        subtotal: Money,
    ) -> Result<ShippingQuote, ShippingError> {
        let zone = self
            .zone_for(province)
            .ok_or_else(|| ShippingError::Unserviceable {
                province: province.to_string(),
            })?;

        let free_shipping = self
            .free_shipping_threshold
            .is_some_and(|threshold| subtotal >= threshold);

        let fee = if free_shipping {
            Money::ZERO
        } else {
            zone.fee_for(weight_grams)
        };

        Ok(ShippingQuote {
            zone_id: zone.id,
            zone_name: zone.name.clone(),
            weight_grams,
            fee,
            free_shipping,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn tier(max_grams: u32, fee: i64) -> WeightTier {
        WeightTier {
            max_grams,
            fee: Money::from_dong(fee),
        }
    }

    fn zone(id: i32, name: &str, provinces: &[&str]) -> ZoneRates {
        ZoneRates {
            id: ShippingZoneId::new(id),
            name: name.to_string(),
            provinces: provinces.iter().map(ToString::to_string).collect(),
            tiers: vec![tier(500, 20_000), tier(1_000, 25_000), tier(3_000, 35_000)],
            extra_step_grams: 1_000,
            extra_step_fee: Money::from_dong(8_000),
        }
    }

    fn table() -> ShippingTable {
        ShippingTable::new(
            vec![
                zone(1, "Nội thành", &["Hà Nội", "TP. Hồ Chí Minh"]),
                zone(2, "Miền Trung", &["Đà Nẵng", "Thừa Thiên Huế"]),
                zone(3, "Toàn quốc", &[]),
            ],
            Some(ShippingZoneId::new(3)),
            Some(Money::from_dong(1_000_000)),
        )
        .unwrap()
    }

    #[test]
    fn test_zone_lookup_ignores_case_accents_and_prefixes() {
        let table = table();
        for input in ["Hà Nội", "ha noi", "HA NOI", "  hà   nội ", "Thành phố Hà Nội"] {
            assert_eq!(table.zone_for(input).unwrap().id.as_i32(), 1, "{input}");
        }
        assert_eq!(table.zone_for("Hồ Chí Minh").unwrap().id.as_i32(), 1);
        assert_eq!(table.zone_for("tp hue").map(|z| z.id.as_i32()), Some(3));
        assert_eq!(table.zone_for("Thua Thien Hue").unwrap().id.as_i32(), 2);
    }

    #[test]
    fn test_unknown_province_uses_fallback() {
        let table = table();
        let quote = table
            .quote("Cà Mau", 400, Money::from_dong(100_000))
            .unwrap();
        assert_eq!(quote.zone_id.as_i32(), 3);
        assert_eq!(quote.fee, Money::from_dong(20_000));
    }

    #[test]
    fn test_unknown_province_without_fallback_is_unserviceable() {
        let table = ShippingTable::new(vec![zone(1, "Nội thành", &["Hà Nội"])], None, None).unwrap();
        let err = table.quote("Cà Mau", 400, Money::ZERO).unwrap_err();
        assert_eq!(
            err,
            ShippingError::Unserviceable {
                province: "Cà Mau".to_string()
            }
        );
    }

    #[test]
    fn test_tier_boundaries_are_inclusive() {
        let table = table();
        let fee = |grams| table.quote("Hà Nội", grams, Money::ZERO).unwrap().fee;
        assert_eq!(fee(0), Money::from_dong(20_000));
        assert_eq!(fee(500), Money::from_dong(20_000));
        assert_eq!(fee(501), Money::from_dong(25_000));
        assert_eq!(fee(1_000), Money::from_dong(25_000));
        assert_eq!(fee(3_000), Money::from_dong(35_000));
    }

    #[test]
    fn test_overweight_charges_started_steps() {
        let table = table();
        let fee = |grams| table.quote("Đà Nẵng", grams, Money::ZERO).unwrap().fee;
        assert_eq!(fee(3_001), Money::from_dong(43_000));
        assert_eq!(fee(4_000), Money::from_dong(43_000));
        assert_eq!(fee(4_001), Money::from_dong(51_000));
    }

    #[test]
    fn test_overweight_without_step_caps_at_last_tier() {
        let mut capped = zone(1, "Nội thành", &["Hà Nội"]);
        capped.extra_step_grams = 0;
        assert_eq!(capped.fee_for(50_000), Money::from_dong(35_000));
    }

    #[test]
    fn test_free_shipping_threshold_is_inclusive() {
        let table = table();
        let below = table.quote("Hà Nội", 800, Money::from_dong(999_999)).unwrap();
        assert!(!below.free_shipping);
        assert_eq!(below.fee, Money::from_dong(25_000));

        let at = table
            .quote("Hà Nội", 800, Money::from_dong(1_000_000))
            .unwrap();
        assert!(at.free_shipping);
        assert_eq!(at.fee, Money::ZERO);
    }

    #[test]
    fn test_duplicate_province_across_zones_rejected() {
        let err = ShippingTable::new(
            vec![
                zone(1, "Nội thành", &["Hà Nội"]),
                zone(2, "Miền Bắc", &["ha noi"]),
            ],
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ShippingError::DuplicateProvince { ref first_zone, .. } if first_zone == "Nội thành"));
    }

    #[test]
    fn test_duplicate_province_within_zone_rejected() {
        let err = ShippingTable::new(vec![zone(1, "Nội thành", &["Hà Nội", "Hà  Nội"])], None, None)
            .unwrap_err();
        assert!(matches!(err, ShippingError::DuplicateProvince { .. }));
    }

    #[test]
    fn test_invalid_tiers_rejected() {
        let mut empty = zone(1, "A", &["Hà Nội"]);
        empty.tiers.clear();
        assert!(matches!(
            ShippingTable::new(vec![empty], None, None),
            Err(ShippingError::EmptyTiers { .. })
        ));

        let mut unordered = zone(1, "A", &["Hà Nội"]);
        unordered.tiers = vec![tier(1_000, 25_000), tier(1_000, 30_000)];
        assert!(matches!(
            ShippingTable::new(vec![unordered], None, None),
            Err(ShippingError::TiersNotAscending { .. })
        ));
    }

    #[test]
    fn test_empty_province_rejected() {
        let blank = zone(1, "A", &["  "]);
        assert!(matches!(
            blank.validate(),
            Err(ShippingError::EmptyProvince { .. })
        ));
    }

    #[test]
    fn test_unknown_fallback_rejected() {
        let err = ShippingTable::new(
            vec![zone(1, "A", &["Hà Nội"])],
            Some(ShippingZoneId::new(99)),
            None,
        )
        .unwrap_err();
        assert_eq!(err, ShippingError::UnknownFallbackZone(ShippingZoneId::new(99)));
    }
}

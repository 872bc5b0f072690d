//! Back-office shipping configuration.
//!
//! Every write goes through `ShippingService`, which validates the whole
//! table and drops the cached copy used by checkout.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use nutmart_core::ShippingZoneId;
use nutmart_core::shipping::ZoneRates;

use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::models::{ShippingConfig, ShippingSettingsInput, ZoneInput};
use crate::services::shipping::ShippingService;
use crate::state::AppState;

/// GET /api/admin/shipping
pub async fn config(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<Json<ShippingConfig>> {
    let config = ShippingService::new(state.pool(), state.shipping())
        .config()
        .await?;
    Ok(Json(config))
}

/// Fallback zone and free-shipping threshold.
///
/// PUT /api/admin/shipping
pub async fn save_settings(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Json(input): Json<ShippingSettingsInput>,
) -> Result<Json<ShippingConfig>> {
    let config = ShippingService::new(state.pool(), state.shipping())
        .save_settings(&input)
        .await?;
    Ok(Json(config))
}

/// POST /api/admin/shipping/zones
pub async fn create_zone(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Json(input): Json<ZoneInput>,
) -> Result<(StatusCode, Json<ZoneRates>)> {
    let draft = input.into_draft()?;
    let zone = ShippingService::new(state.pool(), state.shipping())
        .create_zone(&draft)
        .await?;
    Ok((StatusCode::CREATED, Json(zone)))
}

/// Replace a zone's name, provinces and tiers.
///
/// PUT /api/admin/shipping/zones/{id}
pub async fn replace_zone(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<ShippingZoneId>,
    Json(input): Json<ZoneInput>,
) -> Result<Json<ZoneRates>> {
    let draft = input.into_draft()?;
    let zone = ShippingService::new(state.pool(), state.shipping())
        .replace_zone(id, &draft)
        .await?;
    Ok(Json(zone))
}

/// DELETE /api/admin/shipping/zones/{id}
pub async fn delete_zone(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<ShippingZoneId>,
) -> Result<StatusCode> {
    ShippingService::new(state.pool(), state.shipping())
        .delete_zone(id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

//! Shipping quotes, referral links and order placement.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;
use tower_sessions::Session;
use tracing::instrument;

use nutmart_core::ReferralCode;
use nutmart_core::shipping::ShippingQuote;

use crate::db::UserRepository;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::{OptionalUser, RequireUser, remember_referral_code, remembered_referral_code};
use crate::models::{Order, QuoteRequest};
use crate::services::checkout::{Buyer, CheckoutInput, CheckoutService, PackageCheckoutInput};
use crate::state::AppState;

/// The agent behind a referral link.
#[derive(Debug, Serialize)]
pub struct ReferralInfo {
    pub code: ReferralCode,
    pub agent_name: String,
}

/// Shipping fee for a province and cart.
///
/// POST /api/shipping/quote
pub async fn quote(
    State(state): State<AppState>,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<ShippingQuote>> {
    let quote = CheckoutService::new(state.pool(), state.shipping(), &state.config().shop)
        .quote(&request)
        .await?;
    Ok(Json(quote))
}

/// Resolve a referral code and remember it for this visitor's checkout
/// and sign-up.
///
/// GET /api/referrals/{code}
#[instrument(skip(state, session))]
pub async fn referral(
    State(state): State<AppState>,
    session: Session,
    Path(code): Path<String>,
) -> Result<Json<ReferralInfo>> {
    let unknown = || AppError::NotFound("Unknown referral code".to_string());
    let code = ReferralCode::parse(&code).map_err(|_| unknown())?;
    let agent = UserRepository::new(state.pool())
        .get_agent_by_referral_code(&code)
        .await?
        .ok_or_else(unknown)?;

    remember_referral_code(&session, &code).await?;

    Ok(Json(ReferralInfo {
        code,
        agent_name: agent.full_name,
    }))
}

/// Place a product order, as a guest or a logged-in customer.
///
/// POST /api/checkout
pub async fn checkout(
    State(state): State<AppState>,
    session: Session,
    OptionalUser(user): OptionalUser,
    Json(input): Json<CheckoutInput>,
) -> Result<(StatusCode, Json<Order>)> {
    let buyer = Buyer {
        user_id: user.map(|u| u.id),
        link_code: remembered_referral_code(&session).await,
    };
    let order = CheckoutService::new(state.pool(), state.shipping(), &state.config().shop)
        .place_order(input, &buyer)
        .await?;

    add_breadcrumb("checkout", "Order placed", &[("code", order.code.as_str())]);
    Ok((StatusCode::CREATED, Json(order)))
}

/// Buy a package.
///
/// POST /api/checkout/package
pub async fn checkout_package(
    State(state): State<AppState>,
    session: Session,
    RequireUser(user): RequireUser,
    Json(input): Json<PackageCheckoutInput>,
) -> Result<(StatusCode, Json<Order>)> {
    let link_code = remembered_referral_code(&session).await;
    let order = CheckoutService::new(state.pool(), state.shipping(), &state.config().shop)
        .place_package_order(input, user.id, link_code.as_ref())
        .await?;

    add_breadcrumb("checkout", "Package order placed", &[("code", order.code.as_str())]);
    Ok((StatusCode::CREATED, Json(order)))
}

//! Back-office affiliate programme: commission tiers, voucher reward rules,
//! manual vouchers and withdrawal decisions.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{Duration, Utc};
use tracing::info;

use nutmart_core::codes::voucher_code;
use nutmart_core::commission::CommissionTier;
use nutmart_core::voucher::{RewardRule, Voucher};
use nutmart_core::{TierId, VoucherRuleId, VoucherSource, WithdrawalId};

use crate::db::vouchers::NewVoucherRecord;
use crate::db::{Page, PageRequest, TierRepository, VoucherRepository, WithdrawalRepository};
use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::models::{
    IssueVoucherInput, NewRewardRule, RewardRulePatch, TierDraft, TierPatch, Withdrawal,
    WithdrawalDecision,
};
use crate::routes::PageQuery;
use crate::routes::agent::WithdrawalQuery;
use crate::services::affiliate::AffiliateService;
use crate::state::AppState;

// =============================================================================
// Tiers
// =============================================================================

/// GET /api/admin/tiers
pub async fn list_tiers(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<Json<Vec<CommissionTier>>> {
    Ok(Json(TierRepository::new(state.pool()).list().await?))
}

/// POST /api/admin/tiers
pub async fn create_tier(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Json(input): Json<TierDraft>,
) -> Result<(StatusCode, Json<CommissionTier>)> {
    let draft = input.validate()?;
    let tier = TierRepository::new(state.pool()).create(&draft).await?;
    Ok((StatusCode::CREATED, Json(tier)))
}

/// PATCH /api/admin/tiers/{id}
pub async fn update_tier(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<TierId>,
    Json(patch): Json<TierPatch>,
) -> Result<Json<CommissionTier>> {
    let tiers = TierRepository::new(state.pool());
    let draft = patch.apply(tiers.get(id).await?)?;
    Ok(Json(tiers.update(id, &draft).await?))
}

/// Delete a tier no user or package still uses.
///
/// DELETE /api/admin/tiers/{id}
pub async fn delete_tier(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<TierId>,
) -> Result<StatusCode> {
    TierRepository::new(state.pool()).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Voucher reward rules
// =============================================================================

/// GET /api/admin/voucher-rules
pub async fn list_rules(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<Json<Vec<RewardRule>>> {
    Ok(Json(VoucherRepository::new(state.pool()).list_rules().await?))
}

/// POST /api/admin/voucher-rules
pub async fn create_rule(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Json(input): Json<NewRewardRule>,
) -> Result<(StatusCode, Json<RewardRule>)> {
    let draft = input.into_draft()?;
    let rule = VoucherRepository::new(state.pool())
        .create_rule(&draft)
        .await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

/// PATCH /api/admin/voucher-rules/{id}
pub async fn update_rule(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<VoucherRuleId>,
    Json(patch): Json<RewardRulePatch>,
) -> Result<Json<RewardRule>> {
    let vouchers = VoucherRepository::new(state.pool());
    let draft = patch.apply(vouchers.get_rule(id).await?)?;
    Ok(Json(vouchers.update_rule(id, &draft).await?))
}

/// DELETE /api/admin/voucher-rules/{id}
pub async fn delete_rule(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<VoucherRuleId>,
) -> Result<StatusCode> {
    VoucherRepository::new(state.pool()).delete_rule(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Vouchers
// =============================================================================

/// Every voucher, newest first.
///
/// GET /api/admin/vouchers?page=&per_page=
pub async fn list_vouchers(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Voucher>>> {
    let vouchers = VoucherRepository::new(state.pool())
        .list(query.request())
        .await?;
    Ok(Json(vouchers))
}

/// Issue a voucher to a user, or an unowned one when `user_id` is omitted.
///
/// POST /api/admin/vouchers
pub async fn issue_voucher(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(input): Json<IssueVoucherInput>,
) -> Result<(StatusCode, Json<Voucher>)> {
    let input = input.validate()?;
    let record = NewVoucherRecord {
        code: voucher_code(&mut rand::rng()),
        owner_id: input.user_id,
        value: input.value,
        min_order_total: input.min_order_total,
        source: VoucherSource::Admin,
        source_order_id: None,
        expires_at: Utc::now() + Duration::days(i64::from(input.valid_days)),
    };
    let voucher = VoucherRepository::new(state.pool()).issue(&record).await?;

    info!(admin_id = %admin.id, code = %voucher.code, "Voucher issued");
    Ok((StatusCode::CREATED, Json(voucher)))
}

// =============================================================================
// Withdrawals
// =============================================================================

/// GET /api/admin/withdrawals?status=&page=&per_page=
pub async fn list_withdrawals(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Query(query): Query<WithdrawalQuery>,
) -> Result<Json<Page<Withdrawal>>> {
    let page = PageRequest::new(query.page, query.per_page);
    let withdrawals = WithdrawalRepository::new(state.pool())
        .list(None, query.status, page)
        .await?;
    Ok(Json(withdrawals))
}

/// Mark a withdrawal as paid out.
///
/// POST /api/admin/withdrawals/{id}/approve
pub async fn approve_withdrawal(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<WithdrawalId>,
    Json(decision): Json<WithdrawalDecision>,
) -> Result<Json<Withdrawal>> {
    let withdrawal = AffiliateService::new(state.pool(), state.config())
        .approve_withdrawal(id, admin.id, &decision.note)
        .await?;
    Ok(Json(withdrawal))
}

/// Reject a withdrawal and refund the agent's wallet.
///
/// POST /api/admin/withdrawals/{id}/reject
pub async fn reject_withdrawal(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<WithdrawalId>,
    Json(decision): Json<WithdrawalDecision>,
) -> Result<Json<Withdrawal>> {
    let withdrawal = AffiliateService::new(state.pool(), state.config())
        .reject_withdrawal(id, admin.id, &decision.note)
        .await?;
    Ok(Json(withdrawal))
}

//! Agent dashboard: referred orders, commissions, collaborators and
//! withdrawals.
//!
//! Every handler requires the sale role and only sees the agent's own data.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;

use nutmart_core::voucher::month_bounds;
use nutmart_core::{UserId, WithdrawalStatus};

use crate::db::orders::OrderScope;
use crate::db::{
    CommissionRepository, OrderRepository, Page, PageRequest, UserRepository,
    WithdrawalRepository,
};
use crate::error::Result;
use crate::middleware::RequireAgent;
use crate::models::{
    AgentDashboard, AttachCollaboratorInput, Collaborator, CommissionEntry, NewWithdrawal, Order,
    OrderFilter, User, Withdrawal,
};
use crate::routes::PageQuery;
use crate::services::affiliate::AffiliateService;
use crate::state::AppState;

/// Withdrawal list query.
#[derive(Debug, Default, Deserialize)]
pub struct WithdrawalQuery {
    pub status: Option<WithdrawalStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// GET /api/agent/dashboard
pub async fn dashboard(
    State(state): State<AppState>,
    RequireAgent(agent): RequireAgent,
) -> Result<Json<AgentDashboard>> {
    let dashboard = AffiliateService::new(state.pool(), state.config())
        .dashboard(agent.id)
        .await?;
    Ok(Json(dashboard))
}

/// Orders the agent referred.
///
/// GET /api/agent/orders?status=&page=
pub async fn orders(
    State(state): State<AppState>,
    RequireAgent(agent): RequireAgent,
    Query(filter): Query<OrderFilter>,
) -> Result<Json<Page<Order>>> {
    let page = PageRequest::new(filter.page, filter.per_page);
    let orders = OrderRepository::new(state.pool())
        .list(OrderScope::Referrer(agent.id), &filter, page)
        .await?;
    Ok(Json(orders))
}

/// The agent's commission ledger.
///
/// GET /api/agent/commissions?page=
pub async fn commissions(
    State(state): State<AppState>,
    RequireAgent(agent): RequireAgent,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<CommissionEntry>>> {
    let entries = CommissionRepository::new(state.pool())
        .list_for(agent.id, query.request())
        .await?;
    Ok(Json(entries))
}

/// Collaborators with their sales this month.
///
/// GET /api/agent/collaborators
pub async fn collaborators(
    State(state): State<AppState>,
    RequireAgent(agent): RequireAgent,
) -> Result<Json<Vec<Collaborator>>> {
    let (start, end) = month_bounds(Utc::now());
    let collaborators = UserRepository::new(state.pool())
        .collaborators(agent.id, start, end)
        .await?;
    Ok(Json(collaborators))
}

/// Attach an existing customer by email.
///
/// POST /api/agent/collaborators
pub async fn attach_collaborator(
    State(state): State<AppState>,
    RequireAgent(agent): RequireAgent,
    Json(input): Json<AttachCollaboratorInput>,
) -> Result<(StatusCode, Json<User>)> {
    let user = AffiliateService::new(state.pool(), state.config())
        .attach_collaborator(agent.id, &input.email)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// DELETE /api/agent/collaborators/{id}
pub async fn detach_collaborator(
    State(state): State<AppState>,
    RequireAgent(agent): RequireAgent,
    Path(id): Path<UserId>,
) -> Result<StatusCode> {
    UserRepository::new(state.pool())
        .detach_collaborator(id, agent.id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/agent/withdrawals?status=&page=
pub async fn withdrawals(
    State(state): State<AppState>,
    RequireAgent(agent): RequireAgent,
    Query(query): Query<WithdrawalQuery>,
) -> Result<Json<Page<Withdrawal>>> {
    let page = PageRequest::new(query.page, query.per_page);
    let withdrawals = WithdrawalRepository::new(state.pool())
        .list(Some(agent.id), query.status, page)
        .await?;
    Ok(Json(withdrawals))
}

/// Request a payout of wallet balance.
///
/// POST /api/agent/withdrawals
pub async fn request_withdrawal(
    State(state): State<AppState>,
    RequireAgent(agent): RequireAgent,
    Json(input): Json<NewWithdrawal>,
) -> Result<(StatusCode, Json<Withdrawal>)> {
    let withdrawal = AffiliateService::new(state.pool(), state.config())
        .request_withdrawal(agent.id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(withdrawal)))
}

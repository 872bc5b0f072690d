//! Back-office orders and dashboard.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;

use nutmart_core::OrderId;
use nutmart_core::voucher::month_bounds;

use crate::db::orders::OrderScope;
use crate::db::{OrderRepository, Page, PageRequest};
use crate::error::{Result, add_breadcrumb};
use crate::middleware::RequireAdmin;
use crate::models::{Order, OrderDetail, OrderFilter, OrderStats, StatusChangeInput};
use crate::services::lifecycle::{Actor, LifecycleService};
use crate::state::AppState;

/// GET /api/admin/orders?status=&kind=&q=&from=&to=&page=&per_page=
pub async fn list_orders(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Query(filter): Query<OrderFilter>,
) -> Result<Json<Page<Order>>> {
    let page = PageRequest::new(filter.page, filter.per_page);
    let orders = OrderRepository::new(state.pool())
        .list(OrderScope::All, &filter, page)
        .await?;
    Ok(Json(orders))
}

/// GET /api/admin/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderDetail>> {
    let detail = OrderRepository::new(state.pool())
        .detail(id, OrderScope::All)
        .await?;
    Ok(Json(detail))
}

/// Move an order along its lifecycle.
///
/// PATCH /api/admin/orders/{id}/status
pub async fn change_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<OrderId>,
    Json(input): Json<StatusChangeInput>,
) -> Result<Json<Order>> {
    let order = LifecycleService::new(state.pool())
        .change_status(id, input.status, Actor::Admin(admin.id), &input.note)
        .await?;

    add_breadcrumb(
        "orders",
        "Order status changed",
        &[("code", order.code.as_str()), ("status", order.status.as_str())],
    );
    Ok(Json(order))
}

/// Order counts by status and this month's completed revenue.
///
/// GET /api/admin/dashboard
pub async fn dashboard(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<Json<OrderStats>> {
    let (start, end) = month_bounds(Utc::now());
    let stats = OrderRepository::new(state.pool()).stats(start, end).await?;
    Ok(Json(stats))
}

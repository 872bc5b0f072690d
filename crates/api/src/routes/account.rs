//! Customer account: own orders and vouchers.

use axum::{
    Json,
    extract::{Path, Query, State},
};

use nutmart_core::voucher::Voucher;
use nutmart_core::{OrderId, OrderStatus};

use crate::db::orders::OrderScope;
use crate::db::{OrderRepository, Page, PageRequest, VoucherRepository};
use crate::error::Result;
use crate::middleware::RequireUser;
use crate::models::{Order, OrderDetail, OrderFilter};
use crate::services::lifecycle::{Actor, LifecycleService};
use crate::state::AppState;

/// My orders, newest first.
///
/// GET /api/account/orders?status=&page=&per_page=
pub async fn orders(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Query(filter): Query<OrderFilter>,
) -> Result<Json<Page<Order>>> {
    let page = PageRequest::new(filter.page, filter.per_page);
    let orders = OrderRepository::new(state.pool())
        .list(OrderScope::Buyer(user.id), &filter, page)
        .await?;
    Ok(Json(orders))
}

/// One of my orders with items and history.
///
/// GET /api/account/orders/{id}
pub async fn order(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderDetail>> {
    let detail = OrderRepository::new(state.pool())
        .detail(id, OrderScope::Buyer(user.id))
        .await?;
    Ok(Json(detail))
}

/// Cancel one of my pending orders.
///
/// POST /api/account/orders/{id}/cancel
pub async fn cancel_order(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>> {
    let order = LifecycleService::new(state.pool())
        .change_status(
            id,
            OrderStatus::Cancelled,
            Actor::Customer(user.id),
            "Cancelled by customer",
        )
        .await?;
    Ok(Json(order))
}

/// My vouchers.
///
/// GET /api/account/vouchers
pub async fn vouchers(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Vec<Voucher>>> {
    let vouchers = VoucherRepository::new(state.pool())
        .list_for_owner(user.id)
        .await?;
    Ok(Json(vouchers))
}

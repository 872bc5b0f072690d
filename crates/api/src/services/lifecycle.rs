//! Order status changes and their side effects.
//!
//! A change is checked against the order state machine, then applied with an
//! update guarded by the status it was checked against. Side effects run in
//! the same transaction:
//!
//! - `cancelled`: stock goes back, the voucher becomes usable again and
//!   pending commissions are voided.
//! - `completed`: pending commissions are credited to wallets, a package
//!   order issues its vouchers and grants its tier, and the referring agent
//!   receives any reward vouchers their monthly sales just earned.

use chrono::{DateTime, Duration, Utc};
use sqlx::{PgConnection, PgPool};
use thiserror::Error;
use tracing::{info, instrument, warn};

use nutmart_core::codes::voucher_code;
use nutmart_core::commission::commission_base;
use nutmart_core::voucher::{RewardRule, month_bounds, month_start_date, newly_reached};
use nutmart_core::{
    Money, OrderId, OrderKind, OrderStatus, ReferralCode, TransitionError, UserId, VoucherSource,
};

use crate::db::RepositoryError;
use crate::db::commissions::{credit_for_order, void_for_order};
use crate::db::orders::{
    get_order, load_items, record_status, referred_sales, set_status,
};
use crate::db::packages::get_package;
use crate::db::products::restock;
use crate::db::users::{credit_wallet, lock_users, promote_to_agent};
use crate::db::vouchers::{
    NewVoucherRecord, RewardKey, active_rules, insert_reward, insert_voucher, release_for_order,
};
use crate::models::catalog::Package;
use crate::models::order::Order;

/// Errors that can occur while changing an order's status.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The state machine does not allow the change.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Someone else changed the status between our read and our update.
    #[error("order status was changed concurrently, reload and try again")]
    Concurrent,

    /// Database operation failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Who is changing the status.
#[derive(Debug, Clone, Copy)]
pub enum Actor {
    /// Back-office staff; any legal transition.
    Admin(UserId),
    /// The buyer; may only cancel their own pending order.
    Customer(UserId),
}

impl Actor {
    const fn user_id(self) -> UserId {
        match self {
            Self::Admin(id) | Self::Customer(id) => id,
        }
    }
}

/// Order lifecycle service.
pub struct LifecycleService<'a> {
    pool: &'a PgPool,
}

impl<'a> LifecycleService<'a> {
    /// Create a new lifecycle service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Move an order to `next`.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::Repository` with `NotFound` if the order does
    /// not exist (or is not the customer's), `Transition` if the change is
    /// not allowed, or `Concurrent` if the status moved under us.
    #[instrument(skip(self, note), fields(order_id = %id, next = %next))]
    pub async fn change_status(
        &self,
        id: OrderId,
        next: OrderStatus,
        actor: Actor,
        note: &str,
    ) -> Result<Order, LifecycleError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let order = get_order(&mut *tx, id).await?;
        let from = order.status;
        if let Actor::Customer(user) = actor {
            if order.user_id != Some(user) {
                return Err(RepositoryError::NotFound.into());
            }
            if next != OrderStatus::Cancelled {
                return Err(TransitionError { from, to: next }.into());
            }
        }
        from.transition(next)?;

        let now = Utc::now();
        if !set_status(&mut *tx, id, from, next, now).await? {
            return Err(LifecycleError::Concurrent);
        }
        record_status(&mut *tx, id, Some(from), next, Some(actor.user_id()), note.trim()).await?;

        match next {
            OrderStatus::Cancelled => on_cancelled(&mut *tx, &order).await?,
            OrderStatus::Completed => on_completed(&mut *tx, &order, now).await?,
            OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Shipping => {}
        }

        let order = get_order(&mut *tx, id).await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        info!(code = %order.code, from = %from, to = %next, "Order status changed");
        Ok(order)
    }
}

/// Undo what checkout reserved.
async fn on_cancelled(conn: &mut PgConnection, order: &Order) -> Result<(), RepositoryError> {
    if order.kind == OrderKind::Product {
        for item in load_items(conn, order.id).await? {
            if let Some(product_id) = item.product_id {
                restock(conn, product_id, item.quantity).await?;
            }
        }
    }
    release_for_order(conn, order.id).await?;
    void_for_order(conn, order.id).await
}

/// Pay out and reward a completed order.
async fn on_completed(
    conn: &mut PgConnection,
    order: &Order,
    now: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    for (beneficiary, amount) in credit_for_order(conn, order.id).await? {
        credit_wallet(conn, beneficiary, amount).await?;
    }

    if let (OrderKind::Package, Some(package_id), Some(buyer)) =
        (order.kind, order.package_id, order.user_id)
    {
        match get_package(conn, package_id).await {
            Ok(package) => grant_package(conn, &package, buyer, order.id, now).await?,
            Err(RepositoryError::NotFound) => {
                warn!(order_id = %order.id, package_id = %package_id, "Completed order's package no longer exists");
            }
            Err(e) => return Err(e),
        }
    }

    if let Some(agent) = order.referrer_id {
        issue_rewards(conn, agent, order, now).await?;
    }
    Ok(())
}

/// Issue a package's vouchers to the buyer and move them to its tier.
async fn grant_package(
    conn: &mut PgConnection,
    package: &Package,
    buyer: UserId,
    order: OrderId,
    now: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    for voucher in package_vouchers(package, buyer, order, now) {
        insert_voucher(conn, &voucher).await?;
    }

    if let Some(tier) = package.tier_id {
        let code = ReferralCode::generate(&mut rand::rng());
        promote_to_agent(conn, buyer, tier, &code).await?;
        info!(user_id = %buyer, tier_id = %tier, "Buyer promoted to sale agent");
    }
    Ok(())
}

/// The vouchers a completed package order issues.
fn package_vouchers(
    package: &Package,
    buyer: UserId,
    order: OrderId,
    now: DateTime<Utc>,
) -> Vec<NewVoucherRecord> {
    (0..package.voucher_count)
        .map(|_| NewVoucherRecord {
            code: voucher_code(&mut rand::rng()),
            owner_id: Some(buyer),
            value: package.voucher_value,
            min_order_total: package.voucher_min_order,
            source: VoucherSource::Package,
            source_order_id: Some(order),
            expires_at: expiry(now, package.voucher_valid_days),
        })
        .collect()
}

/// Issue reward vouchers for the rules the agent's monthly sales crossed
/// with this order.
///
/// The agent row stays locked until commit, so two of their orders
/// completing at once are summed one after the other and the second sees
/// the first.
async fn issue_rewards(
    conn: &mut PgConnection,
    agent: UserId,
    order: &Order,
    now: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    lock_users(conn, &[agent]).await?;
    let (start, end) = month_bounds(now);
    let after = referred_sales(conn, agent, start, end).await?;
    let rules = active_rules(conn).await?;

    for rule in crossed_rules(&rules, order, after) {
        let voucher = NewVoucherRecord {
            code: voucher_code(&mut rand::rng()),
            owner_id: Some(agent),
            value: rule.voucher_value,
            min_order_total: rule.voucher_min_order,
            source: VoucherSource::Reward,
            source_order_id: Some(order.id),
            expires_at: expiry(now, rule.valid_days),
        };
        let key = RewardKey {
            rule_id: rule.id,
            period: month_start_date(now),
        };
        if let Some(issued) = insert_reward(conn, &voucher, key).await? {
            info!(user_id = %agent, rule = %rule.name, code = %issued.code, "Reward voucher issued");
        }
    }
    Ok(())
}

/// Rules crossed by adding `order` to a month that now totals `after`.
fn crossed_rules<'r>(rules: &'r [RewardRule], order: &Order, after: Money) -> Vec<&'r RewardRule> {
    let before = after.saturating_sub(commission_base(order.subtotal, order.discount));
    newly_reached(rules, before, after)
}

fn expiry(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    now + Duration::days(i64::from(days))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use nutmart_core::{
        OrderId, PackageId, PaymentMethod, Phone, TierId, VoucherRuleId,
    };

    use super::*;
    use crate::models::order::ShippingAddress;

    fn order(subtotal: i64, discount: i64) -> Order {
        Order {
            id: OrderId::new(10),
            code: "NM241019-ABCDE".to_string(),
            kind: OrderKind::Product,
            user_id: Some(UserId::new(3)),
            package_id: None,
            contact_name: "Lan".to_string(),
            contact_phone: Phone::parse("0901234567").unwrap(),
            contact_email: None,
            address: ShippingAddress::default(),
            weight_grams: 500,
            subtotal: Money::from_dong(subtotal),
            shipping_fee: Money::from_dong(30_000),
            discount: Money::from_dong(discount),
            total: Money::from_dong(subtotal - discount + 30_000),
            payment_method: PaymentMethod::Cod,
            note: String::new(),
            voucher_code: None,
            referrer_id: Some(UserId::new(2)),
            status: OrderStatus::Shipping,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn rule(id: i32, threshold: i64) -> RewardRule {
        RewardRule {
            id: VoucherRuleId::new(id),
            name: format!("Mốc {threshold}"),
            threshold: Money::from_dong(threshold),
            voucher_value: Money::from_dong(100_000),
            voucher_min_order: Money::ZERO,
            valid_days: 30,
            active: true,
        }
    }

    #[test]
    fn test_crossed_rules_uses_sales_after_discount() {
        let rules = [rule(1, 5_000_000), rule(2, 10_000_000)];
        // 4.6M before, +500k - 100k discount = 5.0M after
        let crossed = crossed_rules(&rules, &order(500_000, 100_000), Money::from_dong(5_000_000));
        assert_eq!(crossed.len(), 1);
        assert_eq!(crossed[0].id, VoucherRuleId::new(1));

        // already past the first threshold before this order
        let crossed = crossed_rules(&rules, &order(200_000, 0), Money::from_dong(5_300_000));
        assert!(crossed.is_empty());
    }

    #[test]
    fn test_package_vouchers() {
        let package = Package {
            id: PackageId::new(1),
            name: "Gói Đại lý".to_string(),
            description: String::new(),
            image_url: None,
            price: Money::from_dong(2_000_000),
            voucher_count: 3,
            voucher_value: Money::from_dong(50_000),
            voucher_min_order: Money::from_dong(300_000),
            voucher_valid_days: 60,
            tier_id: Some(TierId::new(1)),
            sort_order: 0,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let now = Utc::now();
        let vouchers = package_vouchers(&package, UserId::new(3), OrderId::new(10), now);

        assert_eq!(vouchers.len(), 3);
        assert!(vouchers.iter().all(|v| v.owner_id == Some(UserId::new(3))
            && v.source == VoucherSource::Package
            && v.expires_at == now + Duration::days(60)
            && v.code.starts_with("VC-")));
    }

    #[test]
    fn test_actor_user_id() {
        assert_eq!(Actor::Admin(UserId::new(1)).user_id(), UserId::new(1));
        assert_eq!(Actor::Customer(UserId::new(4)).user_id(), UserId::new(4));
    }
}

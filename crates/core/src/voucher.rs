//! Voucher application and monthly reward rules.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Money, OrderId, UserId, VoucherId, VoucherRuleId, VoucherSource};

/// Vietnam's UTC offset in seconds. Vietnam has no daylight saving time.
const VIETNAM_OFFSET_SECS: i32 = 7 * 3600;

/// Reasons a voucher cannot be applied.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VoucherError {
    /// The voucher belongs to another customer.
    #[error("voucher belongs to another customer")]
    NotOwner,
    /// The voucher was already redeemed.
    #[error("voucher has already been used")]
    AlreadyUsed,
    /// The voucher expired.
    #[error("voucher has expired")]
    Expired,
    /// The order subtotal is below the voucher's minimum.
    #[error("order must be at least {minimum} to use this voucher")]
    BelowMinimum {
        /// Required subtotal.
        minimum: Money,
    },
}

/// A fixed-value discount voucher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voucher {
    /// Voucher ID.
    pub id: VoucherId,
    /// Code typed at checkout.
    pub code: String,
    /// Customer allowed to redeem it. `None` means anyone may.
    pub owner_id: Option<UserId>,
    /// Discount value.
    pub value: Money,
    /// Minimum order subtotal.
    pub min_order_total: Money,
    /// Why the voucher was issued.
    pub source: VoucherSource,
    /// Expiry instant.
    pub expires_at: DateTime<Utc>,
    /// When it was redeemed.
    pub used_at: Option<DateTime<Utc>>,
    /// The order that redeemed it.
    pub order_id: Option<OrderId>,
    /// Issue time.
    pub created_at: DateTime<Utc>,
}

impl Voucher {
    /// Whether the voucher has been redeemed.
    #[must_use]
    pub const fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    /// Whether the voucher has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Check the voucher against an order and return the discount.
    ///
    /// The discount is the voucher value, capped at the subtotal.
    ///
    /// # Errors
    ///
    /// Returns a [`VoucherError`] if the voucher cannot be used for this order.
    pub fn apply(
        &self,
        user: Option<UserId>,
        subtotal: Money,
        now: DateTime<Utc>,
    ) -> Result<Money, VoucherError> {
        if self.owner_id.is_some_and(|owner| user != Some(owner)) {
            return Err(VoucherError::NotOwner);
        }
        if self.is_used() {
            return Err(VoucherError::AlreadyUsed);
        }
        if self.is_expired(now) {
            return Err(VoucherError::Expired);
        }
        if subtotal < self.min_order_total {
            return Err(VoucherError::BelowMinimum {
                minimum: self.min_order_total,
            });
        }
        Ok(self.value.min(subtotal))
    }
}

/// A monthly sales target that rewards an agent with a voucher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardRule {
    /// Rule ID.
    pub id: VoucherRuleId,
    /// Display name.
    pub name: String,
    /// Completed sales needed in a month.
    pub threshold: Money,
    /// Value of the voucher awarded.
    pub voucher_value: Money,
    /// Minimum order for the awarded voucher.
    pub voucher_min_order: Money,
    /// Days the awarded voucher stays valid.
    pub valid_days: u32,
    /// Whether the rule is in effect.
    pub active: bool,
}

/// Active rules crossed when monthly sales move from `before` to `after`.
///
/// A rule is crossed when `before < threshold <= after`, so each rule
/// rewards at most once per month as sales only grow.
///
/// ```
/// use nutmart_core::Money;
/// use nutmart_core::voucher::{RewardRule, newly_reached};
/// use nutmart_core::VoucherRuleId;
///
/// let rule = RewardRule {
///     id: VoucherRuleId::new(1),
///     name: "5 triệu".to_string(),
///     threshold: Money::from_dong(5_000_000),
///     voucher_value: Money::from_dong(100_000),
///     voucher_min_order: Money::ZERO,
///     valid_days: 30,
///     active: true,
/// };
/// let rules = [rule];
/// let crossed = newly_reached(&rules, Money::from_dong(4_800_000), Money::from_dong(5_000_000));
/// assert_eq!(crossed.len(), 1);
/// ```
#[must_use]
pub fn newly_reached(rules: &[RewardRule], before: Money, after: Money) -> Vec<&RewardRule> {
    rules
        .iter()
        .filter(|r| r.active && before < r.threshold && r.threshold <= after)
        .collect()
}

fn vietnam() -> FixedOffset {
    FixedOffset::east_opt(VIETNAM_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// The calendar month containing `now` in Vietnam time, as UTC instants
/// `[start, end)`.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use nutmart_core::voucher::month_bounds;
///
/// // 17:30 UTC on 31 Oct is already 1 Nov in Vietnam
/// let now = Utc.with_ymd_and_hms(2024, 10, 31, 17, 30, 0).unwrap();
/// let (start, end) = month_bounds(now);
/// assert_eq!(start, Utc.with_ymd_and_hms(2024, 10, 31, 17, 0, 0).unwrap());
/// assert_eq!(end, Utc.with_ymd_and_hms(2024, 11, 30, 17, 0, 0).unwrap());
/// ```
#[must_use]
pub fn month_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let tz = vietnam();
    let first = month_start_date(now);
    let next = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    }
    .unwrap_or(first);

    (local_midnight(tz, first), local_midnight(tz, next))
}

/// The Vietnam calendar date at `now`.
#[must_use]
pub fn vietnam_date(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&vietnam()).date_naive()
}

/// First day of the Vietnam calendar month containing `now`.
///
/// Identifies the month a reward voucher was earned in.
#[must_use]
pub fn month_start_date(now: DateTime<Utc>) -> NaiveDate {
    let local = vietnam_date(now);
    local.with_day(1).unwrap_or(local)
}

fn local_midnight(tz: FixedOffset, date: NaiveDate) -> DateTime<Utc> {
    let naive = date.and_time(chrono::NaiveTime::MIN);
    tz.from_local_datetime(&naive)
        .single()
        .map_or_else(|| naive.and_utc(), |dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 19, 3, 0, 0).unwrap()
    }

    fn voucher(owner: Option<i32>) -> Voucher {
        Voucher {
            id: VoucherId::new(1),
            code: "VC-7KX2MPQ9RT".to_string(),
            owner_id: owner.map(UserId::new),
            value: Money::from_dong(50_000),
            min_order_total: Money::from_dong(200_000),
            source: VoucherSource::Package,
            expires_at: now() + Duration::days(30),
            used_at: None,
            order_id: None,
            created_at: now() - Duration::days(1),
        }
    }

    fn rule(id: i32, threshold: i64, active: bool) -> RewardRule {
        RewardRule {
            id: VoucherRuleId::new(id),
            name: format!("Mốc {threshold}"),
            threshold: Money::from_dong(threshold),
            voucher_value: Money::from_dong(100_000),
            voucher_min_order: Money::ZERO,
            valid_days: 30,
            active,
        }
    }

    #[test]
    fn test_apply_returns_value() {
        let discount = voucher(Some(1))
            .apply(Some(UserId::new(1)), Money::from_dong(250_000), now())
            .unwrap();
        assert_eq!(discount, Money::from_dong(50_000));
    }

    #[test]
    fn test_apply_caps_at_subtotal() {
        let mut v = voucher(None);
        v.value = Money::from_dong(500_000);
        v.min_order_total = Money::ZERO;
        let discount = v.apply(None, Money::from_dong(120_000), now()).unwrap();
        assert_eq!(discount, Money::from_dong(120_000));
    }

    #[test]
    fn test_apply_rejects_other_owner_and_guest() {
        let v = voucher(Some(1));
        assert_eq!(
            v.apply(Some(UserId::new(2)), Money::from_dong(250_000), now()),
            Err(VoucherError::NotOwner)
        );
        assert_eq!(
            v.apply(None, Money::from_dong(250_000), now()),
            Err(VoucherError::NotOwner)
        );
    }

    #[test]
    fn test_apply_rejects_used_and_expired() {
        let mut used = voucher(None);
        used.used_at = Some(now());
        assert_eq!(
            used.apply(None, Money::from_dong(250_000), now()),
            Err(VoucherError::AlreadyUsed)
        );

        let v = voucher(None);
        assert_eq!(
            v.apply(None, Money::from_dong(250_000), v.expires_at),
            Err(VoucherError::Expired)
        );
    }

    #[test]
    fn test_apply_minimum_is_inclusive() {
        let v = voucher(None);
        assert!(v.apply(None, Money::from_dong(200_000), now()).is_ok());
        assert_eq!(
            v.apply(None, Money::from_dong(199_999), now()),
            Err(VoucherError::BelowMinimum {
                minimum: Money::from_dong(200_000)
            })
        );
    }

    #[test]
    fn test_newly_reached_crosses_each_threshold_once() {
        let rules = vec![
            rule(1, 1_000_000, true),
            rule(2, 3_000_000, true),
            rule(3, 5_000_000, false),
        ];
        let ids = |before, after| {
            newly_reached(&rules, Money::from_dong(before), Money::from_dong(after))
                .iter()
                .map(|r| r.id.as_i32())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(0, 999_999), Vec::<i32>::new());
        assert_eq!(ids(900_000, 1_000_000), vec![1]);
        assert_eq!(ids(1_000_000, 2_000_000), Vec::<i32>::new());
        assert_eq!(ids(500_000, 6_000_000), vec![1, 2]);
    }

    #[test]
    fn test_month_bounds_mid_month() {
        let (start, end) = month_bounds(now());
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 9, 30, 17, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 10, 31, 17, 0, 0).unwrap());
        assert!(start <= now() && now() < end);
    }

    #[test]
    fn test_month_bounds_december_rolls_year() {
        let now = Utc.with_ymd_and_hms(2024, 12, 15, 0, 0, 0).unwrap();
        let (start, end) = month_bounds(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 11, 30, 17, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 12, 31, 17, 0, 0).unwrap());
    }

    #[test]
    fn test_month_start_date_uses_vietnam_calendar() {
        let late_utc = Utc.with_ymd_and_hms(2024, 10, 31, 17, 30, 0).unwrap();
        assert_eq!(
            month_start_date(late_utc),
            NaiveDate::from_ymd_opt(2024, 11, 1).unwrap()
        );
        assert_eq!(
            month_start_date(now()),
            NaiveDate::from_ymd_opt(2024, 10, 1).unwrap()
        );
    }
}

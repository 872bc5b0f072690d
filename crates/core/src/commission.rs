//! Commission rate resolution and manager rollup.
//!
//! An order referred by a sale agent earns the agent a `direct` commission at
//! their effective rate. If the agent has a manager with a higher effective
//! rate, the manager earns a `rollup` on the difference, so the combined
//! payout never exceeds the manager's own rate.

use serde::{Deserialize, Serialize};

use crate::types::{CommissionKind, Money, Rate, TierId, UserId};

/// Where an agent's effective rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    /// Personal override set by an admin.
    Personal,
    /// The agent's commission tier.
    Tier,
    /// The store-wide default.
    Default,
}

/// A resolved commission rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveRate {
    /// Rate in percent.
    pub rate: Rate,
    /// Which setting supplied it.
    pub source: RateSource,
}

/// A commission tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionTier {
    /// Tier ID.
    pub id: TierId,
    /// Display name ("Đồng", "Bạc", "Vàng", ...).
    pub name: String,
    /// Commission rate for agents in this tier.
    pub rate: Rate,
    /// Position in tier listings.
    pub sort_order: i32,
}

/// The rate settings of one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentRates {
    /// The agent.
    pub user_id: UserId,
    /// Personal override, if any.
    pub personal_rate: Option<Rate>,
    /// Rate of the agent's tier, if any.
    pub tier_rate: Option<Rate>,
}

impl AgentRates {
    /// Resolve the agent's effective rate.
    #[must_use]
    pub fn effective(&self, default: Rate) -> EffectiveRate {
        effective_rate(self.personal_rate, self.tier_rate, default)
    }
}

/// Resolve a commission rate: personal override, then tier, then default.
///
/// ```
/// use nutmart_core::commission::{RateSource, effective_rate};
/// use nutmart_core::Rate;
///
/// let resolved = effective_rate(None, Some(Rate::from_percent(8)), Rate::from_percent(5));
/// assert_eq!(resolved.rate, Rate::from_percent(8));
/// assert_eq!(resolved.source, RateSource::Tier);
/// ```
#[must_use]
pub fn effective_rate(personal: Option<Rate>, tier: Option<Rate>, default: Rate) -> EffectiveRate {
    match (personal, tier) {
        (Some(rate), _) => EffectiveRate {
            rate,
            source: RateSource::Personal,
        },
        (None, Some(rate)) => EffectiveRate {
            rate,
            source: RateSource::Tier,
        },
        (None, None) => EffectiveRate {
            rate: default,
            source: RateSource::Default,
        },
    }
}

/// One commission payout of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionShare {
    /// Who earns it.
    pub beneficiary: UserId,
    /// Direct or rollup.
    pub kind: CommissionKind,
    /// Rate applied to the base.
    pub rate: Rate,
    /// Amount in đồng.
    pub amount: Money,
}

/// The commissions an order will pay out once completed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionPlan {
    /// Commission base: subtotal after discount, shipping excluded.
    pub base: Money,
    /// Non-zero shares, direct first.
    pub shares: Vec<CommissionShare>,
}

impl CommissionPlan {
    /// Total paid across all shares.
    #[must_use]
    pub fn total(&self) -> Money {
        self.shares.iter().map(|s| s.amount).sum()
    }

    /// Whether nothing is paid.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }
}

/// Commission base of an order.
#[must_use]
pub fn commission_base(subtotal: Money, discount: Money) -> Money {
    subtotal.saturating_sub(discount)
}

/// Plan the commissions of an order referred by `seller`.
///
/// `buyer` is the ordering user, if logged in. Self-referred orders pay
/// nothing. A manager earns the positive difference between their rate and
/// the seller's.
#[must_use]
pub fn plan(
    base: Money,
    buyer: Option<UserId>,
    seller: &AgentRates,
    manager: Option<&AgentRates>,
    default: Rate,
) -> CommissionPlan {
    let mut shares = Vec::with_capacity(2);

    if buyer == Some(seller.user_id) {
        return CommissionPlan { base, shares };
    }

    let seller_rate = seller.effective(default).rate;
    shares.push(CommissionShare {
        beneficiary: seller.user_id,
        kind: CommissionKind::Direct,
        rate: seller_rate,
        amount: base.percent(seller_rate),
    });

    if let Some(manager) = manager.filter(|m| m.user_id != seller.user_id) {
        let differential = manager.effective(default).rate.saturating_sub(seller_rate);
        shares.push(CommissionShare {
            beneficiary: manager.user_id,
            kind: CommissionKind::Rollup,
            rate: differential,
            amount: base.percent(differential),
        });
    }

    shares.retain(|s| !s.amount.is_zero());
    CommissionPlan { base, shares }
}

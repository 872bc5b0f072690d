//! Affiliate models: tiers, commission ledger, withdrawals, reward rules and
//! collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nutmart_core::commission::EffectiveRate;
use nutmart_core::{
    CommissionEntryId, CommissionKind, CommissionStatus, Email, Money, OrderId, Rate,
    UserId, WithdrawalId, WithdrawalStatus,
};

use super::{ValidationError, required_text};

// =============================================================================
// Tiers
// =============================================================================

/// Validated tier fields.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TierDraft {
    pub name: String,
    pub rate: Rate,
    #[serde(default)]
    pub sort_order: i32,
}

impl TierDraft {
    /// Validate a tier form.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for a blank name.
    pub fn validate(self) -> Result<Self, ValidationError> {
        Ok(Self {
            name: required_text(&self.name, "name")?,
            ..self
        })
    }
}

/// Partial tier update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TierPatch {
    pub name: Option<String>,
    pub rate: Option<Rate>,
    pub sort_order: Option<i32>,
}

impl TierPatch {
    /// Apply the patch to an existing tier.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the merged tier is invalid.
    pub fn apply(
        self,
        current: nutmart_core::commission::CommissionTier,
    ) -> Result<TierDraft, ValidationError> {
        TierDraft {
            name: self.name.unwrap_or(current.name),
            rate: self.rate.unwrap_or(current.rate),
            sort_order: self.sort_order.unwrap_or(current.sort_order),
        }
        .validate()
    }
}

// =============================================================================
// Commission ledger
// =============================================================================

/// One commission payout.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CommissionEntry {
    pub id: CommissionEntryId,
    pub order_id: OrderId,
    pub order_code: String,
    pub beneficiary_id: UserId,
    pub kind: CommissionKind,
    pub rate: Rate,
    pub base_amount: Money,
    pub amount: Money,
    pub status: CommissionStatus,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Withdrawals
// =============================================================================

/// A withdrawal request.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Withdrawal {
    pub id: WithdrawalId,
    pub user_id: UserId,
    pub user_name: String,
    pub amount: Money,
    pub bank_name: String,
    pub account_number: String,
    pub account_holder: String,
    pub status: WithdrawalStatus,
    pub admin_note: String,
    pub processed_by: Option<UserId>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Withdrawal request form.
#[derive(Debug, Clone, Deserialize)]
pub struct NewWithdrawal {
    pub amount: Money,
    pub bank_name: String,
    pub account_number: String,
    pub account_holder: String,
}

impl NewWithdrawal {
    /// Validate the form against the minimum withdrawal.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for blank bank fields, non-digit account
    /// numbers or an amount below `minimum`.
    pub fn validate(self, minimum: Money) -> Result<Self, ValidationError> {
        if self.amount.is_zero() || self.amount < minimum {
            return Err(ValidationError::new(format!(
                "amount must be at least {minimum}"
            )));
        }
        let account_number: String = self
            .account_number
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if account_number.is_empty() || !account_number.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::new("account_number must contain only digits"));
        }
        Ok(Self {
            amount: self.amount,
            bank_name: required_text(&self.bank_name, "bank_name")?,
            account_number,
            account_holder: required_text(&self.account_holder, "account_holder")?.to_uppercase(),
        })
    }
}

/// Admin decision on a withdrawal.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WithdrawalDecision {
    #[serde(default)]
    pub note: String,
}

// =============================================================================
// Vouchers
// =============================================================================

/// Validated reward rule fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardRuleDraft {
    pub name: String,
    pub threshold: Money,
    pub voucher_value: Money,
    pub voucher_min_order: Money,
    pub valid_days: u32,
    pub active: bool,
}

impl RewardRuleDraft {
    fn validate(self) -> Result<Self, ValidationError> {
        let name = required_text(&self.name, "name")?;
        if self.threshold.is_zero() {
            return Err(ValidationError::new("threshold must be greater than zero"));
        }
        if self.voucher_value.is_zero() {
            return Err(ValidationError::new("voucher_value must be greater than zero"));
        }
        if self.valid_days == 0 {
            return Err(ValidationError::new("valid_days must be at least 1"));
        }
        Ok(Self { name, ..self })
    }
}

/// Reward rule creation form.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRewardRule {
    pub name: String,
    pub threshold: Money,
    pub voucher_value: Money,
    #[serde(default)]
    pub voucher_min_order: Money,
    #[serde(default = "default_valid_days")]
    pub valid_days: u32,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl NewRewardRule {
    /// Validate into a draft.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for zero amounts or validity.
    pub fn into_draft(self) -> Result<RewardRuleDraft, ValidationError> {
        RewardRuleDraft {
            name: self.name,
            threshold: self.threshold,
            voucher_value: self.voucher_value,
            voucher_min_order: self.voucher_min_order,
            valid_days: self.valid_days,
            active: self.active,
        }
        .validate()
    }
}

/// Partial reward rule update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RewardRulePatch {
    pub name: Option<String>,
    pub threshold: Option<Money>,
    pub voucher_value: Option<Money>,
    pub voucher_min_order: Option<Money>,
    pub valid_days: Option<u32>,
    pub active: Option<bool>,
}

impl RewardRulePatch {
    /// Apply the patch to an existing rule.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the merged rule is invalid.
    pub fn apply(
        self,
        current: nutmart_core::voucher::RewardRule,
    ) -> Result<RewardRuleDraft, ValidationError> {
        RewardRuleDraft {
            name: self.name.unwrap_or(current.name),
            threshold: self.threshold.unwrap_or(current.threshold),
            voucher_value: self.voucher_value.unwrap_or(current.voucher_value),
            voucher_min_order: self.voucher_min_order.unwrap_or(current.voucher_min_order),
            valid_days: self.valid_days.unwrap_or(current.valid_days),
            active: self.active.unwrap_or(current.active),
        }
        .validate()
    }
}

/// Manual voucher issue from the back-office.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueVoucherInput {
    /// Owner; `None` issues a voucher anyone can redeem.
    pub user_id: Option<UserId>,
    pub value: Money,
    #[serde(default)]
    pub min_order_total: Money,
    #[serde(default = "default_valid_days")]
    pub valid_days: u32,
}

impl IssueVoucherInput {
    /// Validate the form.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for a zero value or validity.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.value.is_zero() {
            return Err(ValidationError::new("value must be greater than zero"));
        }
        if self.valid_days == 0 {
            return Err(ValidationError::new("valid_days must be at least 1"));
        }
        Ok(self)
    }
}

// =============================================================================
// Agent dashboard
// =============================================================================

/// A collaborator as seen by their manager.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Collaborator {
    pub id: UserId,
    pub full_name: String,
    pub email: Email,
    pub referral_code: Option<String>,
    pub active: bool,
    /// Completed referred sales this month.
    pub month_sales: Money,
    pub created_at: DateTime<Utc>,
}

/// Attach an existing customer as a collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct AttachCollaboratorInput {
    pub email: String,
}

/// Agent dashboard summary.
#[derive(Debug, Clone, Serialize)]
pub struct AgentDashboard {
    pub referral_code: Option<String>,
    pub referral_link: Option<String>,
    pub wallet_balance: Money,
    pub pending_commission: Money,
    pub month_sales: Money,
    pub tier_name: Option<String>,
    pub effective_rate: EffectiveRate,
    pub collaborator_count: i64,
}

const fn default_true() -> bool {
    true
}

const fn default_valid_days() -> u32 {
    30
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn withdrawal(amount: i64) -> NewWithdrawal {
        NewWithdrawal {
            amount: Money::from_dong(amount),
            bank_name: "Vietcombank".to_string(),
            account_number: "0071 0004 56789".to_string(),
            account_holder: "Nguyễn Văn An".to_string(),
        }
    }

    #[test]
    fn test_withdrawal_minimum() {
        let min = Money::from_dong(100_000);
        assert!(withdrawal(99_999).validate(min).is_err());
        let ok = withdrawal(100_000).validate(min).unwrap();
        assert_eq!(ok.account_number, "0071000456789");
        assert_eq!(ok.account_holder, "NGUYỄN VĂN AN");
    }

    #[test]
    fn test_withdrawal_account_number_digits_only() {
        let mut w = withdrawal(200_000);
        w.account_number = "VCB-123".to_string();
        assert!(w.validate(Money::from_dong(100_000)).is_err());
    }

    #[test]
    fn test_reward_rule_validation() {
        let rule: NewRewardRule = serde_json::from_str(
            r#"{"name": "Mốc 10 triệu", "threshold": "10000000", "voucher_value": "200000"}"#,
        )
        .unwrap();
        let draft = rule.into_draft().unwrap();
        assert_eq!(draft.valid_days, 30);
        assert!(draft.active);

        let zero: NewRewardRule =
            serde_json::from_str(r#"{"name": "x", "threshold": 0, "voucher_value": 1}"#).unwrap();
        assert!(zero.into_draft().is_err());
    }

    #[test]
    fn test_tier_rate_out_of_range_is_rejected_by_serde() {
        let result: Result<TierDraft, _> =
            serde_json::from_str(r#"{"name": "Kim cương", "rate": "101"}"#);
        assert!(result.is_err());
    }
}

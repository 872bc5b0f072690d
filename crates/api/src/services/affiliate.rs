//! Agent network: dashboards, collaborators, withdrawals and the admin
//! changes that shape who earns what.

use chrono::Utc;
use sqlx::{PgConnection, PgPool};
use thiserror::Error;
use tracing::{info, instrument};

use nutmart_core::voucher::month_bounds;
use nutmart_core::{Email, ReferralCode, UserId, UserRole, WithdrawalId, WithdrawalStatus};

use crate::config::ApiConfig;
use crate::db::RepositoryError;
use crate::db::commissions::CommissionRepository;
use crate::db::orders::referred_sales;
use crate::db::users::{
    UserRepository, UserUpdate, attach_collaborator, credit_wallet, debit_wallet, load_agent,
    lock_users, manager_chain, update_user,
};
use crate::db::withdrawals::{decide, get_withdrawal, insert_withdrawal};
use crate::models::affiliate::{AgentDashboard, NewWithdrawal, Withdrawal};
use crate::models::user::{User, UserPatch};
use crate::models::{ValidationError, required_text};

/// Errors from agent and withdrawal operations.
#[derive(Debug, Error)]
pub enum AffiliateError {
    /// A form field is missing or malformed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The wallet does not cover the withdrawal.
    #[error("wallet balance is too low for this withdrawal")]
    InsufficientBalance,

    /// The withdrawal was already approved or rejected.
    #[error("withdrawal has already been processed")]
    AlreadyProcessed,

    /// The requested manager cannot manage this user.
    #[error("invalid manager: {0}")]
    InvalidManager(&'static str),

    /// No account has the given email.
    #[error("no customer with that email")]
    UnknownUser,

    /// Database operation failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Affiliate service.
pub struct AffiliateService<'a> {
    pool: &'a PgPool,
    config: &'a ApiConfig,
}

impl<'a> AffiliateService<'a> {
    /// Create a new affiliate service.
    #[must_use]
    pub const fn new(pool: &'a PgPool, config: &'a ApiConfig) -> Self {
        Self { pool, config }
    }

    /// Summary for the agent dashboard.
    ///
    /// # Errors
    ///
    /// Returns `AffiliateError::Repository` with `NotFound` if the agent
    /// does not exist.
    pub async fn dashboard(&self, agent: UserId) -> Result<AgentDashboard, AffiliateError> {
        let users = UserRepository::new(self.pool);
        let user = users.get_by_id(agent).await?.ok_or(RepositoryError::NotFound)?;
        let record = users.agent(agent).await?.ok_or(RepositoryError::NotFound)?;

        let (start, end) = month_bounds(Utc::now());
        let month_sales = {
            let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
            referred_sales(&mut conn, agent, start, end).await?
        };

        Ok(AgentDashboard {
            referral_link: user
                .referral_code
                .as_deref()
                .map(|code| self.config.referral_link(code)),
            referral_code: user.referral_code,
            wallet_balance: user.wallet_balance,
            pending_commission: CommissionRepository::new(self.pool)
                .pending_total(agent)
                .await?,
            month_sales,
            tier_name: users.tier_name(agent).await?,
            effective_rate: record.rates.effective(self.config.shop.default_commission_rate),
            collaborator_count: users.count_collaborators(agent).await?,
        })
    }

    /// Attach an existing account as a collaborator of `manager`.
    ///
    /// # Errors
    ///
    /// Returns `AffiliateError::UnknownUser` if no account has the email, or
    /// `Repository` with `Conflict` if it cannot be attached.
    #[instrument(skip(self, email), fields(manager_id = %manager))]
    pub async fn attach_collaborator(
        &self,
        manager: UserId,
        email: &str,
    ) -> Result<User, AffiliateError> {
        let email = Email::parse(&required_text(email, "email")?)
            .map_err(|e| ValidationError::new(e.to_string()))?;
        let users = UserRepository::new(self.pool);
        let user = users
            .get_by_email(&email)
            .await?
            .ok_or(AffiliateError::UnknownUser)?;

        let code = ReferralCode::generate(&mut rand::rng());
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        check_manager(&mut *tx, user.id, manager).await?;
        let user = attach_collaborator(&mut *tx, user.id, manager, &code).await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        info!(user_id = %user.id, "Collaborator attached");
        Ok(user)
    }

    /// Request a withdrawal. The amount leaves the wallet immediately and
    /// returns if an admin rejects the request.
    ///
    /// # Errors
    ///
    /// Returns `AffiliateError::Validation` for a bad form or an amount
    /// below the minimum, or `InsufficientBalance` if the wallet is short.
    #[instrument(skip(self, request), fields(user_id = %agent))]
    pub async fn request_withdrawal(
        &self,
        agent: UserId,
        request: NewWithdrawal,
    ) -> Result<Withdrawal, AffiliateError> {
        let request = request.validate(self.config.shop.min_withdrawal)?;

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        if !debit_wallet(&mut *tx, agent, request.amount).await? {
            return Err(AffiliateError::InsufficientBalance);
        }
        let withdrawal = insert_withdrawal(&mut *tx, agent, &request).await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        info!(withdrawal_id = %withdrawal.id, amount = %withdrawal.amount, "Withdrawal requested");
        Ok(withdrawal)
    }

    /// Approve a pending withdrawal; the money has been paid out by bank
    /// transfer.
    ///
    /// # Errors
    ///
    /// Returns `AffiliateError::AlreadyProcessed` if it is not pending.
    pub async fn approve_withdrawal(
        &self,
        id: WithdrawalId,
        admin: UserId,
        note: &str,
    ) -> Result<Withdrawal, AffiliateError> {
        self.decide(id, WithdrawalStatus::Approved, admin, note).await
    }

    /// Reject a pending withdrawal and refund the wallet.
    ///
    /// # Errors
    ///
    /// Returns `AffiliateError::AlreadyProcessed` if it is not pending.
    pub async fn reject_withdrawal(
        &self,
        id: WithdrawalId,
        admin: UserId,
        note: &str,
    ) -> Result<Withdrawal, AffiliateError> {
        self.decide(id, WithdrawalStatus::Rejected, admin, note).await
    }

    #[instrument(skip(self, note), fields(withdrawal_id = %id, status = %status))]
    async fn decide(
        &self,
        id: WithdrawalId,
        status: WithdrawalStatus,
        admin: UserId,
        note: &str,
    ) -> Result<Withdrawal, AffiliateError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let Some((agent, amount)) = decide(&mut *tx, id, status, admin, note.trim()).await? else {
            // distinguish a missing withdrawal from a decided one
            get_withdrawal(&mut *tx, id).await?;
            return Err(AffiliateError::AlreadyProcessed);
        };
        if status == WithdrawalStatus::Rejected {
            credit_wallet(&mut *tx, agent, amount).await?;
        }

        let withdrawal = get_withdrawal(&mut *tx, id).await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        info!(amount = %amount, "Withdrawal processed");
        Ok(withdrawal)
    }

    /// Apply an admin's changes to a user.
    ///
    /// A user made a sale agent without a referral code gets one. A newly
    /// assigned manager must be another active sale agent and may not sit
    /// below the user in the management chain. Other edits leave an existing
    /// manager alone even if that agent has since been deactivated.
    ///
    /// # Errors
    ///
    /// Returns `AffiliateError::InvalidManager` for a bad manager, or
    /// `Repository` with `NotFound` if the user does not exist.
    #[instrument(skip(self, patch), fields(user_id = %id))]
    pub async fn update_user(&self, id: UserId, patch: UserPatch) -> Result<User, AffiliateError> {
        let users = UserRepository::new(self.pool);
        let current = users.get_by_id(id).await?.ok_or(RepositoryError::NotFound)?;

        let new_manager = manager_change(&current, &patch);
        let update = merge_patch(current, patch, || {
            ReferralCode::generate(&mut rand::rng()).into_inner()
        })?;

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        if let Some(manager) = new_manager {
            check_manager(&mut *tx, id, manager).await?;
        }
        let user = update_user(&mut *tx, id, &update).await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        info!(role = %user.role, active = user.active, "User updated");
        Ok(user)
    }
}

/// Lock both users, then refuse a manager who is not an active sale agent or
/// who is `user` or sits below `user` in the management chain.
async fn check_manager(
    conn: &mut PgConnection,
    user: UserId,
    manager: UserId,
) -> Result<(), AffiliateError> {
    if manager == user {
        return Err(AffiliateError::InvalidManager("a user cannot manage themselves"));
    }
    lock_users(conn, &[user, manager]).await?;

    let is_agent = load_agent(conn, manager)
        .await?
        .is_some_and(|m| m.is_active_agent());
    if !is_agent {
        return Err(AffiliateError::InvalidManager("manager must be an active sale agent"));
    }
    if manager_chain(conn, manager).await?.contains(&user) {
        return Err(AffiliateError::InvalidManager(
            "manager is already managed by this user",
        ));
    }
    Ok(())
}

/// The manager a patch assigns, if it differs from the current one.
fn manager_change(current: &User, patch: &UserPatch) -> Option<UserId> {
    match patch.manager_id {
        Some(Some(manager)) if current.manager_id != Some(manager) => Some(manager),
        _ => None,
    }
}

/// Merge an admin patch into the stored user.
fn merge_patch(
    current: User,
    patch: UserPatch,
    new_code: impl FnOnce() -> String,
) -> Result<UserUpdate, ValidationError> {
    let full_name = match patch.full_name {
        Some(name) => required_text(&name, "full_name")?,
        None => current.full_name,
    };
    let role = patch.role.unwrap_or(current.role);
    let referral_code = match current.referral_code {
        Some(code) => Some(code),
        None if role == UserRole::Sale => Some(new_code()),
        None => None,
    };

    Ok(UserUpdate {
        full_name,
        role,
        referral_code,
        tier_id: patch.tier_id.unwrap_or(current.tier_id),
        personal_rate: patch.personal_rate.unwrap_or(current.personal_rate),
        manager_id: patch.manager_id.unwrap_or(current.manager_id),
        active: patch.active.unwrap_or(current.active),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use nutmart_core::{Money, Rate, TierId};

    use super::*;

    fn customer() -> User {
        User {
            id: UserId::new(5),
            email: Email::parse("lan@example.vn").unwrap(),
            full_name: "Trần Thị Lan".to_string(),
            phone: None,
            role: UserRole::Customer,
            referral_code: None,
            referred_by: None,
            tier_id: None,
            personal_rate: Some(Rate::from_percent(7)),
            manager_id: Some(UserId::new(2)),
            wallet_balance: Money::ZERO,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_merge_patch_keeps_omitted_and_clears_null() {
        let patch: UserPatch =
            serde_json::from_str(r#"{"tier_id": 3, "personal_rate": null}"#).unwrap();
        let update = merge_patch(customer(), patch, || unreachable!()).unwrap();

        assert_eq!(update.tier_id, Some(TierId::new(3)));
        assert_eq!(update.personal_rate, None);
        assert_eq!(update.manager_id, Some(UserId::new(2)));
        assert_eq!(update.full_name, "Trần Thị Lan");
        assert_eq!(update.referral_code, None);
    }

    #[test]
    fn test_merge_patch_gives_new_agents_a_code() {
        let patch: UserPatch = serde_json::from_str(r#"{"role": "sale"}"#).unwrap();
        let update = merge_patch(customer(), patch, || "HATDIEU1".to_string()).unwrap();
        assert_eq!(update.role, UserRole::Sale);
        assert_eq!(update.referral_code.as_deref(), Some("HATDIEU1"));
    }

    #[test]
    fn test_manager_checked_only_when_patch_changes_it() {
        let patch = |json: &str| serde_json::from_str::<UserPatch>(json).unwrap();

        assert_eq!(manager_change(&customer(), &patch(r#"{"full_name": "Lan"}"#)), None);
        assert_eq!(manager_change(&customer(), &patch(r#"{"active": false}"#)), None);
        assert_eq!(manager_change(&customer(), &patch(r#"{"manager_id": 2}"#)), None);
        assert_eq!(manager_change(&customer(), &patch(r#"{"manager_id": null}"#)), None);
        assert_eq!(
            manager_change(&customer(), &patch(r#"{"manager_id": 9}"#)),
            Some(UserId::new(9))
        );
    }

    #[test]
    fn test_merge_patch_rejects_blank_name() {
        let patch: UserPatch = serde_json::from_str(r#"{"full_name": "  "}"#).unwrap();
        assert!(merge_patch(customer(), patch, String::new).is_err());
    }
}

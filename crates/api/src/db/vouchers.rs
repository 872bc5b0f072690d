//! Voucher and voucher reward rule repository.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgConnection, PgPool};

use nutmart_core::voucher::{RewardRule, Voucher};
use nutmart_core::{Money, OrderId, UserId, VoucherId, VoucherRuleId, VoucherSource};

use super::{Page, PageRequest, RepositoryError, to_i32, to_u32};
use crate::models::affiliate::RewardRuleDraft;

const VOUCHER_COLUMNS: &str =
    "id, code, owner_id, value, min_order_total, source, expires_at, used_at, order_id, created_at";

const RULE_COLUMNS: &str =
    "id, name, threshold, voucher_value, voucher_min_order, valid_days, active";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct VoucherRow {
    id: VoucherId,
    code: String,
    owner_id: Option<UserId>,
    value: Money,
    min_order_total: Money,
    source: VoucherSource,
    expires_at: DateTime<Utc>,
    used_at: Option<DateTime<Utc>>,
    order_id: Option<OrderId>,
    created_at: DateTime<Utc>,
}

impl From<VoucherRow> for Voucher {
    fn from(row: VoucherRow) -> Self {
        Self {
            id: row.id,
            code: row.code,
            owner_id: row.owner_id,
            value: row.value,
            min_order_total: row.min_order_total,
            source: row.source,
            expires_at: row.expires_at,
            used_at: row.used_at,
            order_id: row.order_id,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RuleRow {
    id: VoucherRuleId,
    name: String,
    threshold: Money,
    voucher_value: Money,
    voucher_min_order: Money,
    valid_days: i32,
    active: bool,
}

impl TryFrom<RuleRow> for RewardRule {
    type Error = RepositoryError;

    fn try_from(row: RuleRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            threshold: row.threshold,
            voucher_value: row.voucher_value,
            voucher_min_order: row.voucher_min_order,
            valid_days: to_u32(row.valid_days, "valid_days")?,
            active: row.active,
        })
    }
}

/// A voucher about to be issued.
#[derive(Debug, Clone)]
pub struct NewVoucherRecord {
    pub code: String,
    pub owner_id: Option<UserId>,
    pub value: Money,
    pub min_order_total: Money,
    pub source: VoucherSource,
    pub source_order_id: Option<OrderId>,
    pub expires_at: DateTime<Utc>,
}

/// The once-per-month key of a reward voucher.
#[derive(Debug, Clone, Copy)]
pub struct RewardKey {
    pub rule_id: VoucherRuleId,
    /// First day of the rewarded month.
    pub period: NaiveDate,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for voucher database operations.
pub struct VoucherRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> VoucherRepository<'a> {
    /// Create a new voucher repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// A customer's vouchers, unused and soonest-expiring first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_owner(&self, owner: UserId) -> Result<Vec<Voucher>, RepositoryError> {
        let rows = sqlx::query_as::<_, VoucherRow>(&format!(
            "SELECT {VOUCHER_COLUMNS} FROM shop.vouchers \
             WHERE owner_id = $1 \
             ORDER BY used_at IS NOT NULL, expires_at, id"
        ))
        .bind(owner)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Voucher::from).collect())
    }

    /// Every voucher, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, page: PageRequest) -> Result<Page<Voucher>, RepositoryError> {
        let rows = sqlx::query_as::<_, VoucherRow>(&format!(
            "SELECT {VOUCHER_COLUMNS} FROM shop.vouchers \
             ORDER BY created_at DESC, id DESC \
             LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM shop.vouchers")
            .fetch_one(self.pool)
            .await?;

        Ok(Page::new(rows.into_iter().map(Voucher::from).collect(), total, page))
    }

    /// Issue one voucher.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the owner does not exist or
    /// the code collides.
    pub async fn issue(&self, new: &NewVoucherRecord) -> Result<Voucher, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        insert_voucher(&mut conn, new).await
    }

    // =========================================================================
    // Reward rules
    // =========================================================================

    /// All reward rules by threshold.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_rules(&self) -> Result<Vec<RewardRule>, RepositoryError> {
        let rows = sqlx::query_as::<_, RuleRow>(&format!(
            "SELECT {RULE_COLUMNS} FROM shop.voucher_reward_rules ORDER BY threshold, id"
        ))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(RewardRule::try_from).collect()
    }

    /// Get a reward rule by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the rule does not exist.
    pub async fn get_rule(&self, id: VoucherRuleId) -> Result<RewardRule, RepositoryError> {
        sqlx::query_as::<_, RuleRow>(&format!(
            "SELECT {RULE_COLUMNS} FROM shop.voucher_reward_rules WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?
        .try_into()
    }

    /// Create a reward rule.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create_rule(&self, draft: &RewardRuleDraft) -> Result<RewardRule, RepositoryError> {
        sqlx::query_as::<_, RuleRow>(&format!(
            "INSERT INTO shop.voucher_reward_rules \
                 (name, threshold, voucher_value, voucher_min_order, valid_days, active) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {RULE_COLUMNS}"
        ))
        .bind(&draft.name)
        .bind(draft.threshold)
        .bind(draft.voucher_value)
        .bind(draft.voucher_min_order)
        .bind(to_i32(draft.valid_days, "valid_days")?)
        .bind(draft.active)
        .fetch_one(self.pool)
        .await?
        .try_into()
    }

    /// Overwrite a reward rule.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the rule does not exist.
    pub async fn update_rule(
        &self,
        id: VoucherRuleId,
        draft: &RewardRuleDraft,
    ) -> Result<RewardRule, RepositoryError> {
        sqlx::query_as::<_, RuleRow>(&format!(
            "UPDATE shop.voucher_reward_rules \
             SET name = $2, threshold = $3, voucher_value = $4, voucher_min_order = $5, \
                 valid_days = $6, active = $7, updated_at = now() \
             WHERE id = $1 \
             RETURNING {RULE_COLUMNS}"
        ))
        .bind(id)
        .bind(&draft.name)
        .bind(draft.threshold)
        .bind(draft.voucher_value)
        .bind(draft.voucher_min_order)
        .bind(to_i32(draft.valid_days, "valid_days")?)
        .bind(draft.active)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?
        .try_into()
    }

    /// Delete a reward rule. Vouchers it issued are kept.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the rule does not exist.
    pub async fn delete_rule(&self, id: VoucherRuleId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.voucher_reward_rules WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

// =============================================================================
// Transaction steps
// =============================================================================

/// Lock a voucher by code for redemption. Codes match case-insensitively.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_by_code(
    conn: &mut PgConnection,
    code: &str,
) -> Result<Option<Voucher>, RepositoryError> {
    let row = sqlx::query_as::<_, VoucherRow>(&format!(
        "SELECT {VOUCHER_COLUMNS} FROM shop.vouchers WHERE code = upper($1) FOR UPDATE"
    ))
    .bind(code.trim())
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(Voucher::from))
}

/// Redeem a voucher on an order if it is still unused. Returns whether it did.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn mark_used(
    conn: &mut PgConnection,
    id: VoucherId,
    order: OrderId,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        "UPDATE shop.vouchers SET used_at = now(), order_id = $2 \
         WHERE id = $1 AND used_at IS NULL",
    )
    .bind(id)
    .bind(order)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Make the voucher redeemed by `order` usable again.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn release_for_order(
    conn: &mut PgConnection,
    order: OrderId,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE shop.vouchers SET used_at = NULL, order_id = NULL WHERE order_id = $1")
        .bind(order)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Insert a voucher.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the owner does not exist or the
/// code collides.
pub async fn insert_voucher(
    conn: &mut PgConnection,
    new: &NewVoucherRecord,
) -> Result<Voucher, RepositoryError> {
    let row = sqlx::query_as::<_, VoucherRow>(&format!(
        "INSERT INTO shop.vouchers \
             (code, owner_id, value, min_order_total, source, source_order_id, expires_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING {VOUCHER_COLUMNS}"
    ))
    .bind(&new.code)
    .bind(new.owner_id)
    .bind(new.value)
    .bind(new.min_order_total)
    .bind(new.source)
    .bind(new.source_order_id)
    .bind(new.expires_at)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| RepositoryError::from_constraint(e, "voucher owner or code conflict"))?;

    Ok(row.into())
}

/// Issue a reward voucher unless this rule already rewarded the owner this
/// period. Returns the voucher if one was issued.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_reward(
    conn: &mut PgConnection,
    new: &NewVoucherRecord,
    key: RewardKey,
) -> Result<Option<Voucher>, RepositoryError> {
    let row = sqlx::query_as::<_, VoucherRow>(&format!(
        "INSERT INTO shop.vouchers \
             (code, owner_id, value, min_order_total, source, source_order_id, expires_at, \
              rule_id, reward_period) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         ON CONFLICT (owner_id, rule_id, reward_period) WHERE rule_id IS NOT NULL DO NOTHING \
         RETURNING {VOUCHER_COLUMNS}"
    ))
    .bind(&new.code)
    .bind(new.owner_id)
    .bind(new.value)
    .bind(new.min_order_total)
    .bind(new.source)
    .bind(new.source_order_id)
    .bind(new.expires_at)
    .bind(key.rule_id)
    .bind(key.period)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(Voucher::from))
}

/// Active reward rules.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn active_rules(conn: &mut PgConnection) -> Result<Vec<RewardRule>, RepositoryError> {
    let rows = sqlx::query_as::<_, RuleRow>(&format!(
        "SELECT {RULE_COLUMNS} FROM shop.voucher_reward_rules WHERE active ORDER BY threshold, id"
    ))
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(RewardRule::try_from).collect()
}

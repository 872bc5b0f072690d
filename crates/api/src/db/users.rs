//! User repository: accounts, roles, wallets and agent settings.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use nutmart_core::commission::AgentRates;
use nutmart_core::{Email, Money, Phone, Rate, ReferralCode, TierId, UserId, UserRole};

use super::{Page, PageRequest, RepositoryError, like_pattern};
use crate::models::affiliate::Collaborator;
use crate::models::user::{User, UserCredentials, UserFilter};

const USER_COLUMNS: &str = "id, email, full_name, phone, role, referral_code, referred_by, \
     tier_id, personal_rate, manager_id, wallet_balance, active, created_at, updated_at";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: UserId,
    email: Email,
    full_name: String,
    phone: Option<String>,
    role: UserRole,
    referral_code: Option<String>,
    referred_by: Option<UserId>,
    tier_id: Option<TierId>,
    personal_rate: Option<Rate>,
    manager_id: Option<UserId>,
    wallet_balance: Money,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let phone = row
            .phone
            .as_deref()
            .map(Phone::parse)
            .transpose()
            .map_err(|e| RepositoryError::DataCorruption(format!("invalid phone in database: {e}")))?;

        Ok(Self {
            id: row.id,
            email: row.email,
            full_name: row.full_name,
            phone,
            role: row.role,
            referral_code: row.referral_code,
            referred_by: row.referred_by,
            tier_id: row.tier_id,
            personal_rate: row.personal_rate,
            manager_id: row.manager_id,
            wallet_balance: row.wallet_balance,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CredentialsRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: String,
}

#[derive(Debug, sqlx::FromRow)]
struct AgentRow {
    id: UserId,
    role: UserRole,
    active: bool,
    personal_rate: Option<Rate>,
    tier_rate: Option<Rate>,
    manager_id: Option<UserId>,
}

/// An agent's commission settings, as needed to plan commissions.
#[derive(Debug, Clone, Copy)]
pub struct AgentRecord {
    pub rates: AgentRates,
    pub role: UserRole,
    pub active: bool,
    pub manager_id: Option<UserId>,
}

impl AgentRecord {
    /// Whether the user currently earns commission.
    #[must_use]
    pub const fn is_active_agent(&self) -> bool {
        self.active && self.role.is_agent()
    }
}

impl From<AgentRow> for AgentRecord {
    fn from(row: AgentRow) -> Self {
        Self {
            rates: AgentRates {
                user_id: row.id,
                personal_rate: row.personal_rate,
                tier_rate: row.tier_rate,
            },
            role: row.role,
            active: row.active,
            manager_id: row.manager_id,
        }
    }
}

/// Fields for a new account.
#[derive(Debug, Clone)]
pub struct NewUserRecord {
    pub email: Email,
    pub password_hash: String,
    pub full_name: String,
    pub phone: Option<Phone>,
    pub role: UserRole,
    pub referral_code: Option<ReferralCode>,
    pub referred_by: Option<UserId>,
}

/// Every admin-editable field of a user, after validation.
#[derive(Debug, Clone)]
pub struct UserUpdate {
    pub full_name: String,
    pub role: UserRole,
    pub referral_code: Option<String>,
    pub tier_id: Option<TierId>,
    pub personal_rate: Option<Rate>,
    pub manager_id: Option<UserId>,
    pub active: bool,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM shop.users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    /// Get a user by email.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM shop.users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    /// Get a user and their password hash for login.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<UserCredentials>, RepositoryError> {
        let row = sqlx::query_as::<_, CredentialsRow>(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM shop.users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(self.pool)
        .await?;

        row.map(|r| {
            Ok(UserCredentials {
                user: User::try_from(r.user)?,
                password_hash: r.password_hash,
            })
        })
        .transpose()
    }

    /// Find the active sale agent owning a referral code.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_agent_by_referral_code(
        &self,
        code: &ReferralCode,
    ) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM shop.users \
             WHERE referral_code = $1 AND role = 'sale' AND active"
        ))
        .bind(code.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    /// Create a user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email is taken.
    pub async fn create(&self, new: &NewUserRecord) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO shop.users \
                 (email, password_hash, full_name, phone, role, referral_code, referred_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.full_name)
        .bind(new.phone.as_ref().map(Phone::as_str))
        .bind(new.role)
        .bind(new.referral_code.as_ref().map(ReferralCode::as_str))
        .bind(new.referred_by)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "email already exists"))?;

        User::try_from(row)
    }

    /// List users, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        filter: &UserFilter,
        page: PageRequest,
    ) -> Result<Page<User>, RepositoryError> {
        let pattern = filter.q.as_deref().map(like_pattern);

        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM shop.users \
             WHERE ($1::shop.user_role IS NULL OR role = $1) \
               AND ($2::text IS NULL OR email ILIKE $2 OR full_name ILIKE $2 \
                    OR phone ILIKE $2 OR referral_code ILIKE $2) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $3 OFFSET $4"
        ))
        .bind(filter.role)
        .bind(pattern.as_deref())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM shop.users \
             WHERE ($1::shop.user_role IS NULL OR role = $1) \
               AND ($2::text IS NULL OR email ILIKE $2 OR full_name ILIKE $2 \
                    OR phone ILIKE $2 OR referral_code ILIKE $2)",
        )
        .bind(filter.role)
        .bind(pattern.as_deref())
        .fetch_one(self.pool)
        .await?;

        let items = rows
            .into_iter()
            .map(User::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(items, total, page))
    }

    /// Commission settings of an agent.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn agent(&self, id: UserId) -> Result<Option<AgentRecord>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        load_agent(&mut conn, id).await
    }

    /// Name of the agent's tier, if any.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn tier_name(&self, id: UserId) -> Result<Option<String>, RepositoryError> {
        let name = sqlx::query_scalar::<_, String>(
            "SELECT t.name FROM shop.users u \
             JOIN shop.commission_tiers t ON t.id = u.tier_id \
             WHERE u.id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(name)
    }

    // =========================================================================
    // Collaborators
    // =========================================================================

    /// Collaborators of a manager with their completed sales in `[from, to)`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn collaborators(
        &self,
        manager: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Collaborator>, RepositoryError> {
        let rows = sqlx::query_as::<_, Collaborator>(
            "SELECT u.id, u.full_name, u.email, u.referral_code, u.active, u.created_at, \
                    COALESCE(( \
                        SELECT SUM(o.subtotal - o.discount) FROM shop.orders o \
                        WHERE o.referrer_id = u.id AND o.status = 'completed' \
                          AND o.completed_at >= $2 AND o.completed_at < $3 \
                    ), 0) AS month_sales \
             FROM shop.users u \
             WHERE u.manager_id = $1 \
             ORDER BY u.full_name, u.id",
        )
        .bind(manager)
        .bind(from)
        .bind(to)
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }

    /// Number of collaborators of a manager.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count_collaborators(&self, manager: UserId) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM shop.users WHERE manager_id = $1")
            .bind(manager)
            .fetch_one(self.pool)
            .await?;

        Ok(count)
    }

    /// Detach a collaborator from their manager.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if `user` is not managed by `manager`.
    pub async fn detach_collaborator(
        &self,
        user: UserId,
        manager: UserId,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE shop.users SET manager_id = NULL, updated_at = now() \
             WHERE id = $1 AND manager_id = $2",
        )
        .bind(user)
        .bind(manager)
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

/// Load an agent's commission settings.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn load_agent(
    conn: &mut PgConnection,
    id: UserId,
) -> Result<Option<AgentRecord>, RepositoryError> {
    let row = sqlx::query_as::<_, AgentRow>(
        "SELECT u.id, u.role, u.active, u.personal_rate, t.rate AS tier_rate, u.manager_id \
         FROM shop.users u \
         LEFT JOIN shop.commission_tiers t ON t.id = u.tier_id \
         WHERE u.id = $1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(AgentRecord::from))
}

/// The agent who referred `user` at sign-up.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn referred_by(
    conn: &mut PgConnection,
    user: UserId,
) -> Result<Option<UserId>, RepositoryError> {
    let referrer = sqlx::query_scalar::<_, Option<UserId>>(
        "SELECT referred_by FROM shop.users WHERE id = $1",
    )
    .bind(user)
    .fetch_optional(&mut *conn)
    .await?
    .flatten();

    Ok(referrer)
}

/// Add to a wallet.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the user does not exist.
pub async fn credit_wallet(
    conn: &mut PgConnection,
    user: UserId,
    amount: Money,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        "UPDATE shop.users SET wallet_balance = wallet_balance + $2, updated_at = now() \
         WHERE id = $1",
    )
    .bind(user)
    .bind(amount)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

/// Take from a wallet if the balance covers it. Returns whether it did.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn debit_wallet(
    conn: &mut PgConnection,
    user: UserId,
    amount: Money,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        "UPDATE shop.users SET wallet_balance = wallet_balance - $2, updated_at = now() \
         WHERE id = $1 AND wallet_balance >= $2",
    )
    .bind(user)
    .bind(amount)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Lock user rows for the rest of the transaction, in ID order.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_users(conn: &mut PgConnection, ids: &[UserId]) -> Result<(), RepositoryError> {
    let ids: Vec<i32> = ids.iter().map(UserId::as_i32).collect();
    sqlx::query("SELECT id FROM shop.users WHERE id = ANY($1) ORDER BY id FOR UPDATE")
        .bind(&ids)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// IDs of `start` and every manager above it, nearest first.
///
/// Stops after 32 levels so a corrupted chain cannot loop forever.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn manager_chain(
    conn: &mut PgConnection,
    start: UserId,
) -> Result<Vec<UserId>, RepositoryError> {
    let ids = sqlx::query_scalar::<_, UserId>(
        "WITH RECURSIVE chain (id, manager_id, depth) AS ( \
             SELECT id, manager_id, 1 FROM shop.users WHERE id = $1 \
             UNION ALL \
             SELECT u.id, u.manager_id, c.depth + 1 \
             FROM shop.users u JOIN chain c ON u.id = c.manager_id \
             WHERE c.depth < 32 \
         ) \
         SELECT id FROM chain ORDER BY depth",
    )
    .bind(start)
    .fetch_all(&mut *conn)
    .await?;

    Ok(ids)
}

/// Write every admin-editable field of a user.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the user does not exist.
/// Returns `RepositoryError::Conflict` if the tier or manager does not exist.
pub async fn update_user(
    conn: &mut PgConnection,
    id: UserId,
    update: &UserUpdate,
) -> Result<User, RepositoryError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "UPDATE shop.users \
         SET full_name = $2, role = $3, referral_code = $4, tier_id = $5, \
             personal_rate = $6, manager_id = $7, active = $8, updated_at = now() \
         WHERE id = $1 \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(id)
    .bind(&update.full_name)
    .bind(update.role)
    .bind(update.referral_code.as_deref())
    .bind(update.tier_id)
    .bind(update.personal_rate)
    .bind(update.manager_id)
    .bind(update.active)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| RepositoryError::from_constraint(e, "tier or manager does not exist"))?
    .ok_or(RepositoryError::NotFound)?;

    User::try_from(row)
}

/// Make an unmanaged customer or agent a collaborator of `manager`.
///
/// Customers become sale agents and get a referral code. The caller checks
/// that `user` is not above `manager` in the management chain.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the user already has a manager,
/// is an admin, or is inactive.
pub async fn attach_collaborator(
    conn: &mut PgConnection,
    user: UserId,
    manager: UserId,
    code: &ReferralCode,
) -> Result<User, RepositoryError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "UPDATE shop.users \
         SET manager_id = $2, role = 'sale', \
             referral_code = COALESCE(referral_code, $3), updated_at = now() \
         WHERE id = $1 AND id <> $2 AND manager_id IS NULL \
           AND role <> 'admin' AND active \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(user)
    .bind(manager)
    .bind(code.as_str())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| RepositoryError::from_constraint(e, "referral code already in use"))?
    .ok_or_else(|| {
        RepositoryError::Conflict("user cannot be attached as a collaborator".to_owned())
    })?;

    User::try_from(row)
}

/// Make a user a sale agent of `tier`, keeping any existing referral code.
///
/// Admins keep their role.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the generated code collides.
pub async fn promote_to_agent(
    conn: &mut PgConnection,
    user: UserId,
    tier: TierId,
    code: &ReferralCode,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "UPDATE shop.users \
         SET role = CASE WHEN role = 'admin' THEN role ELSE 'sale'::shop.user_role END, \
             tier_id = $2, \
             referral_code = COALESCE(referral_code, $3), \
             updated_at = now() \
         WHERE id = $1",
    )
    .bind(user)
    .bind(tier)
    .bind(code.as_str())
    .execute(&mut *conn)
    .await
    .map_err(|e| RepositoryError::from_constraint(e, "referral code already in use"))?;

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_record_requires_active_sale_role() {
        let record = |role, active| AgentRecord {
            rates: AgentRates {
                user_id: UserId::new(1),
                personal_rate: None,
                tier_rate: None,
            },
            role,
            active,
            manager_id: None,
        };
        assert!(record(UserRole::Sale, true).is_active_agent());
        assert!(!record(UserRole::Sale, false).is_active_agent());
        assert!(!record(UserRole::Customer, true).is_active_agent());
        assert!(!record(UserRole::Admin, true).is_active_agent());
    }
}

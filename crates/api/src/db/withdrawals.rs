//! Withdrawal repository.

use sqlx::{PgConnection, PgPool};

use nutmart_core::{Money, UserId, WithdrawalId, WithdrawalStatus};

use super::{Page, PageRequest, RepositoryError};
use crate::models::affiliate::{NewWithdrawal, Withdrawal};

const WITHDRAWAL_SELECT: &str = "SELECT w.id, w.user_id, u.full_name AS user_name, w.amount, \
     w.bank_name, w.account_number, w.account_holder, w.status, w.admin_note, \
     w.processed_by, w.processed_at, w.created_at \
     FROM shop.withdrawals w JOIN shop.users u ON u.id = w.user_id";

/// Repository for withdrawal reads.
pub struct WithdrawalRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> WithdrawalRepository<'a> {
    /// Create a new withdrawal repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List withdrawals, optionally one agent's or one status, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        user: Option<UserId>,
        status: Option<WithdrawalStatus>,
        page: PageRequest,
    ) -> Result<Page<Withdrawal>, RepositoryError> {
        let items = sqlx::query_as::<_, Withdrawal>(&format!(
            "{WITHDRAWAL_SELECT} \
             WHERE ($1::int4 IS NULL OR w.user_id = $1) \
               AND ($2::shop.withdrawal_status IS NULL OR w.status = $2) \
             ORDER BY w.created_at DESC, w.id DESC \
             LIMIT $3 OFFSET $4"
        ))
        .bind(user)
        .bind(status)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM shop.withdrawals \
             WHERE ($1::int4 IS NULL OR user_id = $1) \
               AND ($2::shop.withdrawal_status IS NULL OR status = $2)",
        )
        .bind(user)
        .bind(status)
        .fetch_one(self.pool)
        .await?;

        Ok(Page::new(items, total, page))
    }
}

// =============================================================================
// Transaction steps
// =============================================================================

/// Insert a pending withdrawal.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_withdrawal(
    conn: &mut PgConnection,
    user: UserId,
    request: &NewWithdrawal,
) -> Result<Withdrawal, RepositoryError> {
    let id = sqlx::query_scalar::<_, WithdrawalId>(
        "INSERT INTO shop.withdrawals (user_id, amount, bank_name, account_number, account_holder) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING id",
    )
    .bind(user)
    .bind(request.amount)
    .bind(&request.bank_name)
    .bind(&request.account_number)
    .bind(&request.account_holder)
    .fetch_one(&mut *conn)
    .await?;

    get_withdrawal(conn, id).await
}

/// Load a withdrawal.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the withdrawal does not exist.
pub async fn get_withdrawal(
    conn: &mut PgConnection,
    id: WithdrawalId,
) -> Result<Withdrawal, RepositoryError> {
    sqlx::query_as::<_, Withdrawal>(&format!("{WITHDRAWAL_SELECT} WHERE w.id = $1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(RepositoryError::NotFound)
}

/// Decide a pending withdrawal. Returns the agent and amount if it was
/// still pending.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn decide(
    conn: &mut PgConnection,
    id: WithdrawalId,
    status: WithdrawalStatus,
    admin: UserId,
    note: &str,
) -> Result<Option<(UserId, Money)>, RepositoryError> {
    let decided = sqlx::query_as::<_, (UserId, Money)>(
        "UPDATE shop.withdrawals \
         SET status = $2, processed_by = $3, processed_at = now(), admin_note = $4 \
         WHERE id = $1 AND status = 'pending' \
         RETURNING user_id, amount",
    )
    .bind(id)
    .bind(status)
    .bind(admin)
    .bind(note)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(decided)
}

//! Commission ledger repository.

use sqlx::{PgConnection, PgPool};

use nutmart_core::commission::CommissionPlan;
use nutmart_core::{Money, OrderId, UserId};

use super::{Page, PageRequest, RepositoryError};
use crate::models::affiliate::CommissionEntry;

/// Repository for commission ledger reads.
pub struct CommissionRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CommissionRepository<'a> {
    /// Create a new commission repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// An agent's ledger, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for(
        &self,
        beneficiary: UserId,
        page: PageRequest,
    ) -> Result<Page<CommissionEntry>, RepositoryError> {
        let items = sqlx::query_as::<_, CommissionEntry>(
            "SELECT c.id, c.order_id, o.code AS order_code, c.beneficiary_id, c.kind, c.rate, \
                    c.base_amount, c.amount, c.status, c.created_at, c.settled_at \
             FROM shop.commission_entries c \
             JOIN shop.orders o ON o.id = c.order_id \
             WHERE c.beneficiary_id = $1 \
             ORDER BY c.created_at DESC, c.id DESC \
             LIMIT $2 OFFSET $3",
        )
        .bind(beneficiary)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM shop.commission_entries WHERE beneficiary_id = $1",
        )
        .bind(beneficiary)
        .fetch_one(self.pool)
        .await?;

        Ok(Page::new(items, total, page))
    }

    /// Commission an agent is owed on orders not yet completed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn pending_total(&self, beneficiary: UserId) -> Result<Money, RepositoryError> {
        let total = sqlx::query_scalar::<_, Money>(
            "SELECT COALESCE(SUM(amount), 0) FROM shop.commission_entries \
             WHERE beneficiary_id = $1 AND status = 'pending'",
        )
        .bind(beneficiary)
        .fetch_one(self.pool)
        .await?;

        Ok(total)
    }
}

// =============================================================================
// Transaction steps
// =============================================================================

/// Record the shares of a plan as pending entries.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if an insert fails.
pub async fn insert_plan(
    conn: &mut PgConnection,
    order: OrderId,
    plan: &CommissionPlan,
) -> Result<(), RepositoryError> {
    for share in &plan.shares {
        sqlx::query(
            "INSERT INTO shop.commission_entries \
                 (order_id, beneficiary_id, kind, rate, base_amount, amount) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(order)
        .bind(share.beneficiary)
        .bind(share.kind)
        .bind(share.rate)
        .bind(plan.base)
        .bind(share.amount)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Void the pending entries of an order.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn void_for_order(conn: &mut PgConnection, order: OrderId) -> Result<(), RepositoryError> {
    sqlx::query(
        "UPDATE shop.commission_entries SET status = 'void', settled_at = now() \
         WHERE order_id = $1 AND status = 'pending'",
    )
    .bind(order)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Mark the pending entries of an order credited and return what each
/// beneficiary earned.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn credit_for_order(
    conn: &mut PgConnection,
    order: OrderId,
) -> Result<Vec<(UserId, Money)>, RepositoryError> {
    let credited = sqlx::query_as::<_, (UserId, Money)>(
        "UPDATE shop.commission_entries SET status = 'credited', settled_at = now() \
         WHERE order_id = $1 AND status = 'pending' \
         RETURNING beneficiary_id, amount",
    )
    .bind(order)
    .fetch_all(&mut *conn)
    .await?;

    Ok(credited)
}

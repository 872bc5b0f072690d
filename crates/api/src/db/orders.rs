//! Order repository: orders, line items and status history.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use nutmart_core::{
    Email, Money, OrderId, OrderKind, OrderStatus, PackageId, PaymentMethod, Phone, ProductId,
    UserId,
};

use super::{Page, PageRequest, RepositoryError, like_pattern, to_i32, to_u32};
use crate::models::order::{
    Order, OrderDetail, OrderFilter, OrderItem, OrderStats, OrderStatusChange, ShippingAddress,
    StatusCount,
};

const ORDER_COLUMNS: &str = "id, code, kind, user_id, package_id, contact_name, contact_phone, \
     contact_email, province, district, ward, street, weight_grams, subtotal, shipping_fee, \
     discount, total, payment_method, note, voucher_code, referrer_id, status, created_at, \
     updated_at";

/// Filter conditions shared by the list and count queries.
///
/// `$1` user, `$2` referrer, `$3` status, `$4` kind, `$5` search pattern,
/// `$6`/`$7` first/last Vietnam date.
const ORDER_FILTER: &str = "($1::int4 IS NULL OR user_id = $1) \
     AND ($2::int4 IS NULL OR referrer_id = $2) \
     AND ($3::shop.order_status IS NULL OR status = $3) \
     AND ($4::shop.order_kind IS NULL OR kind = $4) \
     AND ($5::text IS NULL OR code ILIKE $5 OR contact_name ILIKE $5 OR contact_phone ILIKE $5) \
     AND ($6::date IS NULL OR (created_at AT TIME ZONE 'Asia/Ho_Chi_Minh')::date >= $6) \
     AND ($7::date IS NULL OR (created_at AT TIME ZONE 'Asia/Ho_Chi_Minh')::date <= $7)";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    code: String,
    kind: OrderKind,
    user_id: Option<UserId>,
    package_id: Option<PackageId>,
    contact_name: String,
    contact_phone: String,
    contact_email: Option<Email>,
    province: String,
    district: String,
    ward: String,
    street: String,
    weight_grams: i32,
    subtotal: Money,
    shipping_fee: Money,
    discount: Money,
    total: Money,
    payment_method: PaymentMethod,
    note: String,
    voucher_code: Option<String>,
    referrer_id: Option<UserId>,
    status: OrderStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let contact_phone = Phone::parse(&row.contact_phone).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid phone in database: {e}"))
        })?;

        Ok(Self {
            id: row.id,
            code: row.code,
            kind: row.kind,
            user_id: row.user_id,
            package_id: row.package_id,
            contact_name: row.contact_name,
            contact_phone,
            contact_email: row.contact_email,
            address: ShippingAddress {
                province: row.province,
                district: row.district,
                ward: row.ward,
                street: row.street,
            },
            weight_grams: to_u32(row.weight_grams, "weight_grams")?,
            subtotal: row.subtotal,
            shipping_fee: row.shipping_fee,
            discount: row.discount,
            total: row.total,
            payment_method: row.payment_method,
            note: row.note,
            voucher_code: row.voucher_code,
            referrer_id: row.referrer_id,
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    product_id: Option<ProductId>,
    name: String,
    unit_price: Money,
    quantity: i32,
    weight_grams: i32,
}

impl TryFrom<ItemRow> for OrderItem {
    type Error = RepositoryError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            product_id: row.product_id,
            name: row.name,
            unit_price: row.unit_price,
            quantity: to_u32(row.quantity, "quantity")?,
            weight_grams: to_u32(row.weight_grams, "weight_grams")?,
        })
    }
}

/// Everything needed to insert an order. Orders start `pending`.
#[derive(Debug, Clone)]
pub struct NewOrderRecord {
    pub code: String,
    pub kind: OrderKind,
    pub user_id: Option<UserId>,
    pub package_id: Option<PackageId>,
    pub contact_name: String,
    pub contact_phone: Phone,
    pub contact_email: Option<Email>,
    pub address: ShippingAddress,
    pub weight_grams: u32,
    pub subtotal: Money,
    pub shipping_fee: Money,
    pub discount: Money,
    pub total: Money,
    pub payment_method: PaymentMethod,
    pub note: String,
    pub voucher_code: Option<String>,
    pub referrer_id: Option<UserId>,
}

/// Who an order list is scoped to.
#[derive(Debug, Clone, Copy, Default)]
pub enum OrderScope {
    /// Every order (back-office).
    #[default]
    All,
    /// Orders placed by a customer.
    Buyer(UserId),
    /// Orders referred by an agent.
    Referrer(UserId),
}

impl OrderScope {
    const fn buyer(self) -> Option<UserId> {
        match self {
            Self::Buyer(id) => Some(id),
            _ => None,
        }
    }

    const fn referrer(self) -> Option<UserId> {
        match self {
            Self::Referrer(id) => Some(id),
            _ => None,
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List orders in a scope, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        scope: OrderScope,
        filter: &OrderFilter,
        page: PageRequest,
    ) -> Result<Page<Order>, RepositoryError> {
        let pattern = filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty()).map(like_pattern);

        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM shop.orders \
             WHERE {ORDER_FILTER} \
             ORDER BY created_at DESC, id DESC \
             LIMIT $8 OFFSET $9"
        ))
        .bind(scope.buyer())
        .bind(scope.referrer())
        .bind(filter.status)
        .bind(filter.kind)
        .bind(pattern.as_deref())
        .bind(filter.from)
        .bind(filter.to)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM shop.orders WHERE {ORDER_FILTER}"
        ))
        .bind(scope.buyer())
        .bind(scope.referrer())
        .bind(filter.status)
        .bind(filter.kind)
        .bind(pattern.as_deref())
        .bind(filter.from)
        .bind(filter.to)
        .fetch_one(self.pool)
        .await?;

        let items = rows
            .into_iter()
            .map(Order::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(items, total, page))
    }

    /// An order with its items and history.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist or is
    /// outside `scope`.
    pub async fn detail(
        &self,
        id: OrderId,
        scope: OrderScope,
    ) -> Result<OrderDetail, RepositoryError> {
        let order: Order = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM shop.orders \
             WHERE id = $1 \
               AND ($2::int4 IS NULL OR user_id = $2) \
               AND ($3::int4 IS NULL OR referrer_id = $3)"
        ))
        .bind(id)
        .bind(scope.buyer())
        .bind(scope.referrer())
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?
        .try_into()?;

        let mut conn = self.pool.acquire().await?;
        let items = load_items(&mut conn, id).await?;
        let history = sqlx::query_as::<_, OrderStatusChange>(
            "SELECT from_status, to_status, changed_by, note, created_at \
             FROM shop.order_status_history \
             WHERE order_id = $1 \
             ORDER BY created_at, id",
        )
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(OrderDetail {
            order,
            items,
            history,
        })
    }

    /// Dashboard figures for the month `[from, to)`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn stats(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<OrderStats, RepositoryError> {
        let counts = sqlx::query_as::<_, StatusCount>(
            "SELECT status, COUNT(*) AS count FROM shop.orders GROUP BY status",
        )
        .fetch_all(self.pool)
        .await?;

        let by_status = OrderStatus::ALL
            .iter()
            .map(|&status| StatusCount {
                status,
                count: counts
                    .iter()
                    .find(|c| c.status == status)
                    .map_or(0, |c| c.count),
            })
            .collect();

        let (month_completed, month_revenue): (i64, Money) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(total), 0) FROM shop.orders \
             WHERE status = 'completed' AND completed_at >= $1 AND completed_at < $2",
        )
        .bind(from)
        .bind(to)
        .fetch_one(self.pool)
        .await?;

        let pending_withdrawals: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM shop.withdrawals WHERE status = 'pending'")
                .fetch_one(self.pool)
                .await?;

        Ok(OrderStats {
            by_status,
            month_completed,
            month_revenue,
            pending_withdrawals,
        })
    }
}

// =============================================================================
// Transaction steps
// =============================================================================

/// Insert a pending order and its first history entry.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the order code collides.
pub async fn insert_order(
    conn: &mut PgConnection,
    new: &NewOrderRecord,
) -> Result<Order, RepositoryError> {
    let order: Order = sqlx::query_as::<_, OrderRow>(&format!(
        "INSERT INTO shop.orders \
             (code, kind, user_id, package_id, contact_name, contact_phone, contact_email, \
              province, district, ward, street, weight_grams, subtotal, shipping_fee, \
              discount, total, payment_method, note, voucher_code, referrer_id) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
                 $17, $18, $19, $20) \
         RETURNING {ORDER_COLUMNS}"
    ))
    .bind(&new.code)
    .bind(new.kind)
    .bind(new.user_id)
    .bind(new.package_id)
    .bind(&new.contact_name)
    .bind(new.contact_phone.as_str())
    .bind(new.contact_email.as_ref())
    .bind(&new.address.province)
    .bind(&new.address.district)
    .bind(&new.address.ward)
    .bind(&new.address.street)
    .bind(to_i32(new.weight_grams, "weight_grams")?)
    .bind(new.subtotal)
    .bind(new.shipping_fee)
    .bind(new.discount)
    .bind(new.total)
    .bind(new.payment_method)
    .bind(&new.note)
    .bind(new.voucher_code.as_deref())
    .bind(new.referrer_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| RepositoryError::from_constraint(e, "order code already exists"))?
    .try_into()?;

    record_status(conn, order.id, None, OrderStatus::Pending, new.user_id, "").await?;
    Ok(order)
}

/// Insert the line items of an order.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if an insert fails.
pub async fn insert_items(
    conn: &mut PgConnection,
    order: OrderId,
    items: &[OrderItem],
) -> Result<(), RepositoryError> {
    for item in items {
        sqlx::query(
            "INSERT INTO shop.order_items \
                 (order_id, product_id, name, unit_price, quantity, weight_grams) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(order)
        .bind(item.product_id)
        .bind(&item.name)
        .bind(item.unit_price)
        .bind(to_i32(item.quantity, "quantity")?)
        .bind(to_i32(item.weight_grams, "weight_grams")?)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Line items of an order.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn load_items(
    conn: &mut PgConnection,
    order: OrderId,
) -> Result<Vec<OrderItem>, RepositoryError> {
    let rows = sqlx::query_as::<_, ItemRow>(
        "SELECT product_id, name, unit_price, quantity, weight_grams \
         FROM shop.order_items WHERE order_id = $1 ORDER BY id",
    )
    .bind(order)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(OrderItem::try_from).collect()
}

/// Load an order for a status change.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the order does not exist.
pub async fn get_order(conn: &mut PgConnection, id: OrderId) -> Result<Order, RepositoryError> {
    sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM shop.orders WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(RepositoryError::NotFound)?
    .try_into()
}

/// Move an order from `from` to `to` if it is still in `from`.
///
/// `at` becomes `completed_at` when `to` is `completed`, so monthly sales
/// use the same clock as the caller. Returns whether the row changed;
/// `false` means someone else changed the status first.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn set_status(
    conn: &mut PgConnection,
    id: OrderId,
    from: OrderStatus,
    to: OrderStatus,
    at: DateTime<Utc>,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        "UPDATE shop.orders \
         SET status = $3, \
             completed_at = CASE WHEN $3 = 'completed'::shop.order_status \
                                 THEN $4 ELSE completed_at END, \
             updated_at = now() \
         WHERE id = $1 AND status = $2",
    )
    .bind(id)
    .bind(from)
    .bind(to)
    .bind(at)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Append a status history entry.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn record_status(
    conn: &mut PgConnection,
    order: OrderId,
    from: Option<OrderStatus>,
    to: OrderStatus,
    changed_by: Option<UserId>,
    note: &str,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO shop.order_status_history (order_id, from_status, to_status, changed_by, note) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(order)
    .bind(from)
    .bind(to)
    .bind(changed_by)
    .bind(note)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Completed sales referred by `agent` in `[from, to)`, after discounts.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn referred_sales(
    conn: &mut PgConnection,
    agent: UserId,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Money, RepositoryError> {
    let sales = sqlx::query_scalar::<_, Money>(
        "SELECT COALESCE(SUM(subtotal - discount), 0) FROM shop.orders \
         WHERE referrer_id = $1 AND status = 'completed' \
           AND completed_at >= $2 AND completed_at < $3",
    )
    .bind(agent)
    .bind(from)
    .bind(to)
    .fetch_one(&mut *conn)
    .await?;

    Ok(sales)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_binds() {
        let id = UserId::new(7);
        assert_eq!(OrderScope::All.buyer(), None);
        assert_eq!(OrderScope::Buyer(id).buyer(), Some(id));
        assert_eq!(OrderScope::Buyer(id).referrer(), None);
        assert_eq!(OrderScope::Referrer(id).referrer(), Some(id));
    }

    #[test]
    fn test_row_with_bad_phone_is_corruption() {
        let row = OrderRow {
            id: OrderId::new(1),
            code: "NM241019-ABCDE".to_string(),
            kind: OrderKind::Product,
            user_id: None,
            package_id: None,
            contact_name: "Lan".to_string(),
            contact_phone: "not a phone".to_string(),
            contact_email: None,
            province: "Hà Nội".to_string(),
            district: String::new(),
            ward: String::new(),
            street: String::new(),
            weight_grams: 500,
            subtotal: Money::from_dong(100_000),
            shipping_fee: Money::ZERO,
            discount: Money::ZERO,
            total: Money::from_dong(100_000),
            payment_method: PaymentMethod::Cod,
            note: String::new(),
            voucher_code: None,
            referrer_id: None,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(matches!(
            Order::try_from(row),
            Err(RepositoryError::DataCorruption(_))
        ));
    }
}

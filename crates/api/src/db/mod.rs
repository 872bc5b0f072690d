//! Database operations for the Nutmart `PostgreSQL` database.
//!
//! ## Tables (schema `shop`)
//!
//! - `users`, `commission_tiers` - Accounts, roles, wallets and affiliate settings
//! - `products`, `packages` - Catalog
//! - `banners`, `blogs`, `events` - Storefront content
//! - `shipping_zones`, `shipping_settings` - Shipping fee configuration
//! - `orders`, `order_items`, `order_status_history` - Orders
//! - `vouchers`, `voucher_reward_rules` - Vouchers
//! - `commission_entries`, `withdrawals` - Affiliate ledger
//!
//! Sessions live in `tower_sessions.session`.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/api/migrations/` and run via:
//! ```bash
//! cargo run -p nutmart-cli -- migrate
//! ```
//!
//! # Conventions
//!
//! Read-mostly access goes through `XRepository<'a>` structs borrowing the
//! pool. Steps of multi-row workflows (checkout, status changes, withdrawals)
//! are free functions taking a `&mut PgConnection` so services can compose
//! them inside one transaction.

pub mod banners;
pub mod blogs;
pub mod commissions;
pub mod events;
pub mod orders;
pub mod packages;
pub mod products;
pub mod shipping;
pub mod tiers;
pub mod users;
pub mod vouchers;
pub mod withdrawals;

use std::time::Duration;

use secrecy::ExposeSecret;
use serde::Serialize;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use banners::BannerRepository;
pub use blogs::BlogRepository;
pub use commissions::CommissionRepository;
pub use events::EventRepository;
pub use orders::OrderRepository;
pub use packages::PackageRepository;
pub use products::ProductRepository;
pub use shipping::ShippingRepository;
pub use tiers::TierRepository;
pub use users::UserRepository;
pub use vouchers::VoucherRepository;
pub use withdrawals::WithdrawalRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique slug, row still referenced).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map unique and foreign-key violations to `Conflict` with `message`.
    pub(crate) fn from_constraint(err: sqlx::Error, message: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && (db_err.is_unique_violation() || db_err.is_foreign_key_violation())
        {
            return Self::Conflict(message.to_owned());
        }
        Self::Database(err)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Default page size for list endpoints.
pub const DEFAULT_PER_PAGE: u32 = 20;

/// Largest page size a client may request.
pub const MAX_PER_PAGE: u32 = 100;

/// A page request, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Page number, starting at 1.
    pub page: u32,
    /// Items per page.
    pub per_page: u32,
}

impl PageRequest {
    /// Build a page request, clamping to sane bounds.
    #[must_use]
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }

    /// SQL `LIMIT`.
    #[must_use]
    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }

    /// SQL `OFFSET`.
    #[must_use]
    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// A page of results with the total count.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Page<T> {
    /// Assemble a page.
    #[must_use]
    pub const fn new(items: Vec<T>, total: i64, request: PageRequest) -> Self {
        Self {
            items,
            total,
            page: request.page,
            per_page: request.per_page,
        }
    }

    /// Convert every item.
    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}

/// Convert a non-negative database integer into `u32`.
pub(crate) fn to_u32(value: i32, field: &str) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::DataCorruption(format!("negative {field}: {value}")))
}

/// Convert a `u32` into a database integer.
pub(crate) fn to_i32(value: u32, field: &str) -> Result<i32, RepositoryError> {
    i32::try_from(value)
        .map_err(|_| RepositoryError::DataCorruption(format!("{field} out of range: {value}")))
}

/// Escape `%` and `_` and wrap in wildcards for an `ILIKE` search.
pub(crate) fn like_pattern(q: &str) -> String {
    let escaped = q
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_clamps() {
        let req = PageRequest::new(Some(0), Some(1_000));
        assert_eq!(req.page, 1);
        assert_eq!(req.per_page, MAX_PER_PAGE);
        assert_eq!(req.offset(), 0);

        let req = PageRequest::new(Some(3), None);
        assert_eq!(req.limit(), i64::from(DEFAULT_PER_PAGE));
        assert_eq!(req.offset(), 40);
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(" hạt "), "%hạt%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn test_integer_conversions() {
        assert_eq!(to_u32(5, "stock").ok(), Some(5));
        assert!(to_u32(-1, "stock").is_err());
        assert!(to_i32(u32::MAX, "weight").is_err());
    }
}

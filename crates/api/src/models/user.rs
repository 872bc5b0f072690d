//! User domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nutmart_core::{Email, Money, Phone, Rate, TierId, UserId, UserRole};

use super::nullable;

/// A user account. Covers customers, sale agents and admins.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Login email.
    pub email: Email,
    /// Display name.
    pub full_name: String,
    /// Contact phone.
    pub phone: Option<Phone>,
    /// Portal access level.
    pub role: UserRole,
    /// Referral code; sale agents only.
    pub referral_code: Option<String>,
    /// Agent who referred this user at sign-up.
    pub referred_by: Option<UserId>,
    /// Commission tier.
    pub tier_id: Option<TierId>,
    /// Personal commission rate, overriding the tier.
    pub personal_rate: Option<Rate>,
    /// Managing agent.
    pub manager_id: Option<UserId>,
    /// Credited commission not yet withdrawn.
    pub wallet_balance: Money,
    /// Whether the user may log in.
    pub active: bool,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to check a login.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

/// Admin changes to a user.
///
/// Nullable fields use `null` to clear and omission to keep.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub full_name: Option<String>,
    pub role: Option<UserRole>,
    #[serde(default, deserialize_with = "nullable")]
    pub tier_id: Option<Option<TierId>>,
    #[serde(default, deserialize_with = "nullable")]
    pub personal_rate: Option<Option<Rate>>,
    #[serde(default, deserialize_with = "nullable")]
    pub manager_id: Option<Option<UserId>>,
    pub active: Option<bool>,
}

/// Admin user list filters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    pub role: Option<UserRole>,
    pub q: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

//! Session-related types for authentication.
//!
//! Types stored in the session for authentication state.

use serde::{Deserialize, Serialize};

use nutmart_core::{Email, UserId, UserRole};

/// Session-stored user identity.
///
/// Minimal data stored in the session to identify the logged-in user. The
/// role is refreshed on every login; role changes made by an admin take
/// effect at the user's next login.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CurrentUser {
    /// User's database ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
    /// User's display name.
    pub full_name: String,
    /// Portal access level.
    pub role: UserRole,
}

/// Session keys for authentication data.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for the referral code captured from a `?ref=` link.
    pub const REFERRAL_CODE: &str = "referral_code";
}

impl From<&super::user::User> for CurrentUser {
    fn from(user: &super::user::User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            role: user.role,
        }
    }
}

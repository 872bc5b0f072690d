//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] nutmart_core::EmailError),

    /// Invalid phone number.
    #[error("invalid phone: {0}")]
    InvalidPhone(#[from] nutmart_core::PhoneError),

    /// Full name left blank.
    #[error("full name is required")]
    MissingName,

    /// Invalid credentials (wrong password or user not found).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The account was deactivated by an admin.
    #[error("account is disabled")]
    AccountDisabled,

    /// User already exists.
    #[error("user already exists")]
    UserAlreadyExists,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// The referral code given at sign-up belongs to no active agent.
    #[error("unknown referral code")]
    UnknownReferralCode,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}

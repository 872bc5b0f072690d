//! Authentication service.
//!
//! Password registration and login. Sessions are handled by the caller.

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::Deserialize;
use sqlx::PgPool;

use nutmart_core::{Email, Phone, ReferralCode, UserRole};

use crate::db::RepositoryError;
use crate::db::users::{NewUserRecord, UserRepository};
use crate::models::user::User;

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum password length; argon2 input beyond this only costs CPU.
const MAX_PASSWORD_LENGTH: usize = 128;

/// Sign-up form.
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub phone: Option<String>,
    /// Code of the agent who invited the customer.
    pub referral_code: Option<String>,
}

/// Authentication service.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            users: UserRepository::new(pool),
        }
    }

    /// Register a customer.
    ///
    /// The referrer is the agent behind the explicit code if one was typed,
    /// else the agent whose link the visitor followed (`link_code`).
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail`, `InvalidPhone`, `MissingName` or
    /// `WeakPassword` for bad input.
    /// Returns `AuthError::UnknownReferralCode` if a typed code matches no agent.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    pub async fn register(
        &self,
        form: &Registration,
        link_code: Option<&ReferralCode>,
    ) -> Result<User, AuthError> {
        let email = Email::parse(&form.email)?;
        let full_name = form.full_name.trim();
        if full_name.is_empty() {
            return Err(AuthError::MissingName);
        }
        let phone = form
            .phone
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(Phone::parse)
            .transpose()?;
        validate_password(&form.password)?;

        let typed_code = form
            .referral_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        let referred_by = match typed_code {
            Some(code) => {
                let code = ReferralCode::parse(code).map_err(|_| AuthError::UnknownReferralCode)?;
                let agent = self
                    .users
                    .get_agent_by_referral_code(&code)
                    .await?
                    .ok_or(AuthError::UnknownReferralCode)?;
                Some(agent.id)
            }
            None => match link_code {
                Some(code) => self
                    .users
                    .get_agent_by_referral_code(code)
                    .await?
                    .map(|agent| agent.id),
                None => None,
            },
        };

        let password_hash = hash_password(&form.password)?;

        let user = self
            .users
            .create(&NewUserRecord {
                email,
                password_hash,
                full_name: full_name.to_owned(),
                phone,
                role: UserRole::Customer,
                referral_code: None,
                referred_by,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        Ok(user)
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    /// Returns `AuthError::AccountDisabled` if the account was deactivated.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let credentials = self
            .users
            .get_credentials(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &credentials.password_hash)?;

        if !credentials.user.active {
            return Err(AuthError::AccountDisabled);
        }

        Ok(credentials.user)
    }
}

/// Check password length.
///
/// # Errors
///
/// Returns `AuthError::WeakPassword` if the password is too short or too long.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    let length = password.chars().count();
    if length < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if length > MAX_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at most {MAX_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns `AuthError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_password_length() {
        assert!(matches!(
            validate_password("short"),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(validate_password("hat-dieu-2024").is_ok());
        assert!(validate_password(&"x".repeat(MAX_PASSWORD_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("mat-khau-manh").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("mat-khau-manh", &hash).is_ok());
        assert!(matches!(
            verify_password("sai-mat-khau", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(matches!(
            verify_password("anything", "not-a-hash"),
            Err(AuthError::InvalidCredentials)
        ));
    }
}

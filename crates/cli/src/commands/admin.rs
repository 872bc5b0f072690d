//! Admin account management commands.
//!
//! # Usage
//!
//! ```bash
//! NUTMART_ADMIN_PASSWORD=... nutmart-cli admin create -e admin@hatdieu.vn -n "Quản trị viên"
//! ```
//!
//! # Environment Variables
//!
//! - `API_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string
//! - `NUTMART_ADMIN_PASSWORD` - Password for the new account

use thiserror::Error;

use nutmart_api::db::{self, RepositoryError, users::NewUserRecord, users::UserRepository};
use nutmart_api::services::auth::{AuthError, hash_password, validate_password};
use nutmart_core::{Email, UserId, UserRole};

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// Query failed.
    #[error("Database error: {0}")]
    Repository(RepositoryError),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// Blank display name.
    #[error("Name must not be empty")]
    MissingName,

    /// Password rejected or could not be hashed.
    #[error(transparent)]
    Password(#[from] AuthError),

    /// User already exists.
    #[error("User already exists with email: {0}")]
    UserExists(String),
}

/// Create a new admin account.
///
/// # Arguments
///
/// * `email` - Admin's email address
/// * `name` - Admin's display name
/// * `password` - Admin's login password
///
/// # Returns
///
/// The ID of the created account.
///
/// # Errors
///
/// Returns `AdminError` if the input is invalid, the email is taken or the
/// database is unreachable.
pub async fn create_user(email: &str, name: &str, password: &str) -> Result<UserId, AdminError> {
    let email = Email::parse(email).map_err(|_| AdminError::InvalidEmail(email.to_owned()))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(AdminError::MissingName);
    }
    validate_password(password)?;

    let database_url =
        super::database_url().ok_or(AdminError::MissingEnvVar("API_DATABASE_URL"))?;

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&database_url).await?;

    tracing::info!("Creating admin account: {}", email);

    let user = UserRepository::new(&pool)
        .create(&NewUserRecord {
            email: email.clone(),
            password_hash: hash_password(password)?,
            full_name: name.to_owned(),
            phone: None,
            role: UserRole::Admin,
            referral_code: None,
            referred_by: None,
        })
        .await
        .map_err(|e| match e {
            RepositoryError::Conflict(_) => AdminError::UserExists(email.to_string()),
            other => AdminError::Repository(other),
        })?;

    tracing::info!(
        "Admin account created successfully! ID: {}, Email: {}",
        user.id,
        user.email
    );

    Ok(user.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_bad_input_before_connecting() {
        assert!(matches!(
            create_user("not-an-email", "Admin", "mat-khau-dai-du").await,
            Err(AdminError::InvalidEmail(_))
        ));
        assert!(matches!(
            create_user("admin@hatdieu.vn", "   ", "mat-khau-dai-du").await,
            Err(AdminError::MissingName)
        ));
        assert!(matches!(
            create_user("admin@hatdieu.vn", "Admin", "ngan").await,
            Err(AdminError::Password(AuthError::WeakPassword(_)))
        ));
    }
}

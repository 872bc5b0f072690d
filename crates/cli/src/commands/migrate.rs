//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! nutmart-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `API_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string

use thiserror::Error;

use nutmart_api::db;

/// Errors that can occur during migrations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Run the `shop` schema and session store migrations.
///
/// # Errors
///
/// Returns `MigrationError` if the database is unreachable or a migration
/// fails.
pub async fn run() -> Result<(), MigrationError> {
    let database_url =
        super::database_url().ok_or(MigrationError::MissingEnvVar("API_DATABASE_URL"))?;

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&database_url).await?;

    tracing::info!("Running migrations...");
    sqlx::migrate!("../api/migrations").run(&pool).await?;

    tracing::info!("Migrations complete!");
    Ok(())
}

//! Subcommand implementations.

pub mod admin;
pub mod migrate;
pub mod seed;

use secrecy::SecretString;

/// Database URL from `API_DATABASE_URL`, falling back to `DATABASE_URL`.
///
/// Loads `.env` first so the CLI sees the same settings as the server.
pub(crate) fn database_url() -> Option<SecretString> {
    dotenvy::dotenv().ok();
    std::env::var("API_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()
        .map(SecretString::from)
}

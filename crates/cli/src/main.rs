//! Nutmart CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! nutmart-cli migrate
//!
//! # Create an admin account (password from NUTMART_ADMIN_PASSWORD)
//! nutmart-cli admin create -e admin@hatdieu.vn -n "Quản trị viên"
//!
//! # Load shipping zones and settings
//! nutmart-cli seed shipping crates/cli/seeds/shipping.yaml --replace
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `admin create` - Create admin accounts
//! - `seed shipping` - Load shipping zones from YAML

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "nutmart-cli")]
#[command(author, version, about = "Nutmart CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage admin accounts
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    /// Load reference data
    Seed {
        #[command(subcommand)]
        target: SeedTarget,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Create a new admin account
    Create {
        /// Admin email address
        #[arg(short, long)]
        email: String,

        /// Admin display name
        #[arg(short, long)]
        name: String,

        /// Admin password
        #[arg(long, env = "NUTMART_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[derive(Subcommand)]
enum SeedTarget {
    /// Load shipping zones and settings from a YAML file
    Shipping {
        /// Path to the YAML file
        file: String,

        /// Delete existing zones first
        #[arg(long)]
        replace: bool,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Admin { action } => match action {
            AdminAction::Create {
                email,
                name,
                password,
            } => {
                commands::admin::create_user(&email, &name, &password).await?;
            }
        },
        Commands::Seed { target } => match target {
            SeedTarget::Shipping { file, replace } => {
                commands::seed::shipping(&file, replace).await?;
            }
        },
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_seed_shipping() {
        let cli = Cli::try_parse_from([
            "nutmart-cli",
            "seed",
            "shipping",
            "zones.yaml",
            "--replace",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Seed {
                target: SeedTarget::Shipping { replace: true, .. }
            }
        ));
    }
}

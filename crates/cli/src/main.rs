//! Kitshop CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! kitshop migrate
//!
//! # Create the first admin (password from KITSHOP_ADMIN_PASSWORD)
//! kitshop admin create -e owner@kitshop.test -f Ana -l Ruiz
//!
//! # Load products from a YAML file
//! kitshop seed catalog crates/cli/seed/catalog.yaml
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `admin create` - Create admin or employee accounts
//! - `seed catalog` - Insert products from a YAML file

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use secrecy::SecretString;

use kitshop_core::Role;

mod commands;

#[derive(Parser)]
#[command(name = "kitshop")]
#[command(author, version, about = "Kitshop CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage staff accounts
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    /// Seed the database
    Seed {
        #[command(subcommand)]
        target: SeedTarget,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Create an admin or employee account
    Create {
        /// Email address
        #[arg(short, long)]
        email: String,

        /// First name
        #[arg(short, long)]
        first_name: String,

        /// Last name
        #[arg(short, long)]
        last_name: String,

        /// Role (`admin` or `employee`)
        #[arg(short, long, default_value = "admin")]
        role: String,

        /// Job title shown in the staff list
        #[arg(long)]
        position: Option<String>,

        /// Password; prefer the environment variable over the command line
        #[arg(long, env = "KITSHOP_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[derive(Subcommand)]
enum SeedTarget {
    /// Insert products from a YAML file, skipping names already present
    Catalog {
        /// Path to the catalog YAML file
        file: PathBuf,
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
                first_name,
                last_name,
                role,
                position,
                password,
            } => {
                let role: Role = role
                    .parse()
                    .map_err(|_| commands::admin::AdminError::InvalidRole(role.clone()))?;
                commands::admin::create_user(commands::admin::NewStaff {
                    email,
                    first_name,
                    last_name,
                    role,
                    position,
                    password: SecretString::from(password),
                })
                .await?;
            }
        },
        Commands::Seed { target } => match target {
            SeedTarget::Catalog { file } => {
                commands::seed::catalog(&file).await?;
            }
        },
    }
    Ok(())
}

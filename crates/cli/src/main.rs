//! Vic Shop CLI - Database migrations and operator tools.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! vic-cli migrate
//!
//! # Delete expired verification tokens, used or not (run from cron)
//! vic-cli tokens sweep
//!
//! # Create the first administrator
//! vic-cli admin create -e admin@example.com -f Ada -l Lovelace
//! ```
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "vic-cli")]
#[command(author, version, about = "Vic Shop CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage verification tokens
    Tokens {
        #[command(subcommand)]
        action: TokenAction,
    },
    /// Manage admin users
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand)]
enum TokenAction {
    /// Delete tokens past their expiry, used or not
    Sweep,
}

#[derive(Subcommand)]
enum AdminAction {
    /// Create a verified administrator
    Create {
        /// Admin email address
        #[arg(short, long)]
        email: String,

        /// First name
        #[arg(short, long)]
        first_name: String,

        /// Last name
        #[arg(short, long)]
        last_name: String,

        /// Password; a random one is generated and logged when omitted
        #[arg(short, long)]
        password: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CliError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Tokens {
            action: TokenAction::Sweep,
        } => {
            commands::tokens::sweep().await?;
        }
        Commands::Admin {
            action:
                AdminAction::Create {
                    email,
                    first_name,
                    last_name,
                    password,
                },
        } => {
            commands::admin::create_user(&email, &first_name, &last_name, password).await?;
        }
    }
    Ok(())
}

//! Storehub CLI - Database migrations and seeding.
//!
//! # Usage
//!
//! ```bash
//! # Apply database migrations
//! storehub-cli migrate
//!
//! # Show applied/pending migrations
//! storehub-cli migrate --status
//!
//! # Seed stores and products
//! storehub-cli seed --file seed/demo.yaml
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `seed` - Seed stores and products from YAML

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "storehub-cli")]
#[command(author, version, about = "Storehub CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        /// Only report which migrations are applied
        #[arg(long)]
        status: bool,
    },
    /// Seed stores and products from a YAML file
    Seed {
        /// Path to the seed file
        #[arg(short, long, default_value = "seed/demo.yaml")]
        file: String,
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

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate { status: false } => commands::migrate::run().await,
        Commands::Migrate { status: true } => commands::migrate::status().await,
        Commands::Seed { file } => commands::seed::from_file(&file).await,
    }
}

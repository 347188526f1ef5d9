//! Loregate CLI — the main entry point.
//!
//! Commands:
//! - `serve`    — Start the HTTP gateway
//! - `check`    — Validate a character card file
//! - `preview`  — Compose the prompt for a single message and print it

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "loregate",
    about = "Loregate — character-card prompt gateway",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Path to the configuration file (default: ./loregate.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Validate a character card file and print a summary
    Check {
        /// Path to the card JSON
        file: PathBuf,
    },

    /// Apply a card to a one-message history and print the composed prompt
    Preview {
        /// Path to the card JSON
        file: PathBuf,

        /// The user message forming the history
        #[arg(short, long, default_value = "Hello")]
        message: String,

        /// Pin the probability rolls to a fixed seed
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve { config } => commands::serve::run(config.as_deref()).await?,
        Commands::Check { file } => commands::check::run(&file)?,
        Commands::Preview {
            file,
            message,
            seed,
        } => commands::preview::run(&file, &message, seed)?,
    }

    Ok(())
}

//! deskhand CLI — the main entry point.
//!
//! Commands:
//! - `chat`   — Interactive chat or single-message mode
//! - `digest` — Run the document-summary pipeline once
//! - `config` — Show the effective configuration

use clap::{Parser, Subcommand};

mod commands;
mod local_io;
mod transport;

#[derive(Parser)]
#[command(
    name = "deskhand",
    about = "deskhand — a conversational assistant that validates its agents before it trusts them",
    version,
    author
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
    /// Chat with the assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Collect, summarize, and publish a digest for a topic
    Digest {
        /// What the digest is about
        topic: String,

        /// Re-use a run id to resume a partially failed run
        #[arg(short, long)]
        run_id: Option<String>,
    },

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
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
        Commands::Chat { message } => commands::chat::run(message).await,
        Commands::Digest { topic, run_id } => commands::digest::run(&topic, run_id).await,
        Commands::Config => commands::config_cmd::run(),
    }
}

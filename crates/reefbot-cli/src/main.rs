//! Reefbot CLI — entry point.
//!
//! # Commands
//!
//! - `reefbot chat [-m MESSAGE]` — chat through the in-process webchat
//!   channel (single-shot or REPL)
//! - `reefbot status` — show configuration, sessions, and usage counters
//! - `reefbot audit` — run the security audit against config and state

mod audit_cmd;
mod chat;
mod status;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// Reefbot — multi-channel conversational agent engine
#[derive(Parser)]
#[command(name = "reefbot", version, about, long_about = None)]
struct Cli {
    /// Path to config.json (defaults to ~/.reefbot/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent over the in-process webchat channel
    Chat {
        /// Single message (non-interactive). Omit for REPL mode.
        #[arg(short, long)]
        message: Option<String>,

        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Show configuration and usage status
    Status,

    /// Scan configuration and state files for risky defaults and secrets
    Audit,
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Chat { message, logs } => {
            init_logging(logs);
            chat::run(cli.config.as_deref(), message).await
        }
        Commands::Status => {
            init_logging(false);
            status::run(cli.config.as_deref())
        }
        Commands::Audit => {
            init_logging(false);
            audit_cmd::run(cli.config.as_deref())
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

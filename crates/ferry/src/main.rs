//! Ferry - OAuth token bridge for headless clients
//!
//! Main entry point for the ferry CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{auth, call, serve, servers};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Ferry - OAuth token bridge for headless clients
#[derive(Parser)]
#[command(name = "ferry")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Config directory (default: ~/.config/ferry)
    #[arg(long, global = true, env = "FERRY_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Authorize, inspect and revoke server tokens
    Auth(auth::AuthArgs),

    /// Manage registered upstream servers
    Servers(servers::ServersArgs),

    /// Send one authorized JSON request to a server
    Call(call::CallArgs),

    /// Run the local proxy
    Serve(serve::ServeArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_dir = cli
        .config_dir
        .or_else(ferry_config::xdg_config_dir)
        .ok_or(ferry_config::ConfigError::NoConfigDir)?;

    // Initialize tracing — console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "ferry=debug,ferry_oauth=debug,ferry_config=debug,tower_http=debug,info"
    } else {
        "ferry=info,ferry_oauth=info,warn"
    };

    let file_appender = tracing_appender::rolling::daily(config_dir.join("logs"), "ferry.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "ferry=trace,ferry_oauth=trace,ferry_config=trace,tower_http=debug,info",
                )),
        )
        .init();

    let ctx = commands::Context {
        config_dir,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Auth(args) => auth::run(args, &ctx).await,
        Commands::Servers(args) => servers::run(args, &ctx).await,
        Commands::Call(args) => call::run(args, &ctx).await,
        Commands::Serve(args) => serve::run(args, &ctx).await,
    }
}

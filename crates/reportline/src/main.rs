//! Reportline - session client for the maintenance-report backend
//!
//! Main entry point for the Reportline CLI.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use reportline_config::ServerConfig;

mod commands;

use commands::{login, logout, status, watch};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Reportline - session client for the maintenance-report backend
#[derive(Parser)]
#[command(name = "reportline")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Backend URL (default: from config, then http://localhost:8080)
    #[arg(long, global = true, env = "REPORTLINE_SERVER_URL")]
    pub server: Option<String>,

    /// Session file (default: platform data directory)
    #[arg(long, global = true)]
    pub session_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and store the session
    Login(login::LoginArgs),

    /// Show the stored session
    Status(status::StatusArgs),

    /// Supervise the session until it expires or is deactivated
    Watch(watch::WatchArgs),

    /// Clean up server files and clear the stored session
    Logout(logout::LogoutArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "reportline=debug,reportline_session=debug,reportline_client=debug,reportline_cache=debug,reportline_config=debug,info"
    } else {
        "reportline=info,reportline_session=info,reportline_client=warn,warn"
    };

    let log_dir = reportline_config::user_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "reportline.log");
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
                    "reportline=trace,reportline_session=trace,reportline_client=debug,reportline_cache=debug,reportline_config=debug,info",
                )),
        )
        .init();

    let loaded = reportline_config::load_config(None).context("Failed to load configuration")?;
    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }
    let mut config = loaded.config;

    if let Some(url) = cli.server {
        config.server.get_or_insert_with(ServerConfig::default).base_url = url;
    }

    let session_path = match cli.session_file.or_else(|| config.session_path()) {
        Some(path) => path,
        None => reportline_config::data_dir()
            .map(|d| d.join(reportline_session::store::SESSION_FILE))
            .context("Could not determine data directory; pass --session-file")?,
    };

    let ctx = commands::Context {
        config,
        session_path,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Login(args) => login::run(args, &ctx).await,
        Commands::Status(args) => status::run(args, &ctx).await,
        Commands::Watch(args) => watch::run(args, &ctx).await,
        Commands::Logout(args) => logout::run(args, &ctx).await,
    }
}

//! Lader CLI - Command line interface for Smart Energy Lader
//!
//! Runs factory energy episodes, compares sequencing policies against the
//! full-parallel baseline, and inspects register mappings and configuration.

// Clippy pedantic allows - these are intentional design choices
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::unused_async)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::float_cmp)]

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use commands::{compare, config as config_cmd, registers, run};
use config::Config;

#[derive(Parser)]
#[command(name = "lader")]
#[command(author, version, about = "Smart Energy Lader - factory energy sequencing simulator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (overrides LADER_CONFIG and the default locations)
    #[arg(short, long, global = true, env = "LADER_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one episode with a policy
    Run(run::RunArgs),

    /// Compare a policy against the full-parallel baseline
    Compare(compare::CompareArgs),

    /// Register mapping operations
    #[command(subcommand)]
    Registers(registers::RegistersCommands),

    /// Configuration management
    #[command(subcommand)]
    Config(config_cmd::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from lader.env file (before parsing args)
    let env_file = lader_core::util::load_env_file();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let log_level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    init_tracing(log_level, &config.logging.log_file);

    if let Some(path) = env_file {
        debug!("Loaded environment from {}", path.display());
    }
    info!("Smart Energy Lader v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Run(args) => run::run(args, &config).await,
        Commands::Compare(args) => compare::run(args, &config).await,
        Commands::Registers(cmd) => registers::run(cmd, &config).await,
        Commands::Config(cmd) => config_cmd::run(cmd, &config).await,
    }
}

/// Install the subscriber: stderr always, plus a file when `log_file` is set
/// and writable.
fn init_tracing(log_level: &str, log_file: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("lader={log_level},lader_sim={log_level},lader_core={log_level}").into()
    });

    if log_file.is_empty() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
        return;
    }

    let log_path = std::path::Path::new(log_file);
    let log_dir = log_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(std::path::Path::new("."));
    let log_filename = log_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("lader.log");

    match std::fs::create_dir_all(log_dir) {
        Ok(()) => {
            let file_appender = tracing_appender::rolling::never(log_dir, log_filename);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(non_blocking),
                )
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();

            // Flush guard must outlive every log call
            Box::leak(Box::new(guard));
        }
        Err(e) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
            eprintln!("Warning: Could not set up file logging to '{log_file}': {e}. Using stderr only.");
        }
    }
}

//! Portal CLI - authenticated requests and idle session supervision

mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use commands::Commands;
use portal_core::tracing::{InstrumentationConfig, init_tracing};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{Level, debug, error};

#[derive(Parser)]
#[command(name = "portal")]
#[command(about = "Customer portal session client")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML or YAML); PORTAL__* variables override it
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Set logging level
    #[arg(short = 'l', long, global = true, default_value = "info")]
    log_level: LogLevel,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let instrumentation = InstrumentationConfig {
        log_level: Level::from(cli.log_level).as_str().to_lowercase(),
        json: cli.json_logs,
        ..InstrumentationConfig::from_env()
    };
    if let Err(e) = init_tracing(&instrumentation) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("Command failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    debug!("Starting portal CLI");
    cli.command.execute(cli.config).await
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(log_level: LogLevel) -> Self {
        match log_level {
            LogLevel::Error => Self::ERROR,
            LogLevel::Warn => Self::WARN,
            LogLevel::Info => Self::INFO,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Trace => Self::TRACE,
        }
    }
}

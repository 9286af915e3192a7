//! CLI commands

use anyhow::{Context, Result};
use clap::Subcommand;
use portal_core::PortalConfig;
use portal_http::{AuthenticatedFetchClient, RequestInit};
use portal_session::{IdleSessionController, IdleSettings, Navigator, SessionTimerState};
use reqwest::Method;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::config;

#[derive(Subcommand)]
pub enum Commands {
    /// Send one authenticated request and print the response
    Fetch {
        /// Absolute URL or path relative to api.base_url
        url: String,

        /// HTTP method
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        /// JSON request body
        #[arg(short = 'd', long)]
        data: Option<String>,
    },

    /// Configuration file helpers
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Supervise an idle session driven by stdin activity
    Watch,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write the default configuration as TOML
    Init {
        /// Output file path
        #[arg(default_value = "portal.toml")]
        output: PathBuf,
    },
}

impl Commands {
    pub async fn execute(self, config_path: Option<PathBuf>) -> Result<ExitCode> {
        match self {
            Self::Fetch { url, method, data } => {
                let config = config::load_config(config_path.as_deref())?;
                fetch(&config, &url, &method, data.as_deref()).await
            }
            Self::Config { command } => command.execute(),
            Self::Watch => {
                let config = config::load_config(config_path.as_deref())?;
                watch(&config).await
            }
        }
    }
}

impl ConfigCommands {
    pub fn execute(self) -> Result<ExitCode> {
        match self {
            Self::Init { output } => {
                // Create parent directory if it doesn't exist
                if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }

                config::generate_default_config(&output)?;
                println!("Generated configuration at: {}", output.display());
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

fn build_request(method: &str, data: Option<&str>) -> Result<RequestInit> {
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method '{method}'"))?;
    let init = RequestInit::new().method(method);

    match data {
        Some(data) => {
            let body: serde_json::Value =
                serde_json::from_str(data).context("--data must be valid JSON")?;
            Ok(init.json(&body)?)
        }
        None => Ok(init),
    }
}

async fn fetch(
    config: &PortalConfig,
    url: &str,
    method: &str,
    data: Option<&str>,
) -> Result<ExitCode> {
    let init = build_request(method, data)?;
    let identity = config::build_identity(&config.identity).await?;
    let client = AuthenticatedFetchClient::from_config(&config.api, identity)?;

    let response = client.fetch(url, init).await?;
    let status = response.status();
    let body = response.text().await?;

    println!("{status}");
    if !body.is_empty() {
        println!("{body}");
    }

    if status.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Prints the route and wakes the watch loop
struct ExitNavigator {
    done: Arc<Notify>,
}

impl Navigator for ExitNavigator {
    fn navigate(&self, route: &str) {
        println!("Session ended, redirecting to {route}");
        self.done.notify_one();
    }
}

async fn watch(config: &PortalConfig) -> Result<ExitCode> {
    let settings = IdleSettings::from_config(&config.idle)?;
    let identity = config::build_identity(&config.identity).await?;
    let done = Arc::new(Notify::new());
    let navigator = Arc::new(ExitNavigator { done: done.clone() });

    let mut controller =
        IdleSessionController::new(settings, identity, navigator, &config.idle.login_route);
    let mut state = controller.subscribe();
    let notifier = controller.start();

    info!(
        timeout = ?settings.timeout(),
        prompt_before_idle = ?settings.prompt_before_idle(),
        "Watching session; each input line counts as activity"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("stdin closed");
                    break;
                };
                match (controller.state(), line.trim()) {
                    (SessionTimerState::PromptVisible, "c") => controller.continue_session(),
                    (SessionTimerState::PromptVisible, "q") => controller.logout(),
                    _ => {
                        notifier.notify();
                    }
                }
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                if current == SessionTimerState::PromptVisible {
                    println!(
                        "You have been idle. Signing out in {}s: [c]ontinue or [q]uit",
                        settings.prompt_before_idle().as_secs()
                    );
                }
            }
            () = done.notified() => break,
        }
    }

    controller.stop();
    Ok(ExitCode::SUCCESS)
}

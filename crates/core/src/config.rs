//! Configuration for the portal client and idle session policy

use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// REST API client configuration
    pub api: ApiConfig,

    /// Idle session policy
    pub idle: IdleConfig,

    /// Where the identity token comes from
    pub identity: IdentityConfig,
}

/// REST API client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL relative request paths are resolved against
    pub base_url: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Provider-specific header carrying the raw ID token
    pub identity_header: String,

    /// User agent sent with every request
    pub user_agent: String,

    /// Share one silent sign-in between requests that fail together
    pub dedupe_refresh: bool,
}

/// Idle session policy, durations in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    /// Total idle duration before forced expiry
    pub timeout_ms: u64,

    /// How long before expiry the warning is shown
    pub prompt_before_idle_ms: u64,

    /// Minimum spacing between counted activity events
    pub throttle_ms: u64,

    /// Route navigated to after a forced sign-out
    pub login_route: String,
}

/// Identity token source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// File holding the current token; re-read on silent sign-in
    pub token_file: Option<PathBuf>,

    /// Fixed token, used when no token file is configured
    pub token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            request_timeout_secs: 30,
            identity_header: "x-user-id-token".to_string(),
            user_agent: format!("portal-client/{}", env!("CARGO_PKG_VERSION")),
            dedupe_refresh: true,
        }
    }
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 15 * 60 * 1000, // 15 minutes
            prompt_before_idle_ms: 60 * 1000,
            throttle_ms: 500,
            login_route: "/login".to_string(),
        }
    }
}

impl PortalConfig {
    /// Load configuration from file, with `PORTAL__` environment overrides
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> CoreResult<Self> {
        Self::from_file_with(path.as_ref(), environment())
    }

    fn from_file_with(path: &std::path::Path, env: config::Environment) -> CoreResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(env)
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with defaults and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables cannot be parsed or the
    /// result fails validation
    pub fn from_env() -> CoreResult<Self> {
        Self::from_env_with(environment())
    }

    fn from_env_with(env: config::Environment) -> CoreResult<Self> {
        let defaults = Self::default();

        let settings = config::Config::builder()
            // Set default values
            .set_default("api.base_url", defaults.api.base_url)?
            .set_default("api.request_timeout_secs", defaults.api.request_timeout_secs)?
            .set_default("api.identity_header", defaults.api.identity_header)?
            .set_default("api.user_agent", defaults.api.user_agent)?
            .set_default("api.dedupe_refresh", defaults.api.dedupe_refresh)?
            .set_default("idle.timeout_ms", defaults.idle.timeout_ms)?
            .set_default("idle.prompt_before_idle_ms", defaults.idle.prompt_before_idle_ms)?
            .set_default("idle.throttle_ms", defaults.idle.throttle_ms)?
            .set_default("idle.login_route", defaults.idle.login_route)?
            .add_source(env)
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] describing the first violation
    pub fn validate(&self) -> CoreResult<()> {
        url::Url::parse(&self.api.base_url).map_err(|e| {
            CoreError::invalid_config(format!("api.base_url '{}': {e}", self.api.base_url))
        })?;
        self.idle.validate()
    }
}

/// `PORTAL__API__BASE_URL` style overrides
fn environment() -> config::Environment {
    config::Environment::with_prefix("PORTAL").separator("__")
}

impl IdleConfig {
    /// Check that the prompt window fits inside the idle timeout
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if the timeout is zero or the
    /// prompt window is not shorter than it
    pub fn validate(&self) -> CoreResult<()> {
        if self.timeout_ms == 0 {
            return Err(CoreError::invalid_config("idle.timeout_ms must be positive"));
        }
        if self.prompt_before_idle_ms >= self.timeout_ms {
            return Err(CoreError::invalid_config(format!(
                "idle.prompt_before_idle_ms ({}) must be less than idle.timeout_ms ({})",
                self.prompt_before_idle_ms, self.timeout_ms
            )));
        }
        Ok(())
    }
}

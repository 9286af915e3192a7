//! CLI configuration utilities

use anyhow::{Context, Result, bail};
use portal_core::{
    FileTokenSession, IdentityConfig, IdentitySession, PortalConfig, StaticTokenSession,
};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Load configuration from `path`, or from defaults plus environment
pub fn load_config(path: Option<&Path>) -> Result<PortalConfig> {
    match path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            PortalConfig::from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))
        }
        None => {
            info!("Using default configuration with environment overrides");
            Ok(PortalConfig::from_env()?)
        }
    }
}

/// Save configuration as TOML
pub fn save_config<P: AsRef<Path>>(config: &PortalConfig, path: P) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Generate a default configuration file
pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
    save_config(&PortalConfig::default(), path)
}

/// Build the identity session named by the configuration
///
/// A token file wins over an inline token.
pub async fn build_identity(config: &IdentityConfig) -> Result<Arc<dyn IdentitySession>> {
    if let Some(path) = &config.token_file {
        let session = FileTokenSession::load(path)
            .await
            .with_context(|| format!("failed to load token file {}", path.display()))?;
        return Ok(Arc::new(session));
    }

    if let Some(token) = &config.token {
        return Ok(Arc::new(StaticTokenSession::new(token.clone())));
    }

    bail!("no identity configured: set identity.token_file or identity.token")
}

//! CLI command handlers.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use ferry_config::FerryConfig;
use ferry_oauth::{OAuthError, TokenLifecycle};

pub mod auth;
pub mod call;
pub mod serve;
pub mod servers;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Directory holding `config.toml`, `tokens/` and `logs/`.
    pub config_dir: PathBuf,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    pub fn config_path(&self) -> PathBuf {
        ferry_config::config_path_in(&self.config_dir)
    }

    /// Load and validate the config file.
    pub fn load_config(&self) -> Result<FerryConfig> {
        let config = ferry_config::load_config_from_dir(&self.config_dir)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_config(&self, config: &FerryConfig) -> Result<()> {
        ferry_config::save_config(config, &self.config_path())?;
        Ok(())
    }

    /// Token lifecycle over the file store described by `config`.
    pub fn lifecycle(&self, config: &FerryConfig) -> TokenLifecycle {
        let store = config.token_store(&ferry_config::token_dir_in(&self.config_dir));
        TokenLifecycle::new(Arc::new(store))
    }
}

/// Print the next step for an OAuth failure, then hand the error back.
pub fn with_hint(err: OAuthError, server: &str) -> anyhow::Error {
    let hint = match &err {
        OAuthError::PortInUse { .. } => Some(
            "pass --port to use another port, or --manual to paste the redirect URL".to_string(),
        ),
        OAuthError::CallbackTimeout { .. } => Some(format!(
            "re-run 'ferry auth login {}', or use --manual if the browser cannot reach this machine",
            server
        )),
        e if e.requires_reauthorization() => {
            Some(format!("run 'ferry auth login {}' to authorize again", server))
        }
        OAuthError::InvalidUpstream(_) => Some(format!(
            "check the url of [servers.{}] in the config file",
            server
        )),
        e if e.is_config_error() => Some(format!(
            "check [servers.{}.oauth] in the config file",
            server
        )),
        _ => None,
    };
    if let Some(hint) = hint {
        eprintln!("hint: {}", hint);
    }
    err.into()
}

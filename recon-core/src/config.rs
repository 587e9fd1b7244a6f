//! Configuration for recon.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from `~/.config/recon/config.toml` and/or `.recon/config.toml`
//! in the workspace directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which pending records reconciliation replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayPolicy {
    /// Only the oldest pending record of each operation name.
    #[default]
    FirstOccurrence,
    /// Every pending record, in history order.
    FullSequence,
}

/// Top-level recon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconConfig {
    /// Name of the state directory created next to saved example files.
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
    #[serde(default)]
    pub replay_policy: ReplayPolicy,
    /// Persist the raw example store on save.
    #[serde(default = "default_true")]
    pub save_examples: bool,
    /// Create missing output directories on save.
    #[serde(default)]
    pub force: bool,
    /// Built-in loading steps run on every load, in order.
    #[serde(default)]
    pub loading_pipeline: Vec<String>,
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            replay_policy: ReplayPolicy::default(),
            save_examples: true,
            force: false,
            loading_pipeline: Vec::new(),
        }
    }
}

fn default_state_dir() -> String {
    ".recon".to_string()
}

fn default_true() -> bool {
    true
}

/// User-level config file location, if a home directory can be resolved.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "recon", "recon")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// File name of both the user and the workspace config file.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Workspace-level config file location.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".recon").join(CONFIG_FILE_NAME)
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `RECON_`)
/// 3. Workspace-local config (`.recon/config.toml`)
/// 4. User config (`~/.config/recon/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&ReconConfig>,
) -> Result<ReconConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(ReconConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // RECON_REPLAY_POLICY=full_sequence, RECON_SAVE_EXAMPLES=false, ...
    figment = figment.merge(Env::prefixed("RECON_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

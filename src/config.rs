//! Client configuration.
//!
//! Two concerns live here:
//! - selecting the backend origin from the environment (an explicit URL
//!   override, otherwise a hard-coded local or production origin chosen
//!   by deployment profile)
//! - a small persisted config with the last-used email and tenant, at
//!   `~/.config/voxboard/config.json`. Tokens are never persisted.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for the config directory path.
const APP_NAME: &str = "voxboard";

/// Config file name.
const CONFIG_FILE: &str = "config.json";

/// Backend origin for local development.
const LOCAL_API_ORIGIN: &str = "http://localhost:8787";

/// Backend origin for production.
const PRODUCTION_API_ORIGIN: &str = "https://api.voxboard.ai";

/// Deployment profile variable; `local` or `development` selects the
/// local origin, anything else production.
const ENV_PROFILE_VAR: &str = "VOXBOARD_ENV";

/// Explicit origin override, taking precedence over the profile.
const ORIGIN_OVERRIDE_VAR: &str = "VOXBOARD_API_URL";

/// Resolve the backend origin from the process environment.
pub fn api_origin() -> String {
    resolve_origin(
        std::env::var(ORIGIN_OVERRIDE_VAR).ok().as_deref(),
        std::env::var(ENV_PROFILE_VAR).ok().as_deref(),
    )
}

fn resolve_origin(override_url: Option<&str>, profile: Option<&str>) -> String {
    if let Some(url) = override_url {
        let trimmed = url.trim().trim_end_matches('/');
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    match profile.map(str::trim) {
        Some("local") | Some("development") => LOCAL_API_ORIGIN.to_string(),
        _ => PRODUCTION_API_ORIGIN.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub tenant_id: Option<String>,
    pub last_email: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}

use std::{
    fs,
    path::{Path, PathBuf},
};

use color_eyre::Result;
use dirs::config_dir;
use serde::{Deserialize, Serialize};

/// Environment variable consulted before the config file for key material.
pub const ENVELOPE_KEY_VAR: &str = "METERHUB_ENVELOPE_KEY";

/// User-level configuration loaded from `~/.config/meterhub/config.toml`
/// (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Override for the data directory (document store root).
    pub data_dir: Option<PathBuf>,
    /// Base URL of the external device API (defaults to production).
    pub api_base_url: Option<String>,
    /// Envelope key: 32 bytes once decoded from raw/hex/base64. The
    /// METERHUB_ENVELOPE_KEY environment variable takes precedence.
    pub envelope_key: Option<String>,
    /// Cap on in-flight API calls during a poll cycle.
    pub max_in_flight: Option<usize>,
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<Config> {
    let path = default_path()?;
    load_from_path(path)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("meterhub").join("config.toml"))
}

/// Write the given config to disk, creating parent directories as needed.
/// Leaves an existing file alone to avoid clobbering user edits.
pub fn write_default_if_missing(config: &Config) -> Result<PathBuf> {
    let path = default_path()?;
    if path.exists() {
        return Ok(path);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(&path, body)?;
    Ok(path)
}

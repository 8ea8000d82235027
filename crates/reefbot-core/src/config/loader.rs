//! Config loader — reads `~/.reefbot/config.json` and writes it back with
//! hardened permissions.
//!
//! # Loading behavior
//! 1. Missing file → `Config::default()`
//! 2. Unreadable / unparsable file → warn and fall back to defaults
//! 3. Unknown fields are ignored; missing fields take section defaults

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::schema::Config;
use crate::utils;

/// Default config file path (`~/.reefbot/config.json`).
pub fn get_config_path() -> PathBuf {
    utils::get_data_path().join("config.json")
}

/// Load configuration from the given path, or the default path.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be
/// parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if !config_path.exists() {
        info!(path = %config_path.display(), "no config file found, using defaults");
        return Config::default();
    }

    debug!(path = %config_path.display(), "loading config");

    let content = match std::fs::read_to_string(&config_path) {
        Ok(c) => c,
        Err(e) => {
            warn!(path = %config_path.display(), error = %e, "failed to read config file");
            return Config::default();
        }
    };

    match serde_json::from_str::<Config>(&content) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %config_path.display(), error = %e, "failed to parse config JSON");
            Config::default()
        }
    }
}

/// Save configuration to disk — pretty-printed, sorted keys, atomic rename,
/// `0600` permissions.
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);
    utils::atomic_write_json(&config_path, config)
}

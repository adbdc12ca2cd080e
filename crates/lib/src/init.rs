//! Initialize the configuration directory: create the parent directory and a default
//! `relay.json` listing every option with its default.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;

/// Write a default config to `config_path` if it does not exist. Returns true when a file was written.
pub fn init_config(config_path: &Path) -> Result<bool> {
    if config_path.exists() {
        log::debug!("config already exists at {}, skipping", config_path.display());
        return Ok(false);
    }
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    let default_config = serde_json::to_string_pretty(&Config::default())
        .context("serializing default config")?;
    std::fs::write(config_path, default_config)
        .with_context(|| format!("writing default config to {}", config_path.display()))?;
    log::info!("created default config at {}", config_path.display());
    Ok(true)
}

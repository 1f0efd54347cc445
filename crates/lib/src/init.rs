//! Initialize the configuration: create ~/.itach and a starter config file.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config;

/// Starter config: gateway settings plus one example device with a single NEC-style command.
static STARTER_CONFIG: &str = r#"{
  "logLevel": "info",
  "gateway": {
    "host": "192.168.1.70",
    "port": 4998,
    "timeoutMs": 5000,
    "strictReplies": false
  },
  "devices": [
    {
      "name": "tv",
      "moduleAddress": 1,
      "connectorAddress": 1,
      "irCount": 1,
      "commands": [
        { "name": "ON", "data": "0000 006D 0000 0002 0157 00AC 0015 0689" }
      ]
    }
  ]
}
"#;

/// Ensure a config file exists at `config_path`, fail with a hint otherwise.
pub fn require_initialized(config_path: &Path) -> Result<()> {
    if !config_path.exists() {
        anyhow::bail!(
            "configuration not initialized; run `itach init` first (config file not found: {})",
            config_path.display()
        );
    }
    Ok(())
}

/// Create the config directory and write the starter config if no file exists yet.
/// Returns true when a file was written.
pub fn init_config_file(config_path: &Path) -> Result<bool> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if config_path.exists() {
        log::debug!("config already exists at {}, skipping", config_path.display());
        return Ok(false);
    }
    std::fs::write(config_path, STARTER_CONFIG)
        .with_context(|| format!("writing starter config to {}", config_path.display()))?;
    log::info!("created starter config at {}", config_path.display());
    Ok(true)
}

/// The starter config parsed, for callers that want it without touching disk.
pub fn starter_config() -> Result<config::Config> {
    serde_json::from_str(STARTER_CONFIG).context("parsing starter config")
}

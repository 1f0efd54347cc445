//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.itach/config.json`) or, when the path ends in
//! `.yaml`/`.yml`, from YAML. The gateway host can be overridden with `ITACH_HOST`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::gateway::{SessionOptions, ReplyPolicy, DEFAULT_PORT};

/// Name given to devices configured without one.
pub const DEFAULT_DEVICE_NAME: &str = "Remote";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Default log filter for the binary (e.g. "info", "itach=debug"). RUST_LOG wins when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Gateway endpoint and session settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// IR devices reachable through the gateway.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

/// Gateway endpoint, timeout, and reply handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Host name or IP address of the iTach. Overridden by ITACH_HOST env.
    pub host: Option<String>,

    /// Command port (default 4998).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bound for each of connect, write, and read, in milliseconds (default 5000).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// When true, replies other than `completeir`/`ERR` count as failures instead of success.
    #[serde(default)]
    pub strict_replies: bool,
}

fn default_gateway_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout_ms() -> u64 {
    5000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_gateway_port(),
            timeout_ms: default_timeout_ms(),
            strict_replies: false,
        }
    }
}

impl GatewayConfig {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            timeout: Duration::from_millis(self.timeout_ms),
            reply_policy: if self.strict_replies {
                ReplyPolicy::Strict
            } else {
                ReplyPolicy::Lenient
            },
        }
    }
}

/// One device: gateway port, repeat count, and raw IR commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    /// Device name (default "Remote").
    #[serde(default)]
    pub name: Option<String>,

    /// Gateway module address (default 1).
    #[serde(default = "default_address", alias = "modaddr")]
    pub module_address: NonZeroU32,

    /// Gateway connector address on the module.
    #[serde(alias = "connaddr")]
    pub connector_address: NonZeroU32,

    /// How many times each command is repeated when sent (default 1).
    #[serde(default = "default_ir_count", alias = "ir_count")]
    pub ir_count: NonZeroU32,

    #[serde(default)]
    pub commands: Vec<CommandConfig>,
}

/// A named raw IR capture (hex words, e.g. "0000 006D 0000 0022 ...").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    pub name: String,
    pub data: String,
}

fn default_address() -> NonZeroU32 {
    NonZeroU32::MIN
}

fn default_ir_count() -> NonZeroU32 {
    NonZeroU32::MIN
}

impl DeviceConfig {
    /// Configured name, or "Remote" when absent or blank.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_DEVICE_NAME)
    }

    /// Command name -> raw data, trimmed. Blank names or data become `""`.
    pub fn command_map(&self) -> Vec<(String, String)> {
        self.commands
            .iter()
            .map(|c| (non_blank(&c.name), non_blank(&c.data)))
            .collect()
    }
}

fn non_blank(s: &str) -> String {
    let t = s.trim();
    if t.is_empty() {
        "\"\"".to_string()
    } else {
        t.to_string()
    }
}

/// Resolve the gateway host: env ITACH_HOST overrides config.
pub fn resolve_gateway_host(config: &Config) -> Option<String> {
    pick_host(std::env::var("ITACH_HOST").ok(), config)
}

fn pick_host(env: Option<String>, config: &Config) -> Option<String> {
    env.and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
    .or_else(|| {
        config
            .gateway
            .host
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("ITACH_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".itach").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Parse config text; YAML when `path` has a YAML extension, JSON otherwise.
pub fn parse_config(text: &str, path: &Path) -> Result<Config> {
    let config = if is_yaml(path) {
        serde_yaml::from_str(text)
            .with_context(|| format!("parsing YAML config from {}", path.display()))?
    } else {
        serde_json::from_str(text)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok(config)
}

/// Load config from the given path, or the default path (or ITACH_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        parse_config(&s, &path)?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_gateway_settings() {
        let g = GatewayConfig::default();
        assert_eq!(g.port, 4998);
        assert_eq!(g.timeout_ms, 5000);
        assert!(g.host.is_none());
        assert_eq!(g.session_options().reply_policy, ReplyPolicy::Lenient);
        assert_eq!(g.session_options().timeout, Duration::from_secs(5));
    }

    #[test]
    fn parses_json_with_short_address_keys() {
        let text = r#"{
            "gateway": { "host": "192.168.1.70", "strictReplies": true },
            "devices": [
                { "name": "tv", "connaddr": 3, "commands": [ { "name": "ON", "data": "0000 006D 0000 0001 0001 0001" } ] },
                { "name": "amp", "modaddr": 2, "connectorAddress": 1, "irCount": 3 }
            ]
        }"#;
        let config = parse_config(text, Path::new("config.json")).unwrap();
        assert_eq!(config.gateway.host.as_deref(), Some("192.168.1.70"));
        assert_eq!(config.gateway.port, 4998);
        assert_eq!(config.gateway.session_options().reply_policy, ReplyPolicy::Strict);

        let tv = &config.devices[0];
        assert_eq!(tv.module_address.get(), 1);
        assert_eq!(tv.connector_address.get(), 3);
        assert_eq!(tv.ir_count.get(), 1);
        assert_eq!(tv.commands.len(), 1);

        let amp = &config.devices[1];
        assert_eq!(amp.module_address.get(), 2);
        assert_eq!(amp.ir_count.get(), 3);

        let zero = r#"{ "devices": [ { "connaddr": 1, "irCount": 0 } ] }"#;
        assert!(parse_config(zero, Path::new("c.json")).is_err());
    }

    #[test]
    fn parses_yaml_by_extension() {
        let text = "gateway:\n  host: itach.local\n  port: 5000\ndevices:\n  - name: projector\n    connaddr: 2\n    commands:\n      - name: ON\n        data: 0000 006D 0000 0001 0001 0001\n";
        let config = parse_config(text, Path::new("itach.yaml")).unwrap();
        assert_eq!(config.gateway.port, 5000);
        assert_eq!(config.devices[0].display_name(), "projector");
        assert_eq!(config.devices[0].commands[0].data, "0000 006D 0000 0001 0001 0001");
    }

    #[test]
    fn connector_address_is_required_and_positive() {
        let missing = r#"{ "devices": [ { "name": "tv" } ] }"#;
        assert!(parse_config(missing, Path::new("c.json")).is_err());
        let zero = r#"{ "devices": [ { "name": "tv", "connaddr": 0 } ] }"#;
        assert!(parse_config(zero, Path::new("c.json")).is_err());
    }

    #[test]
    fn device_names_and_commands_are_normalised() {
        let text = r#"{ "devices": [ { "connaddr": 1, "commands": [
            { "name": "  ON ", "data": " 0000 006D 0000 0001 0001 0001\n" },
            { "name": " ", "data": "" }
        ] } ] }"#;
        let config = parse_config(text, Path::new("c.json")).unwrap();
        let device = &config.devices[0];
        assert_eq!(device.display_name(), DEFAULT_DEVICE_NAME);
        let commands = device.command_map();
        assert_eq!(
            commands[0],
            ("ON".to_string(), "0000 006D 0000 0001 0001 0001".to_string())
        );
        assert_eq!(commands[1], ("\"\"".to_string(), "\"\"".to_string()));
    }

    #[test]
    fn env_host_overrides_config() {
        let mut config = Config::default();
        config.gateway.host = Some(" 10.0.0.9 ".to_string());
        assert_eq!(pick_host(None, &config).as_deref(), Some("10.0.0.9"));
        assert_eq!(
            pick_host(Some("itach.lan".to_string()), &config).as_deref(),
            Some("itach.lan")
        );
        assert_eq!(pick_host(Some("  ".to_string()), &config).as_deref(), Some("10.0.0.9"));
        assert_eq!(pick_host(None, &Config::default()), None);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("itach-config-test-does-not-exist.json");
        let (config, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert!(config.devices.is_empty());
        assert_eq!(config.gateway.port, 4998);
    }
}

//! Top-level client: device registry plus one gateway session, with a single retry.

use anyhow::Result;
use tokio::sync::{Mutex, RwLock};

use crate::config::{self, Config};
use crate::device::{DeviceLoadReport, DeviceRegistry, LookupError, RegistryError};
use crate::gateway::session::{
    Ack, Endpoint, GatewaySession, SendError, SessionOptions, TransportError,
};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error(transparent)]
    Send(#[from] SendError),
}

/// Sends registered IR commands through one gateway.
///
/// Devices are added during setup; afterwards the registry is only read. The
/// session lock is held for the whole of a send (both attempts), so concurrent
/// callers never interleave on the socket.
#[derive(Debug)]
pub struct GatewayClient {
    registry: RwLock<DeviceRegistry>,
    session: Mutex<GatewaySession>,
}

impl GatewayClient {
    pub fn new(endpoint: Endpoint, options: SessionOptions) -> Self {
        Self {
            registry: RwLock::new(DeviceRegistry::new()),
            session: Mutex::new(GatewaySession::new(endpoint, options)),
        }
    }

    /// Build a client for the configured gateway and register every configured device.
    /// Devices whose name is already taken are logged and skipped.
    pub fn from_config(config: &Config) -> Result<(Self, Vec<DeviceLoadReport>)> {
        let host = config::resolve_gateway_host(config)
            .ok_or_else(|| anyhow::anyhow!("no gateway host configured (set gateway.host or ITACH_HOST)"))?;
        Ok(Self::from_config_at(config, host))
    }

    /// Like [`from_config`](Self::from_config), but with an explicit gateway host.
    pub fn from_config_at(config: &Config, host: impl Into<String>) -> (Self, Vec<DeviceLoadReport>) {
        let endpoint = Endpoint::new(host, config.gateway.port);
        log::info!("using iTach host {}", endpoint);
        let (registry, reports) = DeviceRegistry::from_devices(&config.devices);
        let client = Self {
            registry: RwLock::new(registry),
            session: Mutex::new(GatewaySession::new(endpoint, config.gateway.session_options())),
        };
        (client, reports)
    }

    pub async fn add_device<I, K, V>(
        &self,
        name: &str,
        module_address: u32,
        connector_address: u32,
        raw_commands: I,
    ) -> Result<DeviceLoadReport, RegistryError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        self.registry
            .write()
            .await
            .add_device(name, module_address, connector_address, raw_commands)
    }

    /// The `sendir` line `send` would transmit, without touching the network.
    pub async fn request_line(&self, device: &str, command: &str, count: i64) -> Result<String, LookupError> {
        self.registry.read().await.get_command(device, command, count)
    }

    /// Registered device names with their loaded command names, sorted.
    pub async fn devices(&self) -> Vec<(String, Vec<String>)> {
        let registry = self.registry.read().await;
        registry
            .names()
            .into_iter()
            .filter_map(|name| registry.lookup(name).ok())
            .map(|d| {
                (
                    d.name().to_string(),
                    d.command_names().into_iter().map(String::from).collect(),
                )
            })
            .collect()
    }

    /// Send `command` to `device`, `count` times (at least once). A failed attempt is
    /// retried once with the same request; the retry's outcome is returned as is.
    pub async fn send(&self, device: &str, command: &str, count: i64) -> Result<Ack, ClientError> {
        log::debug!(
            "sending command {} on device {} with count {}",
            command,
            device,
            count
        );
        let line = self
            .registry
            .read()
            .await
            .get_command(device, command, count)
            .map_err(|e| {
                log::error!("{}", e);
                e
            })?;

        let mut session = self.session.lock().await;
        match session.send_and_await_reply(&line).await {
            Ok(ack) => Ok(ack),
            Err(first) => {
                log::debug!(
                    "retrying command {} on device {} after: {}",
                    command,
                    device,
                    first
                );
                Ok(session.send_and_await_reply(&line).await?)
            }
        }
    }

    /// Open the connection now rather than on first send.
    pub async fn connect(&self) -> Result<(), TransportError> {
        self.session.lock().await.connect().await
    }

    /// True when the gateway is reachable. Does not reconnect an open session.
    pub async fn ready(&self) -> bool {
        let mut session = self.session.lock().await;
        if session.is_connected() {
            return true;
        }
        session.connect().await.is_ok()
    }

    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.is_connected()
    }

    pub async fn close(&self) {
        self.session.lock().await.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CommandConfig, DeviceConfig};
    use std::num::NonZeroU32;

    fn device(name: &str, connector: u32) -> DeviceConfig {
        DeviceConfig {
            name: Some(name.to_string()),
            module_address: NonZeroU32::MIN,
            connector_address: NonZeroU32::new(connector).unwrap(),
            ir_count: NonZeroU32::MIN,
            commands: vec![
                CommandConfig {
                    name: "ON".to_string(),
                    data: "0000 006D 0000 0001 0157 00AC".to_string(),
                },
                CommandConfig {
                    name: "BAD".to_string(),
                    data: "0000 006D".to_string(),
                },
            ],
        }
    }

    #[tokio::test]
    async fn from_config_registers_devices_and_skips_duplicates() {
        let mut config = Config::default();
        config.gateway.host = Some("192.0.2.10".to_string());
        config.devices = vec![device("tv", 1), device("tv", 2), device("amp", 3)];

        let (client, reports) = GatewayClient::from_config(&config).unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.loaded == 1 && r.failed() == 1));

        let devices = client.devices().await;
        assert_eq!(
            devices,
            vec![
                ("amp".to_string(), vec!["ON".to_string()]),
                ("tv".to_string(), vec!["ON".to_string()]),
            ]
        );
        let line = client.request_line("tv", "ON", 1).await.unwrap();
        assert_eq!(line, "sendir,1:1,1,38029,1,1,343,172\r");
        assert!(!client.is_connected().await);
    }

    #[tokio::test]
    async fn from_config_requires_host() {
        if std::env::var("ITACH_HOST").is_ok() {
            return;
        }
        assert!(GatewayClient::from_config(&Config::default()).is_err());
    }

    #[tokio::test]
    async fn unknown_device_fails_without_network() {
        let client = GatewayClient::new(Endpoint::new("192.0.2.10", 4998), SessionOptions::default());
        let err = client.send("nope", "ON", 1).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Lookup(LookupError::UnknownDevice(ref d)) if d == "nope"
        ));
        assert!(!client.is_connected().await);
    }
}

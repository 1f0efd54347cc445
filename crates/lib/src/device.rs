//! IR devices and the registry that maps device names to gateway ports and commands.
//!
//! A device is registered once, during setup. Commands that fail to parse are
//! left out of the device and reported back; only a duplicate device name
//! rejects the whole registration.

use std::collections::HashMap;

use crate::command::{repeat_count, ParseError, PulseCommand};
use crate::config::DeviceConfig;

/// One IR-controlled device: its gateway port and its named commands.
#[derive(Debug, Clone)]
pub struct Device {
    name: String,
    module_address: u32,
    connector_address: u32,
    commands: HashMap<String, PulseCommand>,
}

impl Device {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module_address(&self) -> u32 {
        self.module_address
    }

    pub fn connector_address(&self) -> u32 {
        self.connector_address
    }

    /// Command by exact (case-sensitive) name.
    pub fn command(&self, name: &str) -> Option<&PulseCommand> {
        self.commands.get(name)
    }

    /// Loaded command names, sorted.
    pub fn command_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// A command that was dropped while registering a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLoadFailure {
    pub command: String,
    pub error: ParseError,
}

/// Outcome of a successful [`DeviceRegistry::add_device`].
#[derive(Debug, Clone)]
pub struct DeviceLoadReport {
    pub device: String,
    pub loaded: usize,
    pub failures: Vec<CommandLoadFailure>,
}

impl DeviceLoadReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("device {0} already exists, cannot add a second device with the same name")]
    DuplicateDevice(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("device has not been added: {0}")]
    UnknownDevice(String),
    #[error("cannot find command {command} for device {device}")]
    UnknownCommand { device: String, command: String },
}

/// Device name -> device. Entries are only ever added.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, Device>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every configured device. Devices whose name is already taken are
    /// logged and skipped, so the reports may be fewer than the configs.
    pub fn from_devices(configs: &[DeviceConfig]) -> (Self, Vec<DeviceLoadReport>) {
        let mut registry = Self::new();
        let mut reports = Vec::with_capacity(configs.len());
        for device in configs {
            match registry.add_device(
                device.display_name(),
                device.module_address.get(),
                device.connector_address.get(),
                device.command_map(),
            ) {
                Ok(report) => reports.push(report),
                Err(e) => log::error!("skipping device: {}", e),
            }
        }
        (registry, reports)
    }

    /// Register a device with raw capture strings keyed by command name.
    pub fn add_device<I, K, V>(
        &mut self,
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
        log::debug!(
            "adding device {}, modaddr {}, connaddr {}",
            name,
            module_address,
            connector_address
        );
        if self.devices.contains_key(name) {
            log::error!(
                "device {} already exists, cannot add a second device with the same name",
                name
            );
            return Err(RegistryError::DuplicateDevice(name.to_string()));
        }

        let mut commands = HashMap::new();
        let mut failures = Vec::new();
        for (command_name, raw) in raw_commands {
            let command_name = command_name.into();
            log::debug!("adding command {} for device {}", command_name, name);
            match PulseCommand::parse(command_name.clone(), raw.as_ref()) {
                Ok(cmd) => {
                    commands.insert(command_name, cmd);
                }
                Err(error) => {
                    log::error!(
                        "cannot add command {} for device {}: {}",
                        command_name,
                        name,
                        error
                    );
                    failures.push(CommandLoadFailure {
                        command: command_name,
                        error,
                    });
                }
            }
        }

        if !failures.is_empty() {
            let noun = if failures.len() == 1 { "command" } else { "commands" };
            log::error!(
                "could not load {} {} for device {}",
                failures.len(),
                noun,
                name
            );
        }

        let report = DeviceLoadReport {
            device: name.to_string(),
            loaded: commands.len(),
            failures,
        };
        self.devices.insert(
            name.to_string(),
            Device {
                name: name.to_string(),
                module_address,
                connector_address,
                commands,
            },
        );
        log::debug!("add device {} complete", name);
        Ok(report)
    }

    pub fn lookup(&self, name: &str) -> Result<&Device, LookupError> {
        self.devices
            .get(name)
            .ok_or_else(|| LookupError::UnknownDevice(name.to_string()))
    }

    /// Resolve a device command and serialize it for the device's port.
    /// `count` below 1 is sent as 1.
    pub fn get_command(&self, device: &str, command: &str, count: i64) -> Result<String, LookupError> {
        let dev = self.lookup(device)?;
        let cmd = dev.command(command).ok_or_else(|| LookupError::UnknownCommand {
            device: device.to_string(),
            command: command.to_string(),
        })?;
        let count = repeat_count(count);
        log::debug!(
            "building command {} for device {} with count of {}",
            command,
            device,
            count
        );
        Ok(cmd.to_sendir(dev.module_address, dev.connector_address, count))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Registered device names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.devices.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

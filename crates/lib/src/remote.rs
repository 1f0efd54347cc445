//! Remote: one configured device as a remote control (ON/OFF, command sequences).

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::DEFAULT_DEVICE_NAME;
use crate::gateway::{Ack, ClientError, GatewayClient};

/// Command sent by [`Remote::turn_on`].
pub const ON_COMMAND: &str = "ON";
/// Command sent by [`Remote::turn_off`].
pub const OFF_COMMAND: &str = "OFF";

/// Anything that can send a named device command (the gateway client, or a fake in tests).
#[async_trait]
pub trait IrSender: Send + Sync {
    async fn send(&self, device: &str, command: &str, count: i64) -> Result<Ack, ClientError>;
}

#[async_trait]
impl IrSender for GatewayClient {
    async fn send(&self, device: &str, command: &str, count: i64) -> Result<Ack, ClientError> {
        GatewayClient::send(self, device, command, count).await
    }
}

/// A device plus its repeat count and a locally tracked power flag.
/// The flag only reflects commands sent from here; there is no feedback from the device.
pub struct Remote {
    sender: Arc<dyn IrSender>,
    name: String,
    ir_count: i64,
    power: AtomicBool,
}

impl Remote {
    pub fn new(sender: Arc<dyn IrSender>, name: impl Into<String>, ir_count: i64) -> Self {
        let name = name.into();
        let name = if name.trim().is_empty() {
            DEFAULT_DEVICE_NAME.to_string()
        } else {
            name
        };
        Self {
            sender,
            name,
            ir_count: ir_count.max(1),
            power: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_on(&self) -> bool {
        self.power.load(Ordering::SeqCst)
    }

    pub async fn turn_on(&self) -> Result<Ack, ClientError> {
        let ack = self.sender.send(&self.name, ON_COMMAND, self.ir_count).await?;
        self.power.store(true, Ordering::SeqCst);
        Ok(ack)
    }

    pub async fn turn_off(&self) -> Result<Ack, ClientError> {
        let ack = self.sender.send(&self.name, OFF_COMMAND, self.ir_count).await?;
        self.power.store(false, Ordering::SeqCst);
        Ok(ack)
    }

    /// Send each command in order, `ir_count * num_repeats` times. Stops at the first failure.
    pub async fn send_commands<S: AsRef<str>>(
        &self,
        commands: &[S],
        num_repeats: i64,
    ) -> Result<Vec<Ack>, ClientError> {
        let count = self.ir_count.saturating_mul(num_repeats.max(1));
        let mut acks = Vec::with_capacity(commands.len());
        for command in commands {
            acks.push(self.sender.send(&self.name, command.as_ref(), count).await?);
        }
        Ok(acks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::LookupError;
    use std::sync::Mutex;

    /// Records every call; fails for commands named "FAIL".
    #[derive(Default)]
    struct RecordingSender {
        calls: Mutex<Vec<(String, String, i64)>>,
    }

    #[async_trait]
    impl IrSender for RecordingSender {
        async fn send(&self, device: &str, command: &str, count: i64) -> Result<Ack, ClientError> {
            self.calls
                .lock()
                .unwrap()
                .push((device.to_string(), command.to_string(), count));
            if command == "FAIL" {
                return Err(LookupError::UnknownCommand {
                    device: device.to_string(),
                    command: command.to_string(),
                }
                .into());
            }
            Ok(Ack::Complete)
        }
    }

    #[tokio::test]
    async fn on_and_off_track_power() {
        let sender = Arc::new(RecordingSender::default());
        let remote = Remote::new(sender.clone(), "tv", 2);
        assert!(!remote.is_on());

        remote.turn_on().await.unwrap();
        assert!(remote.is_on());
        remote.turn_off().await.unwrap();
        assert!(!remote.is_on());

        let calls = sender.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                ("tv".to_string(), "ON".to_string(), 2),
                ("tv".to_string(), "OFF".to_string(), 2),
            ]
        );
    }

    #[tokio::test]
    async fn send_commands_multiplies_repeats_and_stops_on_failure() {
        let sender = Arc::new(RecordingSender::default());
        let remote = Remote::new(sender.clone(), "amp", 2);

        let err = remote
            .send_commands(&["VOL+", "FAIL", "MUTE"], 3)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Lookup(_)));

        let calls = sender.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], ("amp".to_string(), "VOL+".to_string(), 6));
    }

    #[tokio::test]
    async fn blank_name_and_zero_counts_are_defaulted() {
        let sender = Arc::new(RecordingSender::default());
        let remote = Remote::new(sender.clone(), " ", 0);
        assert_eq!(remote.name(), "Remote");

        let acks = remote.send_commands(&["ON"], 0).await.unwrap();
        assert_eq!(acks, vec![Ack::Complete]);
        assert_eq!(sender.calls.lock().unwrap()[0].2, 1);
    }

    #[tokio::test]
    async fn failed_turn_on_leaves_power_off() {
        struct Failing;
        #[async_trait]
        impl IrSender for Failing {
            async fn send(&self, device: &str, _command: &str, _count: i64) -> Result<Ack, ClientError> {
                Err(LookupError::UnknownDevice(device.to_string()).into())
            }
        }
        let remote = Remote::new(Arc::new(Failing), "tv", 1);
        assert!(remote.turn_on().await.is_err());
        assert!(!remote.is_on());
    }
}

//! Client configuration.
//!
//! Every field has a default, so a JSON file only needs the keys it changes:
//!
//! ```
//! use neocore_client::config::ClientConfig;
//! use neocore_client::protocol::LengthPolicy;
//!
//! let config = ClientConfig::from_json_str(r#"{ "eeg_length_policy": "strict" }"#).unwrap();
//! assert_eq!(config.eeg_length_policy, LengthPolicy::Strict);
//! assert_eq!(config.response_timeout_ms, 2000);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::LengthPolicy;
use crate::writer::WriterConfig;

/// Default wait for each identification reply.
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 2000;

/// Default delay between test-signal enable and stream enable.
pub const DEFAULT_COMMAND_PACING_MS: u64 = 500;

/// Default BLE scan duration.
pub const DEFAULT_SCAN_DURATION_MS: u64 = 5000;

/// Advertised names that identify the headset (substring match).
pub const DEFAULT_TARGET_NAMES: [&str; 3] = ["QCC5181", "QCC5181-LE", "NEOCORE"];

/// Nordic UART service.
pub const NUS_SERVICE_UUID: &str = "6E400001-B5A3-F393-E0A9-E50E24DCCA9E";
/// Nordic UART RX characteristic (host writes).
pub const NUS_WRITE_UUID: &str = "6E400002-B5A3-F393-E0A9-E50E24DCCA9E";
/// Nordic UART TX characteristic (device notifies).
pub const NUS_NOTIFY_UUID: &str = "6E400003-B5A3-F393-E0A9-E50E24DCCA9E";

/// Session driver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Bounded wait for a reply to an identification command.
    pub response_timeout_ms: u64,
    /// Delay between test-signal enable and stream enable.
    pub command_pacing_ms: u64,
    /// Treatment of the EEG length byte.
    pub eeg_length_policy: LengthPolicy,
    /// Command queue capacity.
    pub channel_capacity: usize,
    /// Queued commands before backpressure applies.
    pub max_pending_commands: usize,
    /// Wait for queue space before giving up.
    pub backpressure_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let writer = WriterConfig::default();
        Self {
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
            command_pacing_ms: DEFAULT_COMMAND_PACING_MS,
            eeg_length_policy: LengthPolicy::Lenient,
            channel_capacity: writer.channel_capacity,
            max_pending_commands: writer.max_pending_commands,
            backpressure_timeout_ms: writer.backpressure_timeout.as_millis() as u64,
        }
    }
}

impl ClientConfig {
    /// Parse from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Response timeout as a `Duration`.
    #[inline]
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Command pacing as a `Duration`.
    #[inline]
    pub fn command_pacing(&self) -> Duration {
        Duration::from_millis(self.command_pacing_ms)
    }

    /// Writer settings derived from this config.
    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            max_pending_commands: self.max_pending_commands,
            channel_capacity: self.channel_capacity,
            backpressure_timeout: Duration::from_millis(self.backpressure_timeout_ms),
        }
    }
}

/// BLE discovery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BleConfig {
    /// Name fragments; a device matches if its name contains any of them.
    pub target_names: Vec<String>,
    /// How long to scan.
    pub scan_duration_ms: u64,
    /// Service UUID.
    pub service_uuid: String,
    /// Write characteristic UUID.
    pub write_uuid: String,
    /// Notify characteristic UUID.
    pub notify_uuid: String,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            target_names: DEFAULT_TARGET_NAMES.iter().map(|s| s.to_string()).collect(),
            scan_duration_ms: DEFAULT_SCAN_DURATION_MS,
            service_uuid: NUS_SERVICE_UUID.to_string(),
            write_uuid: NUS_WRITE_UUID.to_string(),
            notify_uuid: NUS_NOTIFY_UUID.to_string(),
        }
    }
}

impl BleConfig {
    /// Whether an advertised name identifies a target device.
    pub fn matches_name(&self, name: &str) -> bool {
        !name.is_empty() && self.target_names.iter().any(|target| name.contains(target.as_str()))
    }
}

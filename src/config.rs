//! Configuration for the broker connection and the boot-time waits.
//!
//! Configuration is plain data with sensible defaults. It can be loaded from
//! a TOML file shaped like:
//!
//! ```toml
//! snapshot_timeout_ms = 100
//!
//! [mqtt]
//! host = "localhost"
//! port = 1883
//! topic_prefix = "astoria"
//! force_protocol_version_3_1 = false
//!
//! [start]
//! poll_interval_ms = 50
//! blink_every = 6
//! ```
//!
//! Missing keys keep their defaults.

use crate::error::{Result, SyncError};
use crate::types::QoS;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Broker protocol revision requested from the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ProtocolVersion {
    V311,
    #[default]
    V5,
}

/// Broker connection configuration.
#[derive(Clone, Debug)]
pub struct BrokerConfig {
    /// Broker host name or address.
    pub host: String,

    /// Broker port.
    pub port: u16,

    /// Client identifier presented to the broker.
    pub client_name: String,

    /// Namespace prepended to topics unless a call opts out.
    pub topic_prefix: Option<String>,

    /// Protocol revision.
    pub protocol: ProtocolVersion,

    /// Keepalive interval negotiated with the broker.
    pub keepalive: Duration,

    /// How long `connect` waits for the broker to acknowledge.
    pub connect_timeout: Duration,

    /// Delivery guarantee for subscriptions and publishes.
    pub qos: QoS,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_name: "boot-sync".to_string(),
            topic_prefix: Some("astoria".to_string()),
            protocol: ProtocolVersion::V5,
            keepalive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(1),
            qos: QoS::AtLeastOnce,
        }
    }
}

impl BrokerConfig {
    /// Same configuration under a different client name.
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }
}

/// Timing of the start-signal race.
#[derive(Clone, Debug)]
pub struct StartConfig {
    /// Interval between reads of the physical start button.
    pub poll_interval: Duration,

    /// Toggle the status lights every this many polls.
    pub blink_every: u32,

    /// Slice used by the remote path when waiting for a broadcast, so it
    /// notices a local start within one slice.
    pub broadcast_poll: Duration,
}

impl Default for StartConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            blink_every: 6,
            broadcast_poll: Duration::from_millis(50),
        }
    }
}

/// Top-level configuration.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub broker: BrokerConfig,

    /// Total budget for a boot-time status snapshot fetch.
    pub snapshot_timeout: Duration,

    pub start: StartConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            snapshot_timeout: Duration::from_millis(100),
            start: StartConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(text)?;
        file.into_config()
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }
}

// --- On-disk representation ---

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    snapshot_timeout_ms: Option<u64>,
    mqtt: MqttSection,
    start: StartSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct MqttSection {
    host: Option<String>,
    port: Option<u16>,
    client_name: Option<String>,
    topic_prefix: Option<String>,
    force_protocol_version_3_1: bool,
    keepalive_s: Option<u64>,
    connect_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct StartSection {
    poll_interval_ms: Option<u64>,
    blink_every: Option<u32>,
    broadcast_poll_ms: Option<u64>,
}

impl ConfigFile {
    fn into_config(self) -> Result<SyncConfig> {
        let mut config = SyncConfig::default();

        if let Some(ms) = self.snapshot_timeout_ms {
            config.snapshot_timeout = Duration::from_millis(ms);
        }

        let mqtt = self.mqtt;
        let broker = &mut config.broker;
        if let Some(host) = mqtt.host {
            if host.trim().is_empty() {
                return Err(SyncError::Config("mqtt.host must not be empty".to_string()));
            }
            broker.host = host;
        }
        if let Some(port) = mqtt.port {
            broker.port = port;
        }
        if let Some(name) = mqtt.client_name {
            broker.client_name = name;
        }
        if let Some(prefix) = mqtt.topic_prefix {
            let prefix = prefix.trim_end_matches('/').to_string();
            broker.topic_prefix = if prefix.is_empty() { None } else { Some(prefix) };
        }
        if mqtt.force_protocol_version_3_1 {
            broker.protocol = ProtocolVersion::V311;
        }
        if let Some(secs) = mqtt.keepalive_s {
            broker.keepalive = Duration::from_secs(secs);
        }
        if let Some(ms) = mqtt.connect_timeout_ms {
            broker.connect_timeout = Duration::from_millis(ms);
        }

        let start = self.start;
        if let Some(ms) = start.poll_interval_ms {
            if ms == 0 {
                return Err(SyncError::Config(
                    "start.poll_interval_ms must be positive".to_string(),
                ));
            }
            config.start.poll_interval = Duration::from_millis(ms);
        }
        if let Some(every) = start.blink_every {
            config.start.blink_every = every.max(1);
        }
        if let Some(ms) = start.broadcast_poll_ms {
            config.start.broadcast_poll = Duration::from_millis(ms.max(1));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.broker.topic_prefix.as_deref(), Some("astoria"));
        assert_eq!(config.snapshot_timeout, Duration::from_millis(100));
        assert_eq!(config.start.blink_every, 6);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SyncConfig::from_toml_str(
            r#"
            [mqtt]
            host = "robot.local"
            force_protocol_version_3_1 = true
            "#,
        )
        .unwrap();
        assert_eq!(config.broker.host, "robot.local");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.broker.protocol, ProtocolVersion::V311);
        assert_eq!(config.start.poll_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_empty_prefix_disables_namespace() {
        let config = SyncConfig::from_toml_str("[mqtt]\ntopic_prefix = \"\"\n").unwrap();
        assert!(config.broker.topic_prefix.is_none());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let result = SyncConfig::from_toml_str("[mqtt\nhost = 3");
        assert!(matches!(result, Err(SyncError::Config(_))));

        let result = SyncConfig::from_toml_str("[start]\npoll_interval_ms = 0\n");
        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "snapshot_timeout_ms = 250\n[mqtt]\nport = 1884").unwrap();

        let config = SyncConfig::load(file.path()).unwrap();
        assert_eq!(config.snapshot_timeout, Duration::from_millis(250));
        assert_eq!(config.broker.port, 1884);
    }
}

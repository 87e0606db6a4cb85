//! Robot metadata and the boot-time status fetch.

use crate::connection::Connection;
use crate::snapshot::{Snapshot, SnapshotWaiter};
use crate::types::ServiceStatus;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Topic carrying the metadata service status.
pub const METADATA_TOPIC: &str = "astmetad";

/// Topic carrying the process manager status.
pub const PROCESS_TOPIC: &str = "astprocd";

/// Path reported when no USB stick is mounted.
pub const NO_USB_PATH: &str = "/dev/null";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum RobotMode {
    Comp,
    #[default]
    Dev,
}

/// Match configuration for this robot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotMetadata {
    pub arena: String,
    pub zone: u32,
    pub mode: RobotMode,
    pub marker_offset: u32,

    /// Match length in seconds, if the robot should stop itself.
    pub game_timeout: Option<u64>,

    pub wifi_enabled: bool,
    pub wifi_ssid: Option<String>,
    pub wifi_psk: Option<String>,
}

impl Default for RobotMetadata {
    fn default() -> Self {
        Self {
            arena: "A".to_string(),
            zone: 0,
            mode: RobotMode::Dev,
            marker_offset: 0,
            game_timeout: None,
            wifi_enabled: true,
            wifi_ssid: None,
            wifi_psk: None,
        }
    }
}

impl RobotMetadata {
    pub fn game_timeout(&self) -> Option<Duration> {
        self.game_timeout.map(Duration::from_secs)
    }
}

/// Status message published on [`METADATA_TOPIC`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataManagerMessage {
    pub status: ServiceStatus,
    #[serde(default)]
    pub metadata: RobotMetadata,
}

/// Mounted storage reported by the process manager.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskInfo {
    pub mount_path: PathBuf,
}

/// Status message published on [`PROCESS_TOPIC`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessManagerMessage {
    pub status: ServiceStatus,
    #[serde(default)]
    pub disk_info: Option<DiskInfo>,
}

/// Result of [`fetch_metadata`].
#[derive(Clone, Debug)]
pub struct BootMetadata {
    pub metadata: Snapshot<RobotMetadata>,

    /// Where the user's code was loaded from, or `/dev/null`.
    pub usb_path: PathBuf,
}

/// Fetch robot metadata and the USB mount path in one bounded wait.
pub fn fetch_metadata(connection: &Connection, timeout: Duration) -> BootMetadata {
    let mut waiter = SnapshotWaiter::new(connection);
    let metadata_key = waiter.expect::<MetadataManagerMessage>(METADATA_TOPIC);
    let process_key = waiter.expect::<ProcessManagerMessage>(PROCESS_TOPIC);

    let mut snapshots = waiter.wait(timeout);
    if !snapshots.is_complete() {
        warn!("Astoria took too long to respond, giving up.");
    }

    let metadata = snapshots.take_or_default(metadata_key).map(|m| m.metadata);
    let usb_path = match snapshots.take_or_default(process_key) {
        Snapshot::Received(ProcessManagerMessage {
            disk_info: Some(disk),
            ..
        }) => disk.mount_path,
        _ => PathBuf::from(NO_USB_PATH),
    };

    info!(
        "Robot metadata: arena {}, zone {}, mode {:?}",
        metadata.value().arena,
        metadata.value().zone,
        metadata.value().mode
    );
    BootMetadata { metadata, usb_path }
}

//! # Boot Sync
//!
//! Boot-time coordination between a robot program and the services around
//! it, over a publish/subscribe broker.
//!
//! ## Core Concepts
//!
//! - **Connection**: One long-lived broker session with a prefixed topic
//!   namespace, tracked subscriptions and automatic resubscription
//! - **Snapshots**: Bounded waits for retained service status messages,
//!   falling back to defaults
//! - **Broadcasts**: Typed, prioritised events shared between processes
//! - **Start race**: The physical start button racing a remote start
//!
//! ## Example
//!
//! ```ignore
//! use boot_sync::{BootSession, LocalControls, SyncConfig};
//!
//! let session = BootSession::open(SyncConfig::load("boot.toml")?, transport);
//! let boot = session.metadata();
//!
//! let mut controls = LocalControls::new(&mut button).with_light(&mut run_led);
//! let report = session.wait_start(&mut controls);
//! ```

pub mod boot;
pub mod broadcast;
pub mod config;
pub mod connection;
pub mod error;
pub mod snapshot;
pub mod start;
pub mod transport;
pub mod types;

// Re-exports
pub use boot::{
    fetch_kch_asset_code, fetch_metadata, send_request, BootMetadata, BootSession, KchLeds,
    ManagerRequest, RobotMetadata, RobotMode, StartReport,
};
pub use broadcast::{
    BroadcastChannel, BroadcastEvent, BroadcastWait, EventQueue, Received, StartButtonEvent,
};
pub use config::{BrokerConfig, ProtocolVersion, StartConfig, SyncConfig};
pub use connection::{Connection, MessageCallback};
pub use error::{Result, SyncError};
pub use snapshot::{fetch_snapshot, Snapshot, SnapshotKey, SnapshotSet, SnapshotWaiter};
pub use start::{
    Buzzer, LocalControls, StartButton, StartFlag, StartOutcome, StartRace, StartState,
    StartTrigger, StatusLight,
};
pub use transport::{BrokerEvent, ConnectOptions, MemoryBroker, MemoryTransport, Transport};
pub use types::*;

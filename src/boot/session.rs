//! Boot sequence tying the connection, snapshots and start race together.

use crate::config::SyncConfig;
use crate::connection::Connection;
use crate::start::{LocalControls, StartOutcome, StartRace};
use crate::transport::Transport;
use std::time::Duration;
use tracing::{info, warn};

use super::kch::fetch_kch_asset_code;
use super::metadata::{fetch_metadata, BootMetadata};

/// What `wait_start` observed.
#[derive(Clone, Debug)]
pub struct StartReport {
    pub outcome: StartOutcome,

    /// Metadata as it stood once the robot was started.
    pub metadata: BootMetadata,
}

impl StartReport {
    pub fn game_timeout(&self) -> Option<Duration> {
        self.metadata.metadata.value().game_timeout()
    }
}

/// A robot's view of the broker during boot.
pub struct BootSession {
    config: SyncConfig,
    connection: Connection,
}

impl BootSession {
    /// Connect to the configured broker.
    ///
    /// A broker that cannot be reached is logged; the session still works
    /// and every wait falls back to defaults or the local button.
    pub fn open(config: SyncConfig, transport: impl Transport + 'static) -> Self {
        let connection = Connection::new(transport, config.broker.clone());
        let (host, port) = (config.broker.host.clone(), config.broker.port);
        if let Err(e) = connection.connect(&host, port) {
            warn!("Continuing without broker: {}", e);
        }
        Self { config, connection }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Current robot metadata and USB path.
    pub fn metadata(&self) -> BootMetadata {
        fetch_metadata(&self.connection, self.config.snapshot_timeout)
    }

    /// Asset code of the kit hat, if `kchd` answers in time.
    pub fn kch_asset_code(&self) -> Option<String> {
        fetch_kch_asset_code(&self.connection, self.config.snapshot_timeout).into_inner()
    }

    /// Wait for the start signal, then reload metadata.
    pub fn wait_start(&self, controls: &mut LocalControls<'_>) -> StartReport {
        let race = StartRace::new(self.config.start.clone());
        let outcome = race.run(Some(&self.connection), controls);

        // The arena and zone may have been changed while we waited.
        let metadata = self.metadata();
        let report = StartReport { outcome, metadata };
        match report.game_timeout() {
            Some(timeout) => info!("Game timeout is {:?}", timeout),
            None => info!("No game timeout set"),
        }
        report
    }
}

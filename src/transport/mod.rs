//! Broker transport seam.
//!
//! The synchronization layer never frames packets itself. It drives a
//! [`Transport`], which owns the wire and reports connection changes and
//! inbound messages as [`BrokerEvent`]s on a channel consumed by a single
//! I/O thread.
//!
//! [`MemoryBroker`] is an in-process broker with retained messages and
//! wildcard filters. It backs the test suite and single-host setups where
//! every service lives in one process.
//!
//! # Example
//!
//! ```ignore
//! let broker = MemoryBroker::new();
//! let connection = Connection::establish(broker.transport(), BrokerConfig::default())?;
//!
//! broker.publish("astoria/astmetad", br#"{"status": "RUNNING"}"#.to_vec(), true);
//! ```

mod memory;
mod types;

pub use memory::{MemoryBroker, MemoryTransport};
pub use types::{BrokerEvent, ConnectOptions, Transport};

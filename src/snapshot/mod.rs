//! One-shot status snapshots with a bounded wait.
//!
//! Remote services publish a retained status message whose `status` field
//! says whether the rest of the payload is authoritative. A
//! [`SnapshotWaiter`] subscribes to one or more such topics, blocks for at
//! most the given budget, and always unsubscribes before returning.
//!
//! Nothing here fails: malformed, invalid or not-running messages are
//! logged and ignored, and anything missing when the budget runs out is
//! replaced by the caller's default, reported as [`Snapshot::Defaulted`].
//!
//! # Example
//!
//! ```ignore
//! let mut waiter = SnapshotWaiter::new(&connection);
//! let metadata = waiter.expect::<MetadataManagerMessage>("astmetad");
//! let process = waiter.expect::<ProcessManagerMessage>("astprocd");
//!
//! let mut snapshots = waiter.wait(Duration::from_millis(100));
//! let metadata = snapshots.take_or_default(metadata);
//! let process = snapshots.take_or_default(process);
//! ```

mod types;
mod waiter;

pub use types::{Snapshot, SnapshotKey, SnapshotSet};
pub use waiter::{fetch_snapshot, SnapshotWaiter};

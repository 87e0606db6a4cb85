//! Robot boot sequence.
//!
//! A [`BootSession`] owns the broker connection for the lifetime of the
//! robot program. At boot it fetches the robot metadata and USB mount path
//! from their status topics, then races the physical start button against
//! a start broadcast.
//!
//! # Example
//!
//! ```ignore
//! let session = BootSession::open(SyncConfig::default(), transport);
//! let boot = session.metadata();
//! println!("zone {}", boot.metadata.value().zone);
//!
//! let mut led = KchLeds::new(session.connection());
//! let mut controls = LocalControls::new(&mut button).with_light(&mut led);
//! let report = session.wait_start(&mut controls);
//! ```

mod kch;
mod metadata;
mod request;
mod session;

pub use metadata::{
    fetch_metadata, BootMetadata, DiskInfo, MetadataManagerMessage, ProcessManagerMessage,
    RobotMetadata, RobotMode, METADATA_TOPIC, NO_USB_PATH, PROCESS_TOPIC,
};
pub use kch::{
    fetch_kch_asset_code, KchInfo, KchLeds, KchStatusMessage, Rgb, UserLed, UserLedsUpdate,
    KCH_SERVICE,
};
pub use request::{send_request, ManagerRequest};
pub use session::{BootSession, StartReport};

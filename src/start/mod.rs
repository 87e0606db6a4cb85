//! Start-signal race.
//!
//! Waiting for the start of a match races two paths to one set-once flag:
//! a remote start broadcast, and a local poll of the physical start button
//! that blinks the status lights while it waits. Whichever path sets the
//! flag first wins; the other notices within one poll and stops. Both are
//! equally valid starts.
//!
//! ```text
//! WAITING --button--> LOCAL_TRIGGERED  --+
//!    |                                   +--> DONE
//!    +---broadcast--> REMOTE_TRIGGERED --+
//! ```
//!
//! The local path never depends on the broker, so a start always arrives
//! even when the broker is unreachable.

mod race;
mod types;

pub use race::{LocalControls, StartRace};
pub use types::{Buzzer, StartButton, StartFlag, StartOutcome, StartState, StartTrigger, StatusLight};

//! Kit hat (KCH) board, served by `kchd`.

use crate::connection::Connection;
use crate::snapshot::{fetch_snapshot, Snapshot};
use crate::start::StatusLight;
use crate::types::ServiceStatus;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::request::send_request;

/// Service owning the kit hat. Also its status topic.
pub const KCH_SERVICE: &str = "kchd";

/// Red, green, blue channel states of one user LED.
pub type Rgb = [bool; 3];

/// Payload of `kchd/request/user_leds`. Every request carries the whole
/// LED state; the service applies it as given.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLedsUpdate {
    pub start: bool,
    pub a: Rgb,
    pub b: Rgb,
    pub c: Rgb,
}

/// One of the three RGB user LEDs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserLed {
    A,
    B,
    C,
}

/// The kit hat's LEDs, driven through `kchd`.
///
/// Used as a [`StatusLight`] it blinks the start LED, which goes dark once
/// the robot is running. User LED colours survive start LED changes.
pub struct KchLeds<'c> {
    connection: &'c Connection,
    state: UserLedsUpdate,
}

impl<'c> KchLeds<'c> {
    pub fn new(connection: &'c Connection) -> Self {
        Self {
            connection,
            state: UserLedsUpdate::default(),
        }
    }

    /// Last state sent.
    pub fn state(&self) -> UserLedsUpdate {
        self.state
    }

    pub fn set_start(&mut self, lit: bool) {
        self.state.start = lit;
        self.send();
    }

    pub fn set_user_led(&mut self, led: UserLed, colour: Rgb) {
        match led {
            UserLed::A => self.state.a = colour,
            UserLed::B => self.state.b = colour,
            UserLed::C => self.state.c = colour,
        }
        self.send();
    }

    fn send(&self) {
        send_request(self.connection, KCH_SERVICE, "user_leds", self.state);
    }
}

impl StatusLight for KchLeds<'_> {
    fn set_lit(&mut self, lit: bool) {
        self.set_start(lit);
    }

    fn show_started(&mut self) {
        self.set_start(false);
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KchInfo {
    pub asset_code: String,
}

/// Status message published on [`KCH_SERVICE`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KchStatusMessage {
    pub status: ServiceStatus,
    pub kch: KchInfo,
}

/// Asset code of the attached kit hat, if `kchd` reports one in time.
pub fn fetch_kch_asset_code(connection: &Connection, timeout: Duration) -> Snapshot<Option<String>> {
    fetch_snapshot::<Option<KchStatusMessage>>(connection, KCH_SERVICE, timeout, None)
        .map(|message| message.map(|m| m.kch.asset_code))
}

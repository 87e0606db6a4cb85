//! Start race coordinator.

use crate::broadcast::{BroadcastChannel, BroadcastWait, StartButtonEvent};
use crate::config::StartConfig;
use crate::connection::Connection;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::types::{
    Buzzer, StartButton, StartFlag, StartOutcome, StartState, StartTrigger, StatusLight,
};

/// Hardware used by the local path.
pub struct LocalControls<'a> {
    pub button: &'a mut dyn StartButton,
    pub lights: Vec<&'a mut dyn StatusLight>,
    pub buzzer: Option<&'a mut dyn Buzzer>,
}

impl<'a> LocalControls<'a> {
    pub fn new(button: &'a mut dyn StartButton) -> Self {
        Self {
            button,
            lights: Vec::new(),
            buzzer: None,
        }
    }

    pub fn with_light(mut self, light: &'a mut dyn StatusLight) -> Self {
        self.lights.push(light);
        self
    }

    pub fn with_buzzer(mut self, buzzer: &'a mut dyn Buzzer) -> Self {
        self.buzzer = Some(buzzer);
        self
    }

    fn set_lights(&mut self, lit: bool) {
        for light in self.lights.iter_mut() {
            light.set_lit(lit);
        }
    }
}

fn remote_path(
    channel: &BroadcastChannel<'_, StartButtonEvent>,
    flag: &StartFlag,
    poll: Duration,
) {
    while !flag.is_set() {
        if let BroadcastWait::Event(received) = channel.wait_broadcast(poll) {
            if flag.trigger(StartTrigger::Remote) {
                info!("Start broadcast received from {}", received.sender_name);
            }
        }
    }
    debug!("Remote start path finished");
}

/// Races a remote start broadcast against the local start button.
pub struct StartRace {
    config: StartConfig,
    flag: StartFlag,
    done: AtomicBool,
}

impl StartRace {
    pub fn new(config: StartConfig) -> Self {
        Self {
            config,
            flag: StartFlag::new(),
            done: AtomicBool::new(false),
        }
    }

    /// The shared flag. Triggering it from elsewhere ends the race.
    pub fn flag(&self) -> &StartFlag {
        &self.flag
    }

    pub fn state(&self) -> StartState {
        if self.done.load(Ordering::Acquire) {
            return StartState::Done;
        }
        match self.flag.winner() {
            None => StartState::Waiting,
            Some(StartTrigger::Local) => StartState::LocalTriggered,
            Some(StartTrigger::Remote) => StartState::RemoteTriggered,
        }
    }

    /// Block until either path starts the robot.
    ///
    /// With no connection only the local path runs. On return the lights
    /// show "started" and the broadcast subscription is closed.
    pub fn run(
        &self,
        connection: Option<&Connection>,
        controls: &mut LocalControls<'_>,
    ) -> StartOutcome {
        info!("Waiting for start signal");
        let started = Instant::now();

        let mut channel = connection.and_then(|connection| {
            if !connection.is_connected() {
                warn!("Broker unavailable, listening for a remote start once it returns");
            }
            let sender = connection.config().client_name.clone();
            match BroadcastChannel::<StartButtonEvent>::open(connection, sender) {
                Ok(channel) => Some(channel),
                Err(e) => {
                    warn!("Remote start disabled: {}", e);
                    None
                }
            }
        });

        thread::scope(|scope| {
            if let Some(channel) = channel.as_ref() {
                let flag = &self.flag;
                let poll = self.config.broadcast_poll;
                scope.spawn(move || remote_path(channel, flag, poll));
            }
            self.local_path(controls);
        });

        for light in controls.lights.iter_mut() {
            light.show_started();
        }
        if let Some(channel) = channel.as_mut() {
            channel.close();
        }
        self.done.store(true, Ordering::Release);

        let outcome = StartOutcome {
            trigger: self.flag.winner().unwrap_or(StartTrigger::Local),
            waited: started.elapsed(),
        };
        info!("Start signal received ({:?}); continuing", outcome.trigger);
        outcome
    }

    fn local_path(&self, controls: &mut LocalControls<'_>) {
        if let Some(buzzer) = controls.buzzer.as_mut() {
            buzzer.buzz();
        }
        // Clear a press latched before we started waiting.
        let _ = controls.button.is_pressed();

        let blink_every = self.config.blink_every.max(1);
        let mut polls: u32 = 0;
        let mut lit = false;
        while !self.flag.is_set() {
            if controls.button.is_pressed() {
                if self.flag.trigger(StartTrigger::Local) {
                    info!("Start button pressed");
                }
                break;
            }
            if polls % blink_every == 0 {
                lit = !lit;
                controls.set_lights(lit);
            }
            thread::sleep(self.config.poll_interval);
            polls = polls.wrapping_add(1);
        }
        debug!("Local start path finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PressAfter {
        reads: u32,
        press_on: u32,
    }

    impl StartButton for PressAfter {
        fn is_pressed(&mut self) -> bool {
            self.reads += 1;
            self.reads >= self.press_on
        }
    }

    #[derive(Default)]
    struct RecordingLight {
        changes: Vec<bool>,
    }

    impl StatusLight for RecordingLight {
        fn set_lit(&mut self, lit: bool) {
            self.changes.push(lit);
        }
    }

    struct InvertedLight {
        lit: bool,
    }

    impl StatusLight for InvertedLight {
        fn set_lit(&mut self, lit: bool) {
            self.lit = lit;
        }

        fn show_started(&mut self) {
            self.lit = false;
        }
    }

    fn fast_config() -> StartConfig {
        StartConfig {
            poll_interval: Duration::from_millis(5),
            blink_every: 2,
            broadcast_poll: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_local_start_without_broker() {
        let race = StartRace::new(fast_config());
        let mut button = PressAfter { reads: 0, press_on: 6 };
        let mut light = RecordingLight::default();
        let mut controls = LocalControls::new(&mut button).with_light(&mut light);

        assert_eq!(race.state(), StartState::Waiting);
        let outcome = race.run(None, &mut controls);
        drop(controls);

        assert_eq!(outcome.trigger, StartTrigger::Local);
        assert_eq!(race.state(), StartState::Done);
        // Two blinks while waiting, then the started state.
        assert_eq!(light.changes, vec![true, false, true]);
    }

    #[test]
    fn test_latched_press_is_discarded() {
        struct Latched {
            reads: u32,
        }

        impl StartButton for Latched {
            fn is_pressed(&mut self) -> bool {
                self.reads += 1;
                self.reads == 1 || self.reads >= 4
            }
        }

        let race = StartRace::new(fast_config());
        let mut button = Latched { reads: 0 };
        let mut controls = LocalControls::new(&mut button);

        race.run(None, &mut controls);
        drop(controls);
        assert_eq!(button.reads, 4);
    }

    #[test]
    fn test_lights_use_their_own_started_state() {
        let race = StartRace::new(fast_config());
        let mut button = PressAfter { reads: 0, press_on: 4 };
        let mut light = InvertedLight { lit: true };
        let mut controls = LocalControls::new(&mut button).with_light(&mut light);

        race.run(None, &mut controls);
        drop(controls);
        assert!(!light.lit);
    }

    #[test]
    fn test_pre_set_flag_returns_immediately() {
        let race = StartRace::new(fast_config());
        race.flag().trigger(StartTrigger::Remote);
        let mut button = PressAfter { reads: 0, press_on: u32::MAX };
        let mut controls = LocalControls::new(&mut button);

        let outcome = race.run(None, &mut controls);
        assert_eq!(outcome.trigger, StartTrigger::Remote);
        assert!(outcome.waited < Duration::from_millis(500));
    }
}

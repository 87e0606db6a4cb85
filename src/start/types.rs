//! Start race collaborators and state.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

/// A physical start button.
pub trait StartButton {
    /// Read the button. Hardware may latch a press until the next read.
    fn is_pressed(&mut self) -> bool;
}

/// A light that blinks while waiting for the start.
pub trait StatusLight {
    fn set_lit(&mut self, lit: bool);

    /// Put the light in its "started" state. Lit by default.
    fn show_started(&mut self) {
        self.set_lit(true);
    }
}

/// Audible cue that the robot is ready and waiting.
pub trait Buzzer {
    fn buzz(&mut self);
}

/// Which path started the robot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartTrigger {
    Local,
    Remote,
}

/// Position in the start state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartState {
    Waiting,
    LocalTriggered,
    RemoteTriggered,
    Done,
}

/// How a race finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StartOutcome {
    pub trigger: StartTrigger,
    /// Time spent waiting.
    pub waited: Duration,
}

const UNSET: u8 = 0;
const LOCAL: u8 = 1;
const REMOTE: u8 = 2;

/// Set-once start flag shared by both paths.
///
/// Only the first `trigger` has an effect; later ones are no-ops.
#[derive(Debug, Default)]
pub struct StartFlag(AtomicU8);

impl StartFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a start. Returns true if this call won the race.
    pub fn trigger(&self, trigger: StartTrigger) -> bool {
        let value = match trigger {
            StartTrigger::Local => LOCAL,
            StartTrigger::Remote => REMOTE,
        };
        self.0
            .compare_exchange(UNSET, value, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire) != UNSET
    }

    /// The winning path, once set.
    pub fn winner(&self) -> Option<StartTrigger> {
        match self.0.load(Ordering::Acquire) {
            LOCAL => Some(StartTrigger::Local),
            REMOTE => Some(StartTrigger::Remote),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_first_trigger_wins() {
        let flag = StartFlag::new();
        assert!(!flag.is_set());

        assert!(flag.trigger(StartTrigger::Remote));
        assert!(!flag.trigger(StartTrigger::Local));
        assert_eq!(flag.winner(), Some(StartTrigger::Remote));
    }

    #[test]
    fn test_concurrent_triggers_have_one_winner() {
        let flag = Arc::new(StartFlag::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let flag = Arc::clone(&flag);
                thread::spawn(move || {
                    let trigger = if i % 2 == 0 {
                        StartTrigger::Local
                    } else {
                        StartTrigger::Remote
                    };
                    flag.trigger(trigger)
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert!(flag.is_set());
    }
}

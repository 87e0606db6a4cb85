//! Broadcast event types and wire envelope.

use crate::types::Timestamp;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Sub-namespace all broadcast events are published under.
pub const BROADCAST_NAMESPACE: &str = "broadcast";

/// An event type that can be broadcast.
pub trait BroadcastEvent: Serialize + DeserializeOwned + Send + 'static {
    /// Value of the `event_name` field and last topic level.
    const NAME: &'static str;
}

/// Topic (without prefix) for an event type.
pub fn broadcast_topic<E: BroadcastEvent>() -> String {
    format!("{}/{}", BROADCAST_NAMESPACE, E::NAME)
}

/// Wire form of a broadcast: identity fields plus the event's own fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<E> {
    pub event_name: String,
    pub sender_name: String,
    /// Ordering key; lower values are delivered first.
    #[serde(default)]
    pub priority: i32,
    #[serde(flatten)]
    pub event: E,
}

/// A validated event taken off a channel's queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Received<E> {
    pub event: E,
    pub sender_name: String,
    pub priority: i32,
    pub received: Timestamp,
}

/// Result of waiting on a broadcast channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BroadcastWait<E> {
    Event(Received<E>),
    /// The timeout elapsed with nothing queued.
    Empty,
}

impl<E> BroadcastWait<E> {
    pub fn is_empty(&self) -> bool {
        matches!(self, BroadcastWait::Empty)
    }

    pub fn into_event(self) -> Option<Received<E>> {
        match self {
            BroadcastWait::Event(received) => Some(received),
            BroadcastWait::Empty => None,
        }
    }
}

/// The start button was pressed on a remote controller.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartButtonEvent {}

impl BroadcastEvent for StartButtonEvent {
    const NAME: &'static str = "start_button";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_start_button_topic() {
        assert_eq!(broadcast_topic::<StartButtonEvent>(), "broadcast/start_button");
    }

    #[test]
    fn test_envelope_wire_format() {
        let envelope = Envelope {
            event_name: StartButtonEvent::NAME.to_string(),
            sender_name: "astprocd".to_string(),
            priority: 0,
            event: StartButtonEvent {},
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({"event_name": "start_button", "sender_name": "astprocd", "priority": 0})
        );
    }

    #[test]
    fn test_priority_defaults_to_zero() {
        let envelope: Envelope<StartButtonEvent> =
            serde_json::from_value(json!({"event_name": "start_button", "sender_name": "x"}))
                .unwrap();
        assert_eq!(envelope.priority, 0);
    }
}

//! Core types shared by the connection, snapshot and broadcast layers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Topic level separator.
pub const TOPIC_SEPARATOR: char = '/';

/// Delivery guarantee requested for subscriptions and publishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum QoS {
    AtMostOnce,
    #[default]
    AtLeastOnce,
    ExactlyOnce,
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or_default();
        Timestamp(micros)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// A message as delivered by the broker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Full topic the message was published to.
    pub topic: String,

    /// Raw payload, normally UTF-8 JSON.
    pub payload: Vec<u8>,

    /// Whether the broker delivered this from its retained store.
    pub retain: bool,

    /// When the message was handed to this process.
    pub received: Timestamp,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>, retain: bool) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retain,
            received: Timestamp::now(),
        }
    }

    /// Payload as UTF-8, if it is valid.
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

/// Status discriminator carried by every service status message.
///
/// Only `Running` means the payload is authoritative.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceStatus {
    Running,
    #[default]
    Stopped,
    #[serde(other)]
    Unknown,
}

impl ServiceStatus {
    pub fn is_running(self) -> bool {
        matches!(self, ServiceStatus::Running)
    }
}

/// Join an optional prefix onto a topic.
pub fn join_topic(prefix: Option<&str>, topic: &str) -> String {
    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}{TOPIC_SEPARATOR}{topic}"),
        _ => topic.to_string(),
    }
}

/// Check that a subscription filter is well formed.
///
/// `+` must occupy a whole level, `#` must occupy the last level.
pub fn is_valid_filter(filter: &str) -> bool {
    if filter.is_empty() {
        return false;
    }
    let levels: Vec<&str> = filter.split(TOPIC_SEPARATOR).collect();
    let last = levels.len() - 1;
    levels.iter().enumerate().all(|(i, level)| {
        if level.contains('#') {
            *level == "#" && i == last
        } else if level.contains('+') {
            *level == "+"
        } else {
            true
        }
    })
}

/// Whether a concrete topic is matched by a subscription filter.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    if filter == topic {
        return true;
    }
    // Wildcards never match system topics at the first level.
    if topic.starts_with('$') && !filter.starts_with('$') {
        return false;
    }

    let mut filter_levels = filter.split(TOPIC_SEPARATOR);
    let mut topic_levels = topic.split(TOPIC_SEPARATOR);
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Whether a filter contains wildcards.
pub fn is_wildcard(filter: &str) -> bool {
    filter.contains('+') || filter.contains('#')
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_join_topic() {
        assert_eq!(join_topic(Some("astoria"), "astmetad"), "astoria/astmetad");
        assert_eq!(join_topic(None, "astmetad"), "astmetad");
        assert_eq!(join_topic(Some(""), "astmetad"), "astmetad");
    }

    #[test]
    fn test_topic_matches_wildcards() {
        assert!(topic_matches("a/+/c", "a/b/c"));
        assert!(!topic_matches("a/+/c", "a/b/d"));
        assert!(topic_matches("a/#", "a/b/c"));
        assert!(topic_matches("a/#", "a"));
        assert!(!topic_matches("a/b", "a/b/c"));
        assert!(!topic_matches("+/x", "$SYS/x"));
    }

    #[test]
    fn test_filter_validation() {
        assert!(is_valid_filter("astoria/broadcast/start_button"));
        assert!(is_valid_filter("a/+/c"));
        assert!(is_valid_filter("#"));
        assert!(!is_valid_filter("a/#/c"));
        assert!(!is_valid_filter("a/b+"));
        assert!(!is_valid_filter(""));
    }

    #[test]
    fn test_service_status_decoding() {
        let running: ServiceStatus = serde_json::from_str("\"RUNNING\"").unwrap();
        assert!(running.is_running());
        let stopped: ServiceStatus = serde_json::from_str("\"STOPPED\"").unwrap();
        assert!(!stopped.is_running());
        let other: ServiceStatus = serde_json::from_str("\"BOOTING\"").unwrap();
        assert_eq!(other, ServiceStatus::Unknown);
    }

    proptest! {
        #[test]
        fn prop_concrete_topic_matches_itself(levels in prop::collection::vec("[a-z0-9_]{1,8}", 1..6)) {
            let topic = levels.join("/");
            prop_assert!(topic_matches(&topic, &topic));
            prop_assert!(topic_matches("#", &topic));
        }

        #[test]
        fn prop_plus_matches_exactly_one_level(levels in prop::collection::vec("[a-z0-9_]{1,8}", 1..6)) {
            let topic = levels.join("/");
            let filter = vec!["+"; levels.len()].join("/");
            prop_assert!(topic_matches(&filter, &topic));
            let longer = format!("{filter}/+");
            prop_assert!(!topic_matches(&longer, &topic));
        }
    }
}

//! Snapshot waiter.

use crate::connection::{Connection, MessageCallback};
use crate::types::{Message, ServiceStatus};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use super::types::{Snapshot, SnapshotKey, SnapshotSet};

type Validator = fn(&Value) -> Result<(), serde_json::Error>;

fn validate_as<T: DeserializeOwned>(value: &Value) -> Result<(), serde_json::Error> {
    T::deserialize(value).map(|_| ())
}

/// One expected snapshot.
struct Slot {
    topic: String,
    validate: Validator,
    done_tx: Sender<()>,
    done_rx: Receiver<()>,
}

/// A slot as seen from its topic's handler.
struct SlotTarget {
    index: usize,
    validate: Validator,
    done: Sender<()>,
}

/// Handler for one topic, moved onto the I/O thread. Fills every slot
/// expecting that topic and passes each message on to the handler it
/// displaced.
struct TopicHandler {
    topic: String,
    targets: Vec<SlotTarget>,
    collected: Arc<Mutex<Vec<Option<Value>>>>,
    displaced: Arc<Mutex<Option<MessageCallback>>>,
}

impl TopicHandler {
    fn handle(&self, message: &Message) {
        let displaced = self.displaced.lock().clone();
        if let Some(callback) = displaced {
            callback(message);
        }

        let value: Value = match serde_json::from_slice(&message.payload) {
            Ok(value) => value,
            Err(e) => {
                error!("Could not decode JSON status on {}: {}", self.topic, e);
                return;
            }
        };

        let status = match value.get("status").map(ServiceStatus::deserialize) {
            Some(Ok(status)) => status,
            Some(Err(e)) => {
                error!("Invalid status field on {}: {}", self.topic, e);
                return;
            }
            None => {
                error!("Status message on {} has no status field", self.topic);
                return;
            }
        };
        if !status.is_running() {
            warn!("Cannot get {} snapshot, service is not running", self.topic);
            return;
        }

        for target in &self.targets {
            if let Err(e) = (target.validate)(&value) {
                error!("Status message on {} failed validation: {}", self.topic, e);
                continue;
            }
            let mut collected = self.collected.lock();
            if let Some(entry) = collected.get_mut(target.index) {
                if entry.is_none() {
                    debug!("Received {} snapshot", self.topic);
                    *entry = Some(value.clone());
                    let _ = target.done.try_send(());
                }
            }
        }
    }
}

/// Waits once for status snapshots on a set of topics.
pub struct SnapshotWaiter<'c> {
    connection: &'c Connection,
    slots: Vec<Slot>,
}

impl<'c> SnapshotWaiter<'c> {
    pub fn new(connection: &'c Connection) -> Self {
        Self {
            connection,
            slots: Vec::new(),
        }
    }

    /// Expect one status message on `topic` (prefix applied), decoded as `T`.
    ///
    /// `T` is the whole message, including its `status` field. A message
    /// that does not decode as `T` is treated as if it never arrived.
    pub fn expect<T: DeserializeOwned>(&mut self, topic: &str) -> SnapshotKey<T> {
        let (done_tx, done_rx) = bounded(1);
        self.slots.push(Slot {
            topic: topic.to_string(),
            validate: validate_as::<T>,
            done_tx,
            done_rx,
        });
        SnapshotKey::new(self.slots.len() - 1)
    }

    /// Subscribe, wait up to `timeout` in total, then unsubscribe.
    ///
    /// The budget is split evenly into consecutive per-topic deadlines;
    /// messages that land for a later topic while an earlier one is being
    /// waited on are still collected. Returns early once every topic has
    /// answered.
    ///
    /// A topic that already has a handler on the connection keeps receiving
    /// its messages during the wait and gets its handler back afterwards.
    pub fn wait(self, timeout: Duration) -> SnapshotSet {
        let count = self.slots.len();
        let collected = Arc::new(Mutex::new(vec![None; count]));

        let mut attached = Vec::new();
        for (topic, targets) in self.targets_by_topic() {
            let displaced = Arc::new(Mutex::new(None));
            let handler = TopicHandler {
                topic: topic.clone(),
                targets,
                collected: Arc::clone(&collected),
                displaced: Arc::clone(&displaced),
            };
            let callback: MessageCallback = Arc::new(move |m: &Message| handler.handle(m));
            match self.connection.replace_handler(&topic, callback, false) {
                Ok((full_topic, previous)) => {
                    *displaced.lock() = previous.clone();
                    attached.push((full_topic, previous));
                }
                Err(e) => warn!("Cannot wait for {}: {}", topic, e),
            }
        }

        if count > 0 && self.connection.is_connected() {
            self.wait_slots(timeout);
        } else if count > 0 {
            warn!("Unable to reach the broker, using default snapshots");
        }

        for (full_topic, previous) in attached {
            self.connection.restore_handler(&full_topic, previous);
        }

        let values = std::mem::take(&mut *collected.lock());
        let topics = self.slots.into_iter().map(|s| s.topic).collect();
        SnapshotSet::new(topics, values)
    }

    /// Slots grouped by topic, in order of first expectation.
    fn targets_by_topic(&self) -> Vec<(String, Vec<SlotTarget>)> {
        let mut grouped: Vec<(String, Vec<SlotTarget>)> = Vec::new();
        for (index, slot) in self.slots.iter().enumerate() {
            let target = SlotTarget {
                index,
                validate: slot.validate,
                done: slot.done_tx.clone(),
            };
            match grouped.iter_mut().find(|(topic, _)| *topic == slot.topic) {
                Some((_, targets)) => targets.push(target),
                None => grouped.push((slot.topic.clone(), vec![target])),
            }
        }
        grouped
    }

    fn wait_slots(&self, timeout: Duration) {
        let start = Instant::now();
        let step = timeout / self.slots.len() as u32;
        let last = self.slots.len() - 1;

        for (i, slot) in self.slots.iter().enumerate() {
            let deadline = if i == last {
                start + timeout
            } else {
                start + step * (i as u32 + 1)
            };
            if slot.done_rx.recv_deadline(deadline).is_err() {
                debug!("No snapshot on {} by its deadline", slot.topic);
            }
        }

        debug!("Snapshot wait finished after {:?}", start.elapsed());
    }
}

/// Fetch a single snapshot, falling back to `default`.
pub fn fetch_snapshot<T: DeserializeOwned>(
    connection: &Connection,
    topic: &str,
    timeout: Duration,
    default: T,
) -> Snapshot<T> {
    let mut waiter = SnapshotWaiter::new(connection);
    let key = waiter.expect::<T>(topic);
    let mut snapshots = waiter.wait(timeout);
    if !snapshots.is_complete() {
        warn!("{} took too long to respond, giving up", topic);
    }
    snapshots.take(key, default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerConfig;
    use crate::transport::MemoryBroker;
    use serde_json::json;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Status {
        status: ServiceStatus,
        #[serde(default)]
        zone: u32,
    }

    fn connected(broker: &MemoryBroker) -> Connection {
        Connection::establish(broker.transport(), BrokerConfig::default()).unwrap()
    }

    #[test]
    fn test_same_topic_expected_twice() {
        let broker = MemoryBroker::new();
        broker.publish(
            "astoria/astmetad",
            json!({"status": "RUNNING", "zone": 2}).to_string(),
            true,
        );
        let connection = connected(&broker);

        let mut waiter = SnapshotWaiter::new(&connection);
        let first = waiter.expect::<Status>("astmetad");
        let second = waiter.expect::<Value>("astmetad");
        let mut snapshots = waiter.wait(Duration::from_millis(500));

        assert!(snapshots.is_complete());
        assert_eq!(snapshots.take_or_default(first).value().zone, 2);
        assert_eq!(snapshots.take(second, Value::Null).value()["zone"], 2);
        assert!(connection.subscriptions().is_empty());
    }

    #[test]
    fn test_existing_handler_keeps_hearing_its_topic() {
        let broker = MemoryBroker::new();
        let connection = connected(&broker);
        let (tx, rx) = bounded(8);
        connection
            .subscribe("astmetad", move |m: &Message| {
                let _ = tx.send(m.payload.clone());
            }, false)
            .unwrap();
        let before = connection.subscriptions();

        let publisher = broker.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            publisher.publish(
                "astoria/astmetad",
                json!({"status": "RUNNING", "zone": 4}).to_string(),
                false,
            );
        });
        let snapshot = fetch_snapshot(
            &connection,
            "astmetad",
            Duration::from_millis(500),
            Status::default(),
        );
        handle.join().unwrap();

        assert_eq!(snapshot.value().zone, 4);
        assert!(rx.recv_timeout(Duration::from_millis(500)).is_ok());

        assert_eq!(connection.subscriptions(), before);
        assert!(broker.active_filters().contains("astoria/astmetad"));
        broker.publish("astoria/astmetad", b"after", false);
        assert_eq!(rx.recv_timeout(Duration::from_millis(500)).unwrap(), b"after".to_vec());
    }
}

//! In-process broker.

use crate::error::{Result, SyncError};
use crate::types::{is_valid_filter, is_wildcard, topic_matches, Message, QoS};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use super::types::{BrokerEvent, ConnectOptions, Transport};

/// A client session as seen by the broker.
struct ClientLink {
    options: ConnectOptions,
    events: Sender<BrokerEvent>,
    filters: HashSet<String>,
    online: bool,
}

impl ClientLink {
    fn wants(&self, topic: &str) -> bool {
        self.online && self.filters.iter().any(|f| topic_matches(f, topic))
    }

    fn send(&self, event: BrokerEvent) {
        // A closed receiver means the owning connection is shutting down.
        let _ = self.events.send(event);
    }
}

#[derive(Default)]
struct BrokerState {
    refusing: bool,
    next_client: u64,
    clients: HashMap<u64, ClientLink>,
    retained: BTreeMap<String, Vec<u8>>,
    published: Vec<Message>,
}

impl BrokerState {
    fn route(&mut self, topic: &str, payload: &[u8], retain: bool) {
        self.published.push(Message::new(topic, payload.to_vec(), retain));

        if retain {
            if payload.is_empty() {
                self.retained.remove(topic);
            } else {
                self.retained.insert(topic.to_string(), payload.to_vec());
            }
        }

        for client in self.clients.values() {
            if client.wants(topic) {
                client.send(BrokerEvent::Message(Message::new(
                    topic,
                    payload.to_vec(),
                    false,
                )));
            }
        }
    }
}

/// An in-process broker shared by any number of [`MemoryTransport`]s.
///
/// Cloning yields another handle to the same broker.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    /// Create an empty broker that accepts connections.
    pub fn new() -> Self {
        Self::default()
    }

    /// A new client transport attached to this broker.
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport {
            broker: self.clone(),
            client: Mutex::new(None),
        }
    }

    /// Refuse (false) or accept (true) new connections.
    pub fn set_accepting(&self, accepting: bool) {
        self.state.lock().refusing = !accepting;
    }

    /// Publish on behalf of another service.
    ///
    /// A retained publish with an empty payload clears the retained message.
    pub fn publish(&self, topic: &str, payload: impl AsRef<[u8]>, retain: bool) {
        self.state.lock().route(topic, payload.as_ref(), retain);
    }

    /// Drop every live session.
    ///
    /// Sessions are clean: the broker forgets their subscriptions, so a
    /// client must subscribe again after `restore_connections`.
    pub fn drop_connections(&self) {
        let mut state = self.state.lock();
        for client in state.clients.values_mut().filter(|c| c.online) {
            client.online = false;
            client.filters.clear();
            client.send(BrokerEvent::Disconnected);
        }
        debug!("Dropped all client sessions");
    }

    /// Bring every dropped session back up.
    pub fn restore_connections(&self) {
        let mut state = self.state.lock();
        for client in state.clients.values_mut().filter(|c| !c.online) {
            client.online = true;
            client.send(BrokerEvent::Connected);
        }
        debug!("Restored all client sessions");
    }

    /// Every publish the broker accepted, in order.
    pub fn published(&self) -> Vec<Message> {
        self.state.lock().published.clone()
    }

    /// Publishes accepted on one topic.
    pub fn published_on(&self, topic: &str) -> Vec<Message> {
        self.state
            .lock()
            .published
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Filters currently subscribed by live sessions.
    pub fn active_filters(&self) -> BTreeSet<String> {
        self.state
            .lock()
            .clients
            .values()
            .filter(|c| c.online)
            .flat_map(|c| c.filters.iter().cloned())
            .collect()
    }

    /// Options presented by each live session, in connection order.
    pub fn sessions(&self) -> Vec<ConnectOptions> {
        let state = self.state.lock();
        let mut ids: Vec<&u64> = state.clients.keys().collect();
        ids.sort();
        ids.into_iter()
            .filter_map(|id| state.clients.get(id))
            .filter(|c| c.online)
            .map(|c| c.options.clone())
            .collect()
    }

    /// Number of sessions attached, live or dropped.
    pub fn client_count(&self) -> usize {
        self.state.lock().clients.len()
    }

    /// Retained payload for a topic.
    pub fn retained(&self, topic: &str) -> Option<Vec<u8>> {
        self.state.lock().retained.get(topic).cloned()
    }
}

/// A client transport attached to a [`MemoryBroker`].
pub struct MemoryTransport {
    broker: MemoryBroker,
    client: Mutex<Option<u64>>,
}

impl MemoryTransport {
    fn with_live_client<T>(&self, f: impl FnOnce(&mut BrokerState, u64) -> T) -> Result<T> {
        let client = self.client.lock();
        let id = client.ok_or(SyncError::NotConnected)?;
        let mut state = self.broker.state.lock();
        match state.clients.get(&id) {
            Some(link) if link.online => Ok(f(&mut state, id)),
            _ => Err(SyncError::NotConnected),
        }
    }
}

impl Transport for MemoryTransport {
    fn connect(&self, options: &ConnectOptions, events: Sender<BrokerEvent>) -> Result<()> {
        let (host, port) = (options.host.as_str(), options.port);
        if host.trim().is_empty() || port == 0 {
            return Err(SyncError::ConnectFailed {
                host: host.to_string(),
                port,
                reason: "invalid address".to_string(),
            });
        }

        let mut client = self.client.lock();
        let mut state = self.broker.state.lock();
        if state.refusing {
            return Err(SyncError::ConnectFailed {
                host: host.to_string(),
                port,
                reason: "connection refused".to_string(),
            });
        }

        if let Some(old) = client.take() {
            state.clients.remove(&old);
        }

        let id = state.next_client;
        state.next_client += 1;
        let link = ClientLink {
            options: options.clone(),
            events,
            filters: HashSet::new(),
            online: true,
        };
        link.send(BrokerEvent::Connected);
        state.clients.insert(id, link);
        *client = Some(id);
        Ok(())
    }

    fn disconnect(&self) {
        let mut client = self.client.lock();
        if let Some(id) = client.take() {
            self.broker.state.lock().clients.remove(&id);
        }
    }

    fn is_connected(&self) -> bool {
        self.with_live_client(|_, _| ()).is_ok()
    }

    fn subscribe(&self, filter: &str, _qos: QoS) -> Result<()> {
        if !is_valid_filter(filter) {
            return Err(SyncError::InvalidTopic(filter.to_string()));
        }
        self.with_live_client(|state, id| {
            let retained: Vec<Message> = state
                .retained
                .iter()
                .filter(|(topic, _)| topic_matches(filter, topic))
                .map(|(topic, payload)| Message::new(topic.clone(), payload.clone(), true))
                .collect();

            if let Some(link) = state.clients.get_mut(&id) {
                link.filters.insert(filter.to_string());
                for message in retained {
                    link.send(BrokerEvent::Message(message));
                }
            }
        })
    }

    fn unsubscribe(&self, filter: &str) -> Result<()> {
        self.with_live_client(|state, id| {
            if let Some(link) = state.clients.get_mut(&id) {
                link.filters.remove(filter);
            }
        })
    }

    fn publish(&self, topic: &str, payload: &[u8], _qos: QoS, retain: bool) -> Result<()> {
        if topic.is_empty() || is_wildcard(topic) {
            return Err(SyncError::InvalidTopic(topic.to_string()));
        }
        self.with_live_client(|state, _| state.route(topic, payload, retain))
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BrokerConfig, ProtocolVersion};
    use crossbeam_channel::unbounded;
    use std::time::Duration;

    fn local() -> ConnectOptions {
        ConnectOptions::new(&BrokerConfig::default(), "localhost", 1883)
    }

    fn next_message(rx: &crossbeam_channel::Receiver<BrokerEvent>) -> Message {
        loop {
            match rx.recv_timeout(Duration::from_millis(100)).unwrap() {
                BrokerEvent::Message(m) => return m,
                _ => continue,
            }
        }
    }

    #[test]
    fn test_connect_reports_connected() {
        let broker = MemoryBroker::new();
        let transport = broker.transport();
        let (tx, rx) = unbounded();

        transport.connect(&local(), tx).unwrap();
        assert_eq!(rx.recv().unwrap(), BrokerEvent::Connected);
        assert!(transport.is_connected());
    }

    #[test]
    fn test_session_options_recorded() {
        let broker = MemoryBroker::new();
        let transport = broker.transport();
        let (tx, _rx) = unbounded();
        let mut config = BrokerConfig::default().with_client_name("robot-7");
        config.protocol = ProtocolVersion::V311;
        config.keepalive = Duration::from_secs(15);

        transport.connect(&ConnectOptions::new(&config, "robot.local", 1884), tx).unwrap();

        let sessions = broker.sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].client_name, "robot-7");
        assert_eq!(sessions[0].protocol, ProtocolVersion::V311);
        assert_eq!(sessions[0].keepalive, Duration::from_secs(15));
        assert_eq!(sessions[0].host, "robot.local");
    }

    #[test]
    fn test_refused_connection() {
        let broker = MemoryBroker::new();
        broker.set_accepting(false);
        let transport = broker.transport();
        let (tx, _rx) = unbounded();

        let result = transport.connect(&local(), tx);
        assert!(matches!(result, Err(SyncError::ConnectFailed { .. })));
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_retained_replayed_on_subscribe() {
        let broker = MemoryBroker::new();
        broker.publish("astoria/astmetad", b"{\"status\":\"RUNNING\"}", true);

        let transport = broker.transport();
        let (tx, rx) = unbounded();
        transport.connect(&local(), tx).unwrap();
        transport.subscribe("astoria/+", QoS::AtLeastOnce).unwrap();

        let message = next_message(&rx);
        assert_eq!(message.topic, "astoria/astmetad");
        assert!(message.retain);
    }

    #[test]
    fn test_publish_routes_to_matching_filters_only() {
        let broker = MemoryBroker::new();
        let transport = broker.transport();
        let (tx, rx) = unbounded();
        transport.connect(&local(), tx).unwrap();
        transport.subscribe("a/b", QoS::AtLeastOnce).unwrap();

        broker.publish("a/c", b"ignored", false);
        broker.publish("a/b", b"wanted", false);

        let message = next_message(&rx);
        assert_eq!(message.payload, b"wanted");
    }

    #[test]
    fn test_drop_forgets_server_side_filters() {
        let broker = MemoryBroker::new();
        let transport = broker.transport();
        let (tx, _rx) = unbounded();
        transport.connect(&local(), tx).unwrap();
        transport.subscribe("a/b", QoS::AtLeastOnce).unwrap();
        assert_eq!(broker.active_filters().len(), 1);

        broker.drop_connections();
        assert!(!transport.is_connected());
        assert!(broker.active_filters().is_empty());

        broker.restore_connections();
        assert!(transport.is_connected());
        assert!(broker.active_filters().is_empty());
    }

    #[test]
    fn test_publish_while_disconnected_is_rejected() {
        let broker = MemoryBroker::new();
        let transport = broker.transport();

        let result = transport.publish("a/b", b"x", QoS::AtLeastOnce, false);
        assert!(matches!(result, Err(SyncError::NotConnected)));
        assert!(broker.published().is_empty());
    }
}

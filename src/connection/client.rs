//! Connection wrapper and its I/O thread.

use crate::config::BrokerConfig;
use crate::error::{Result, SyncError};
use crate::transport::{BrokerEvent, ConnectOptions, Transport};
use crate::types::{is_valid_filter, is_wildcard, join_topic, topic_matches, Message, QoS};
use crossbeam_channel::{unbounded, Receiver};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Handler invoked on the I/O thread for each message on its topic.
pub type MessageCallback = Arc<dyn Fn(&Message) + Send + Sync>;

#[derive(Default)]
struct LinkState {
    /// Subscriptions have been reissued for the current session.
    ready: bool,
    /// Number of sessions the broker has accepted so far.
    sessions: u64,
}

/// State shared between the connection handle and its I/O thread.
struct Shared {
    transport: Box<dyn Transport>,
    qos: QoS,
    /// Tracked subscriptions: exact topic or filter -> handler.
    subscriptions: Mutex<HashMap<String, MessageCallback>>,
    link: Mutex<LinkState>,
    link_changed: Condvar,
}

impl Shared {
    fn issue_subscribe(&self, filter: &str) {
        debug!("Subscribing to {}", filter);
        if let Err(e) = self.transport.subscribe(filter, self.qos) {
            warn!("Subscribe to {} failed, will retry on reconnect: {}", filter, e);
        }
    }

    /// Reissue every tracked subscription. Holds the table lock for the
    /// whole pass so concurrent subscribe/unsubscribe calls cannot interleave.
    fn resubscribe_all(&self) {
        let subs = self.subscriptions.lock();
        for filter in subs.keys() {
            self.issue_subscribe(filter);
        }
        debug!("Reissued {} subscriptions", subs.len());
    }

    fn handler_for(&self, topic: &str) -> Option<MessageCallback> {
        let subs = self.subscriptions.lock();
        if let Some(callback) = subs.get(topic) {
            return Some(Arc::clone(callback));
        }
        subs.iter()
            .find(|(filter, _)| is_wildcard(filter) && topic_matches(filter, topic))
            .map(|(_, callback)| Arc::clone(callback))
    }

    fn dispatch(&self, message: &Message) {
        match self.handler_for(&message.topic) {
            Some(callback) => callback(message),
            None => debug!("Dropping message on {} with no handler", message.topic),
        }
    }

    fn set_ready(&self, ready: bool) {
        let mut link = self.link.lock();
        link.ready = ready;
        if ready {
            link.sessions += 1;
        }
        self.link_changed.notify_all();
    }

    /// Block until `pred` holds or the timeout elapses.
    fn wait_link(&self, timeout: Duration, pred: impl Fn(&LinkState) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut link = self.link.lock();
        while !pred(&link) {
            if self.link_changed.wait_until(&mut link, deadline).timed_out() {
                return pred(&link);
            }
        }
        true
    }
}

/// Drain transport events until the transport releases its sender.
fn io_loop(shared: Arc<Shared>, events: Receiver<BrokerEvent>) {
    for event in events.iter() {
        match event {
            BrokerEvent::Connected => {
                shared.resubscribe_all();
                shared.set_ready(true);
            }
            BrokerEvent::Disconnected => {
                warn!("Lost connection to broker");
                shared.set_ready(false);
            }
            BrokerEvent::Message(message) => shared.dispatch(&message),
        }
    }
    shared.set_ready(false);
    debug!("Broker I/O thread exiting");
}

/// One long-lived broker connection.
///
/// Created once per process and shared (by reference or `Arc`) with every
/// consumer that needs the broker.
pub struct Connection {
    config: BrokerConfig,
    shared: Arc<Shared>,
    io_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Create a connection handle. Nothing is opened until `connect`.
    pub fn new(transport: impl Transport + 'static, config: BrokerConfig) -> Self {
        let shared = Shared {
            transport: Box::new(transport),
            qos: config.qos,
            subscriptions: Mutex::new(HashMap::new()),
            link: Mutex::new(LinkState::default()),
            link_changed: Condvar::new(),
        };
        Self {
            config,
            shared: Arc::new(shared),
            io_thread: Mutex::new(None),
        }
    }

    /// Create a connection and connect to the configured broker.
    pub fn establish(transport: impl Transport + 'static, config: BrokerConfig) -> Result<Self> {
        let connection = Self::new(transport, config);
        let (host, port) = (connection.config.host.clone(), connection.config.port);
        connection.connect(&host, port)?;
        Ok(connection)
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Connect and start the I/O thread.
    ///
    /// A no-op (with a warning) if already connected. Returns once the
    /// broker has accepted the session and tracked subscriptions have been
    /// reissued. Failures are logged and returned; nothing is retried here.
    pub fn connect(&self, host: &str, port: u16) -> Result<()> {
        if self.shared.transport.is_connected() {
            warn!("Attempting connection, but client is already connected");
            return Ok(());
        }

        let mut io_thread = self.io_thread.lock();
        if let Some(stale) = io_thread.take() {
            // A previous session that never came back.
            self.shared.transport.disconnect();
            let _ = stale.join();
        }

        let options = ConnectOptions::new(&self.config, host, port);
        debug!(
            "Connecting to {}:{} as {} ({:?}, keepalive {:?})",
            host, port, options.client_name, options.protocol, options.keepalive
        );
        let (events_tx, events_rx) = unbounded();
        if let Err(e) = self.shared.transport.connect(&options, events_tx) {
            error!("Failed to connect to broker at {}:{}: {}", host, port, e);
            return Err(e);
        }

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("broker-io".to_string())
            .spawn(move || io_loop(shared, events_rx))?;
        *io_thread = Some(handle);
        drop(io_thread);

        let timeout = self.config.connect_timeout;
        if !self.wait_until_ready(timeout) {
            error!("Broker at {}:{} did not acknowledge within {:?}", host, port, timeout);
            self.disconnect();
            return Err(SyncError::ConnectTimeout {
                host: host.to_string(),
                port,
                timeout,
            });
        }

        info!("Connected to broker at {}:{}", host, port);
        Ok(())
    }

    /// Close the session and stop the I/O thread. Tracked subscriptions
    /// are kept and reissued by a later `connect`.
    ///
    /// Called from a message handler, the I/O thread is left to finish the
    /// current message and exit on its own.
    pub fn disconnect(&self) {
        self.shared.transport.disconnect();
        let io_thread = self.io_thread.lock().take();
        if let Some(handle) = io_thread {
            if handle.thread().id() == thread::current().id() {
                debug!("Disconnect requested from the I/O thread");
            } else if handle.join().is_err() {
                error!("Broker I/O thread panicked");
            }
        }
        self.shared.set_ready(false);
    }

    /// Whether the transport session is up.
    pub fn is_connected(&self) -> bool {
        self.shared.transport.is_connected()
    }

    /// Whether subscriptions have been reissued for the current session.
    pub fn is_ready(&self) -> bool {
        self.shared.link.lock().ready
    }

    /// Number of sessions the broker has accepted, reconnects included.
    pub fn sessions(&self) -> u64 {
        self.shared.link.lock().sessions
    }

    /// Block until the connection is ready or the timeout elapses.
    pub fn wait_until_ready(&self, timeout: Duration) -> bool {
        self.shared.wait_link(timeout, |link| link.ready)
    }

    /// Block until at least `count` sessions have been accepted and the
    /// latest one is ready.
    pub fn wait_for_sessions(&self, count: u64, timeout: Duration) -> bool {
        self.shared
            .wait_link(timeout, |link| link.ready && link.sessions >= count)
    }

    /// Topic as it appears on the wire.
    pub fn full_topic(&self, topic: &str, override_prefix: bool) -> String {
        if override_prefix {
            topic.to_string()
        } else {
            join_topic(self.config.topic_prefix.as_deref(), topic)
        }
    }

    /// Register a handler and subscribe to its topic.
    ///
    /// The configured prefix is applied unless `override_prefix` is set.
    /// Only one handler is kept per exact topic string: registering again
    /// replaces the previous handler. Returns the full topic, which is the
    /// key to pass to `unsubscribe`.
    pub fn subscribe<F>(&self, topic: &str, callback: F, override_prefix: bool) -> Result<String>
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let (full_topic, previous) =
            self.replace_handler(topic, Arc::new(callback), override_prefix)?;
        if previous.is_some() {
            debug!("Replaced handler for {}", full_topic);
        }
        Ok(full_topic)
    }

    /// Install `callback` on a topic and hand back the handler it displaced.
    ///
    /// The subscribe is reissued either way, so the broker replays any
    /// retained message. Pair with `restore_handler`.
    pub fn replace_handler(
        &self,
        topic: &str,
        callback: MessageCallback,
        override_prefix: bool,
    ) -> Result<(String, Option<MessageCallback>)> {
        let full_topic = self.full_topic(topic, override_prefix);
        if !is_valid_filter(&full_topic) {
            return Err(SyncError::InvalidTopic(full_topic));
        }

        let mut subs = self.shared.subscriptions.lock();
        let previous = subs.insert(full_topic.clone(), callback);
        if self.shared.transport.is_connected() {
            self.shared.issue_subscribe(&full_topic);
        }
        Ok((full_topic, previous))
    }

    /// Undo `replace_handler`: put `previous` back, or unsubscribe when the
    /// topic had no handler before.
    pub fn restore_handler(&self, full_topic: &str, previous: Option<MessageCallback>) {
        match previous {
            Some(callback) => {
                self.shared
                    .subscriptions
                    .lock()
                    .insert(full_topic.to_string(), callback);
            }
            None => self.unsubscribe(full_topic),
        }
    }

    /// Stop tracking a full topic and unsubscribe from it.
    ///
    /// Unknown topics are ignored.
    pub fn unsubscribe(&self, full_topic: &str) {
        let mut subs = self.shared.subscriptions.lock();
        if subs.remove(full_topic).is_none() {
            return;
        }
        if self.shared.transport.is_connected() {
            if let Err(e) = self.shared.transport.unsubscribe(full_topic) {
                debug!("Unsubscribe from {} failed: {}", full_topic, e);
            }
        }
    }

    /// Currently tracked full topics.
    pub fn subscriptions(&self) -> BTreeSet<String> {
        self.shared.subscriptions.lock().keys().cloned().collect()
    }

    /// Publish under the configured prefix.
    ///
    /// Fire-and-forget: while disconnected the message is logged and
    /// dropped, never queued.
    pub fn publish(&self, topic: &str, payload: impl AsRef<[u8]>, retain: bool) {
        let full_topic = self.full_topic(topic, false);
        self.publish_raw(&full_topic, payload, retain);
    }

    /// Publish to a topic exactly as given.
    pub fn publish_raw(&self, topic: &str, payload: impl AsRef<[u8]>, retain: bool) {
        if !self.shared.transport.is_connected() {
            error!("Attempted to publish message, but client is not connected");
            return;
        }
        if let Err(e) = self
            .shared
            .transport
            .publish(topic, payload.as_ref(), self.shared.qos, retain)
        {
            error!("Cannot publish to {}: {}", topic, e);
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

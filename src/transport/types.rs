//! Transport trait and the events it reports.

use crate::config::{BrokerConfig, ProtocolVersion};
use crate::error::Result;
use crate::types::{Message, QoS};
use crossbeam_channel::Sender;
use std::time::Duration;

/// Events reported by a transport to its owning connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BrokerEvent {
    /// The broker accepted (or re-accepted) the session.
    Connected,
    /// The session dropped. The transport may report `Connected` again later.
    Disconnected,
    /// An inbound message on a subscribed filter.
    Message(Message),
}

/// Session parameters handed to [`Transport::connect`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub client_name: String,
    pub protocol: ProtocolVersion,
    pub keepalive: Duration,
}

impl ConnectOptions {
    /// Options for `host:port` taking everything else from `config`.
    pub fn new(config: &BrokerConfig, host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            client_name: config.client_name.clone(),
            protocol: config.protocol,
            keepalive: config.keepalive,
        }
    }
}

/// A connected publish/subscribe client.
///
/// Implementations must be safe to call from any thread. Events for one
/// topic must be sent in the order the broker delivered them.
pub trait Transport: Send + Sync {
    /// Open a session. Every later event is sent on `events` until
    /// `disconnect` is called, at which point the sender is dropped.
    fn connect(&self, options: &ConnectOptions, events: Sender<BrokerEvent>) -> Result<()>;

    /// Close the session and release the event sender.
    fn disconnect(&self);

    /// Whether the session is currently up.
    fn is_connected(&self) -> bool;

    fn subscribe(&self, filter: &str, qos: QoS) -> Result<()>;

    fn unsubscribe(&self, filter: &str) -> Result<()>;

    fn publish(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool) -> Result<()>;
}

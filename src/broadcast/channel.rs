//! Broadcast multiplexer over a shared connection.

use crate::connection::Connection;
use crate::error::Result;
use crate::types::Message;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::queue::EventQueue;
use super::types::{broadcast_topic, BroadcastEvent, BroadcastWait, Envelope, Received};

/// Decode and validate one inbound broadcast.
fn decode_broadcast<E: BroadcastEvent>(message: &Message) -> Option<Envelope<E>> {
    let value: Value = match serde_json::from_slice(&message.payload) {
        Ok(value) => value,
        Err(e) => {
            error!("Could not decode JSON broadcast on {}: {}", message.topic, e);
            return None;
        }
    };
    let envelope: Envelope<E> = match serde_json::from_value(value) {
        Ok(envelope) => envelope,
        Err(e) => {
            error!("Invalid {} broadcast: {}", E::NAME, e);
            return None;
        }
    };
    if envelope.event_name != E::NAME {
        error!(
            "Broadcast on {} has event_name {:?}, expected {:?}",
            message.topic,
            envelope.event_name,
            E::NAME
        );
        return None;
    }
    Some(envelope)
}

/// Long-lived listener and sender for one broadcast event type.
pub struct BroadcastChannel<'c, E: BroadcastEvent> {
    connection: &'c Connection,
    sender_name: String,
    /// Full topic while subscribed.
    subscription: Option<String>,
    queue: Arc<EventQueue<Received<E>>>,
}

impl<'c, E: BroadcastEvent> BroadcastChannel<'c, E> {
    /// Subscribe to `broadcast/<E::NAME>`. Events sent through this channel
    /// are stamped with `sender_name`.
    pub fn open(connection: &'c Connection, sender_name: impl Into<String>) -> Result<Self> {
        let queue = Arc::new(EventQueue::new());
        let inbox = Arc::clone(&queue);

        let subscription = connection.subscribe(
            &broadcast_topic::<E>(),
            move |message: &Message| {
                if let Some(envelope) = decode_broadcast::<E>(message) {
                    debug!("Queued {} broadcast from {}", E::NAME, envelope.sender_name);
                    inbox.push(
                        envelope.priority,
                        Received {
                            event: envelope.event,
                            sender_name: envelope.sender_name,
                            priority: envelope.priority,
                            received: message.received,
                        },
                    );
                }
            },
            false,
        )?;

        Ok(Self {
            connection,
            sender_name: sender_name.into(),
            subscription: Some(subscription),
            queue,
        })
    }

    /// Block until an event is queued or `timeout` elapses.
    pub fn wait_broadcast(&self, timeout: Duration) -> BroadcastWait<E> {
        match self.queue.pop_timeout(timeout) {
            Some(received) => BroadcastWait::Event(received),
            None => BroadcastWait::Empty,
        }
    }

    /// Take the next queued event without blocking.
    pub fn try_next(&self) -> Option<Received<E>> {
        self.queue.try_pop()
    }

    /// Number of events waiting.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Broadcast an event at the default priority.
    pub fn send(&self, event: E) {
        self.send_with_priority(event, 0);
    }

    /// Broadcast an event. Fire-and-forget, like every publish.
    pub fn send_with_priority(&self, event: E, priority: i32) {
        let envelope = Envelope {
            event_name: E::NAME.to_string(),
            sender_name: self.sender_name.clone(),
            priority,
            event,
        };
        match serde_json::to_vec(&envelope) {
            Ok(payload) => self
                .connection
                .publish(&broadcast_topic::<E>(), payload, false),
            Err(e) => error!("Cannot encode {} broadcast: {}", E::NAME, e),
        }
    }

    pub fn is_open(&self) -> bool {
        self.subscription.is_some()
    }

    /// Unsubscribe and discard queued events. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(topic) = self.subscription.take() {
            self.connection.unsubscribe(&topic);
            self.queue.clear();
            debug!("Closed {} broadcast channel", E::NAME);
        }
    }

    /// Identity stamped on events sent through this channel.
    pub fn sender_name(&self) -> &str {
        &self.sender_name
    }
}

impl<E: BroadcastEvent> Drop for BroadcastChannel<'_, E> {
    fn drop(&mut self) {
        if self.is_open() {
            warn!("{} broadcast channel dropped without close", E::NAME);
            self.close();
        }
    }
}

//! Broadcast events shared by many listeners.
//!
//! Broadcast events live under `broadcast/<event_name>`. A
//! [`BroadcastChannel`] subscribes on open, validates every event against
//! its type, and queues it by priority (lower first, then arrival order).
//! Unlike snapshots, an empty wait is reported to the caller as
//! [`BroadcastWait::Empty`], because whether an event happened is the
//! answer the caller is after.
//!
//! The channel shares its [`Connection`](crate::Connection) with other
//! consumers, so its subscription is released by an explicit `close`.
//!
//! # Example
//!
//! ```ignore
//! let mut channel = BroadcastChannel::<StartButtonEvent>::open(&connection, "robot")?;
//! match channel.wait_broadcast(Duration::from_millis(100)) {
//!     BroadcastWait::Event(received) => println!("start from {}", received.sender_name),
//!     BroadcastWait::Empty => {}
//! }
//! channel.close();
//! ```

mod channel;
mod queue;
mod types;

pub use channel::BroadcastChannel;
pub use queue::EventQueue;
pub use types::{
    broadcast_topic, BroadcastEvent, BroadcastWait, Envelope, Received, StartButtonEvent,
    BROADCAST_NAMESPACE,
};

//! Long-lived broker connection with durable subscriptions.
//!
//! A [`Connection`] owns one transport session and the table of topic
//! handlers. Every time the transport reports a (re)connection, the I/O
//! thread reissues all tracked subscriptions before the connection is
//! reported ready, so a transient drop is invisible to callers.
//!
//! Handlers run on the I/O thread, one at a time, in the order the
//! transport delivered their messages. They should hand work off through a
//! channel or a lock rather than block.
//!
//! # Example
//!
//! ```ignore
//! let connection = Connection::establish(broker.transport(), BrokerConfig::default())?;
//!
//! let topic = connection.subscribe("astmetad", |message| {
//!     println!("{:?}", message.payload_str());
//! }, false)?;
//!
//! connection.publish("robot/hello", b"{}", false);
//! connection.unsubscribe(&topic);
//! ```

mod client;

pub use client::{Connection, MessageCallback};

//! Activity Bus - in-process named broadcast channels
//!
//! This crate provides named pub/sub channels with concurrent fan-out.
//! It has no knowledge of sessions, users or forums; filtering and lifecycle
//! policy belong to the subscribers.
//!
//! # Example
//!
//! ```no_run
//! use activity_bus::{ChannelRegistry, Delivery, Message, Subscriber};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl Subscriber for Printer {
//!     fn receive(&self, delivery: &Delivery) {
//!         println!("{}: {:?}", delivery.channel().name(), delivery.message());
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = ChannelRegistry::new(tokio::runtime::Handle::current());
//!     let channel = registry.ensure("user-typing");
//!
//!     let token = channel.subscribe(Arc::new(Printer));
//!     channel
//!         .publish(Message::new("session-1").with("thread-id", 42_i64))
//!         .settled()
//!         .await;
//!     channel.unsubscribe(token);
//! }
//! ```

mod channel;
mod error;
mod message;
mod registry;

pub use channel::{
    BroadcastChannel, Delivery, Dispatch, Subscriber, SubscriptionToken, panic_message,
};
pub use error::MessageError;
pub use message::{FieldValue, Message, SENDER_ID};
pub use registry::ChannelRegistry;

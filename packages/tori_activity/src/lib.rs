//! Tori Activity - presence notifications for forum sessions
//!
//! Sessions tell each other "I am typing in thread T" and "I just posted P in
//! thread T" over two in-process channels (`user-typing`, `user-authored`).
//! A session never hears its own events, and listeners whose session has
//! expired are retired the next time something is published to them.
//!
//! # Example
//!
//! ```no_run
//! use activity_bus::ChannelRegistry;
//! use std::sync::Arc;
//! use tori_activity::{ActivityHub, MemorySessions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let sessions = Arc::new(MemorySessions::new());
//!     let registry = Arc::new(ChannelRegistry::new(tokio::runtime::Handle::current()));
//!     let hub = Arc::new(ActivityHub::new(registry, sessions.clone(), sessions.clone()));
//!
//!     let alice = hub.session(sessions.open(Some(1)));
//!     let bob = hub.session(sessions.open(Some(2)));
//!
//!     bob.add_user_typing_listener(Arc::new(
//!         |user_id: i64, thread_id: i64, _started: chrono::DateTime<chrono::Utc>| -> anyhow::Result<()> {
//!             println!("user {} is typing in thread {}", user_id, thread_id);
//!             Ok(())
//!         },
//!     ));
//!
//!     alice.send_user_typing(42, chrono::Utc::now())?.settled().await;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod listener;
pub mod messaging;
pub mod metrics;
pub mod session;

#[cfg(test)]
mod test_helpers;

pub use error::{ActivityError, SessionError};
pub use events::{ChannelKind, ChannelNames, UserAuthored, UserTyping};
pub use listener::{ListenerKey, UserAuthoredListener, UserTypingListener};
pub use messaging::{ActivityHub, ActivityMessaging};
pub use metrics::{ActivityMetrics, MetricsSnapshot};
pub use session::{IdentityProvider, MemorySessions, SessionBinding, SessionOracle, SessionRef};

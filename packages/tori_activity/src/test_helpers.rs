use activity_bus::ChannelRegistry;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::events::ChannelNames;
use crate::listener::{UserAuthoredListener, UserTypingListener};
use crate::messaging::{ActivityHub, ActivityMessaging};
use crate::session::MemorySessions;

/// A hub over in-memory sessions. Must be built inside a tokio runtime.
pub struct TestWorld {
    pub sessions: Arc<MemorySessions>,
    pub registry: Arc<ChannelRegistry>,
    pub hub: Arc<ActivityHub>,
}

impl TestWorld {
    pub fn new() -> Self {
        Self::with_names(ChannelNames::default())
    }

    pub fn with_names(names: ChannelNames) -> Self {
        let sessions = Arc::new(MemorySessions::new());
        let registry = Arc::new(ChannelRegistry::new(tokio::runtime::Handle::current()));
        let hub = Arc::new(
            ActivityHub::new(registry.clone(), sessions.clone(), sessions.clone())
                .with_channel_names(names),
        );
        Self {
            sessions,
            registry,
            hub,
        }
    }

    /// Open a live session and return its facade.
    pub fn facade(&self, user_id: Option<i64>) -> ActivityMessaging {
        self.hub.session(self.sessions.open(user_id))
    }

    pub fn authored_noop(&self) -> Arc<dyn UserAuthoredListener> {
        Arc::new(|_: i64, _: i64| -> anyhow::Result<()> { Ok(()) })
    }
}

/// Records every typing notification it receives.
#[derive(Clone, Default)]
pub struct TypingLog {
    events: Arc<Mutex<Vec<(i64, i64, DateTime<Utc>)>>>,
}

impl TypingLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh listener (new identity) feeding this log.
    pub fn listener(&self) -> Arc<dyn UserTypingListener> {
        let events = Arc::clone(&self.events);
        Arc::new(
            move |user_id: i64, thread_id: i64, started: DateTime<Utc>| -> anyhow::Result<()> {
                events.lock().push((user_id, thread_id, started));
                Ok(())
            },
        )
    }

    pub fn events(&self) -> Vec<(i64, i64, DateTime<Utc>)> {
        self.events.lock().clone()
    }
}

//! Session collaborators
//!
//! The hosting layer owns sessions. This module only defines the two questions
//! the activity layer asks about them (is it alive, who is it) plus an
//! in-memory implementation used by the CLI and tests.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::SessionError;

/// Opaque reference to a session owned by the hosting layer.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct SessionRef(String);

impl SessionRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Answers whether a session is still usable.
///
/// An expired session must yield `Ok(false)`. `Err` means the probe itself
/// failed; callers treat that as not alive.
pub trait SessionOracle: Send + Sync + 'static {
    fn is_alive(&self, session: &SessionRef) -> Result<bool, SessionError>;
}

/// Resolves the identity of a session.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Opaque per-session token used only to recognise self-originated
    /// messages. It may change between requests, so callers never cache it.
    fn current_sender_id(&self, session: &SessionRef) -> Result<String, SessionError>;

    /// Forum user id of the logged-in user, `None` for anonymous visitors.
    fn remote_user_id(&self, _session: &SessionRef) -> Option<i64> {
        None
    }
}

/// The session reference a facade and all of its listeners currently use.
///
/// Shared so that rebinding the facade to a fresh request is seen by every
/// listener on its next delivery.
#[derive(Clone, Debug)]
pub struct SessionBinding {
    current: Arc<RwLock<SessionRef>>,
}

impl SessionBinding {
    pub fn new(session: SessionRef) -> Self {
        Self {
            current: Arc::new(RwLock::new(session)),
        }
    }

    pub fn get(&self) -> SessionRef {
        self.current.read().clone()
    }

    pub fn set(&self, session: SessionRef) {
        *self.current.write() = session;
    }
}

#[derive(Debug, Clone)]
struct SessionRecord {
    alive: bool,
    sender_id: String,
    user_id: Option<i64>,
    probe_fails: bool,
}

/// In-process session store implementing both collaborators.
#[derive(Debug, Default)]
pub struct MemorySessions {
    sessions: DashMap<SessionRef, SessionRecord>,
}

impl MemorySessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a live session for `user_id` (`None` = anonymous).
    pub fn open(&self, user_id: Option<i64>) -> SessionRef {
        let session = SessionRef::new(Uuid::new_v4().to_string());
        let record = SessionRecord {
            alive: true,
            sender_id: Uuid::new_v4().simple().to_string(),
            user_id,
            probe_fails: false,
        };
        self.sessions.insert(session.clone(), record);
        session
    }

    /// Mark a session expired. Returns false for unknown sessions.
    pub fn invalidate(&self, session: &SessionRef) -> bool {
        self.update(session, |r| r.alive = false)
    }

    /// Issue a new sender token for a session, as some hosts do per request.
    pub fn rotate_sender_id(&self, session: &SessionRef) -> bool {
        self.update(session, |r| r.sender_id = Uuid::new_v4().simple().to_string())
    }

    pub fn set_user(&self, session: &SessionRef, user_id: Option<i64>) -> bool {
        self.update(session, |r| r.user_id = user_id)
    }

    /// Make liveness probes for `session` fail with an error.
    pub fn fail_probes(&self, session: &SessionRef, fail: bool) -> bool {
        self.update(session, |r| r.probe_fails = fail)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn update(&self, session: &SessionRef, f: impl FnOnce(&mut SessionRecord)) -> bool {
        match self.sessions.get_mut(session) {
            Some(mut record) => {
                f(record.value_mut());
                true
            }
            None => false,
        }
    }
}

impl SessionOracle for MemorySessions {
    fn is_alive(&self, session: &SessionRef) -> Result<bool, SessionError> {
        match self.sessions.get(session) {
            Some(r) if r.probe_fails => Err(SessionError::Unavailable(format!(
                "liveness probe failed for {}",
                session
            ))),
            Some(r) => Ok(r.alive),
            None => Ok(false),
        }
    }
}

impl IdentityProvider for MemorySessions {
    fn current_sender_id(&self, session: &SessionRef) -> Result<String, SessionError> {
        match self.sessions.get(session) {
            Some(r) if r.alive => Ok(r.sender_id.clone()),
            _ => Err(SessionError::Invalidated(session.to_string())),
        }
    }

    fn remote_user_id(&self, session: &SessionRef) -> Option<i64> {
        self.sessions.get(session).and_then(|r| r.user_id)
    }
}

//! Typed activity events and the channels that carry them.

use activity_bus::{Message, MessageError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const USER_TYPING_CHANNEL: &str = "user-typing";
pub const USER_AUTHORED_CHANNEL: &str = "user-authored";

pub const USER_ID: &str = "user-id";
pub const THREAD_ID: &str = "thread-id";
pub const STARTED_TYPING: &str = "started-typing";
pub const POST_ID: &str = "post-id";

/// User id stamped on events sent by anonymous visitors.
pub const ANONYMOUS_USER_ID: i64 = 0;

/// The two well-known activity channels.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    UserTyping,
    UserAuthored,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKind::UserTyping => f.write_str(USER_TYPING_CHANNEL),
            ChannelKind::UserAuthored => f.write_str(USER_AUTHORED_CHANNEL),
        }
    }
}

/// Concrete channel names, optionally prefixed by a namespace so that several
/// forums can share one registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelNames {
    pub user_typing: String,
    pub user_authored: String,
}

impl Default for ChannelNames {
    fn default() -> Self {
        Self::with_namespace(None)
    }
}

impl ChannelNames {
    pub fn with_namespace(namespace: Option<&str>) -> Self {
        let qualify = |name: &str| match namespace.map(|ns| ns.trim_end_matches('/')) {
            Some(ns) if !ns.is_empty() => format!("{}/{}", ns, name),
            _ => name.to_string(),
        };
        Self {
            user_typing: qualify(USER_TYPING_CHANNEL),
            user_authored: qualify(USER_AUTHORED_CHANNEL),
        }
    }

    pub fn name(&self, kind: ChannelKind) -> &str {
        match kind {
            ChannelKind::UserTyping => &self.user_typing,
            ChannelKind::UserAuthored => &self.user_authored,
        }
    }
}

/// "user X started typing in thread T at time t".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTyping {
    pub user_id: i64,
    pub thread_id: i64,
    pub started_typing: DateTime<Utc>,
}

impl UserTyping {
    pub fn to_message(&self, sender_id: impl Into<String>) -> Message {
        Message::new(sender_id)
            .with(USER_ID, self.user_id)
            .with(THREAD_ID, self.thread_id)
            .with(STARTED_TYPING, self.started_typing)
    }

    pub fn from_message(message: &Message) -> Result<Self, MessageError> {
        Ok(Self {
            user_id: message.get_int(USER_ID)?,
            thread_id: message.get_int(THREAD_ID)?,
            started_typing: message.get_timestamp(STARTED_TYPING)?,
        })
    }
}

/// "post P was just written in thread T".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAuthored {
    pub post_id: i64,
    pub thread_id: i64,
}

impl UserAuthored {
    pub fn to_message(&self, sender_id: impl Into<String>) -> Message {
        Message::new(sender_id)
            .with(POST_ID, self.post_id)
            .with(THREAD_ID, self.thread_id)
    }

    pub fn from_message(message: &Message) -> Result<Self, MessageError> {
        Ok(Self {
            post_id: message.get_int(POST_ID)?,
            thread_id: message.get_int(THREAD_ID)?,
        })
    }
}

//! Activity listeners and the adapter that filters deliveries for them.

use activity_bus::{BroadcastChannel, Delivery, Message, Subscriber, SubscriptionToken, panic_message};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use tracing::{debug, error, trace, warn};

use crate::events::{ChannelKind, UserAuthored, UserTyping};
use crate::metrics::ActivityMetrics;
use crate::session::{IdentityProvider, SessionBinding, SessionOracle};

/// Notified when another session starts typing.
pub trait UserTypingListener: Send + Sync + 'static {
    fn user_typing(
        &self,
        user_id: i64,
        thread_id: i64,
        started_typing: DateTime<Utc>,
    ) -> anyhow::Result<()>;
}

impl<F> UserTypingListener for F
where
    F: Fn(i64, i64, DateTime<Utc>) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn user_typing(
        &self,
        user_id: i64,
        thread_id: i64,
        started_typing: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        self(user_id, thread_id, started_typing)
    }
}

/// Notified when another session publishes a post.
pub trait UserAuthoredListener: Send + Sync + 'static {
    fn user_authored(&self, post_id: i64, thread_id: i64) -> anyhow::Result<()>;
}

impl<F> UserAuthoredListener for F
where
    F: Fn(i64, i64) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn user_authored(&self, post_id: i64, thread_id: i64) -> anyhow::Result<()> {
        self(post_id, thread_id)
    }
}

/// Identity of a caller-supplied listener: the address of its `Arc` plus the
/// channel it listens on. Two clones of one `Arc` share a key.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct ListenerKey {
    kind: ChannelKind,
    addr: usize,
}

impl ListenerKey {
    pub fn of<T: ?Sized>(kind: ChannelKind, listener: &Arc<T>) -> Self {
        Self {
            kind,
            addr: Arc::as_ptr(listener) as *const () as usize,
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }
}

pub(crate) enum TypedCallback {
    Typing(Arc<dyn UserTypingListener>),
    Authored(Arc<dyn UserAuthoredListener>),
}

impl TypedCallback {
    fn invoke(&self, message: &Message) -> anyhow::Result<()> {
        match self {
            TypedCallback::Typing(listener) => {
                let event = UserTyping::from_message(message)?;
                listener.user_typing(event.user_id, event.thread_id, event.started_typing)
            }
            TypedCallback::Authored(listener) => {
                let event = UserAuthored::from_message(message)?;
                listener.user_authored(event.post_id, event.thread_id)
            }
        }
    }
}

struct Registration {
    channel: BroadcastChannel,
    token: SubscriptionToken,
}

/// Maps listener identities to their channel subscriptions. Only used to
/// support removal.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    entries: DashMap<ListenerKey, Registration>,
}

impl ListenerRegistry {
    /// Subscribe the adapter built by `subscriber` unless `key` is already registered.
    pub(crate) fn register(
        &self,
        key: ListenerKey,
        channel: &BroadcastChannel,
        subscriber: impl FnOnce() -> Arc<dyn Subscriber>,
    ) -> bool {
        match self.entries.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let token = channel.subscribe(subscriber());
                slot.insert(Registration {
                    channel: channel.clone(),
                    token,
                });
                true
            }
        }
    }

    /// Unsubscribe and forget `key`. Unknown keys are ignored.
    pub(crate) fn remove(&self, key: &ListenerKey) -> bool {
        match self.entries.remove(key) {
            Some((_, reg)) => {
                reg.channel.unsubscribe(reg.token);
                true
            }
            None => false,
        }
    }

    /// Drop the entry for `key` if it still points at `token`.
    fn forget(&self, key: &ListenerKey, token: SubscriptionToken) {
        self.entries.remove_if(key, |_, reg| reg.token == token);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Channel subscriber wrapping one typed listener.
///
/// Each delivery first checks that the owning session is alive (retiring the
/// listener otherwise), then drops the owning session's own messages, then
/// runs the callback with any failure contained.
pub(crate) struct FilteringListener {
    pub(crate) key: ListenerKey,
    pub(crate) callback: TypedCallback,
    pub(crate) session: SessionBinding,
    pub(crate) oracle: Arc<dyn SessionOracle>,
    pub(crate) identity: Arc<dyn IdentityProvider>,
    pub(crate) metrics: Arc<ActivityMetrics>,
    pub(crate) registry: Weak<ListenerRegistry>,
}

impl Subscriber for FilteringListener {
    fn receive(&self, delivery: &Delivery) {
        let session = self.session.get();
        let channel = delivery.channel().name();

        let alive = match self.oracle.is_alive(&session) {
            Ok(alive) => alive,
            Err(e) => {
                warn!(%channel, %session, "Liveness probe failed, retiring listener: {}", e);
                self.metrics.probe_failed();
                false
            }
        };

        if !alive {
            if delivery.unsubscribe() {
                debug!(%channel, %session, "Session gone, listener retired");
                self.metrics.listener_reaped();
            }
            if let Some(registry) = self.registry.upgrade() {
                registry.forget(&self.key, delivery.token());
            }
            return;
        }

        let own_sender_id = match self.identity.current_sender_id(&session) {
            Ok(id) => id,
            Err(e) => {
                warn!(%channel, %session, "Cannot resolve own sender id, dropping message: {}", e);
                return;
            }
        };
        if delivery.message().sender_id() == own_sender_id {
            trace!(%channel, %session, "Suppressing own activity");
            self.metrics.echo_suppressed();
            return;
        }

        match catch_unwind(AssertUnwindSafe(|| self.callback.invoke(delivery.message()))) {
            Ok(Ok(())) => self.metrics.delivered(),
            Ok(Err(e)) => {
                warn!(%channel, %session, "Activity listener failed: {:#}", e);
                self.metrics.callback_failed();
            }
            Err(panic) => {
                error!(
                    %channel,
                    %session,
                    "Activity listener panicked: {}",
                    panic_message(panic.as_ref())
                );
                self.metrics.callback_failed();
            }
        }
    }
}

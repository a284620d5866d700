//! Activity Messaging
//!
//! [`ActivityHub`] holds what every session shares: the channel registry, the
//! session collaborators, metrics and channel names. Each session gets its own
//! [`ActivityMessaging`] facade from the hub; the facade sends typed events
//! and keeps track of the listeners that session registered.

use activity_bus::{BroadcastChannel, ChannelRegistry, Dispatch, Message, Subscriber};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::debug;

use crate::error::{ActivityError, SessionError};
use crate::events::{ANONYMOUS_USER_ID, ChannelKind, ChannelNames, UserAuthored, UserTyping};
use crate::listener::{
    FilteringListener, ListenerKey, ListenerRegistry, TypedCallback, UserAuthoredListener,
    UserTypingListener,
};
use crate::metrics::ActivityMetrics;
use crate::session::{IdentityProvider, SessionBinding, SessionOracle, SessionRef};

/// Shared wiring for all session facades.
pub struct ActivityHub {
    registry: Arc<ChannelRegistry>,
    oracle: Arc<dyn SessionOracle>,
    identity: Arc<dyn IdentityProvider>,
    metrics: Arc<ActivityMetrics>,
    names: ChannelNames,
}

impl ActivityHub {
    pub fn new(
        registry: Arc<ChannelRegistry>,
        oracle: Arc<dyn SessionOracle>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            registry,
            oracle,
            identity,
            metrics: Arc::new(ActivityMetrics::new()),
            names: ChannelNames::default(),
        }
    }

    pub fn with_channel_names(mut self, names: ChannelNames) -> Self {
        self.names = names;
        self
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<ActivityMetrics> {
        &self.metrics
    }

    pub fn channel_names(&self) -> &ChannelNames {
        &self.names
    }

    /// Build the facade for one session.
    pub fn session(self: &Arc<Self>, session: SessionRef) -> ActivityMessaging {
        ActivityMessaging::new(Arc::clone(self), session)
    }
}

/// Per-session activity API.
pub struct ActivityMessaging {
    hub: Arc<ActivityHub>,
    session: SessionBinding,
    /// First non-anonymous user id seen for this session, 0 until then.
    user_id: AtomicI64,
    typing: BroadcastChannel,
    authored: BroadcastChannel,
    listeners: Arc<ListenerRegistry>,
}

impl ActivityMessaging {
    pub fn new(hub: Arc<ActivityHub>, session: SessionRef) -> Self {
        let typing = hub.registry.ensure(hub.names.name(ChannelKind::UserTyping));
        let authored = hub
            .registry
            .ensure(hub.names.name(ChannelKind::UserAuthored));

        let messaging = Self {
            hub,
            session: SessionBinding::new(session),
            user_id: AtomicI64::new(ANONYMOUS_USER_ID),
            typing,
            authored,
            listeners: Arc::new(ListenerRegistry::default()),
        };
        messaging.latch_user_id();
        messaging
    }

    /// Point this facade, and every listener it registered, at a new session
    /// reference (e.g. the one carried by the current request).
    pub fn rebind(&self, session: SessionRef) {
        self.session.set(session);
        self.latch_user_id();
    }

    pub fn session(&self) -> SessionRef {
        self.session.get()
    }

    /// User id stamped on typing events; 0 for anonymous sessions.
    pub fn user_id(&self) -> i64 {
        self.latch_user_id()
    }

    /// Announce that this session's user started typing in `thread_id`.
    pub fn send_user_typing(
        &self,
        thread_id: i64,
        started_typing: DateTime<Utc>,
    ) -> Result<Dispatch, ActivityError> {
        require_id("thread id", thread_id)?;

        let sender_id = self.sender_id()?;
        let event = UserTyping {
            user_id: self.user_id(),
            thread_id,
            started_typing,
        };
        Ok(self.publish(&self.typing, event.to_message(sender_id)))
    }

    /// Announce that this session published `post_id` in `thread_id`.
    pub fn send_user_authored(&self, post_id: i64, thread_id: i64) -> Result<Dispatch, ActivityError> {
        require_id("post id", post_id)?;
        require_id("thread id", thread_id)?;

        let sender_id = self.sender_id()?;
        let event = UserAuthored { post_id, thread_id };
        Ok(self.publish(&self.authored, event.to_message(sender_id)))
    }

    /// Returns false if this exact listener was already registered.
    pub fn add_user_typing_listener(&self, listener: Arc<dyn UserTypingListener>) -> bool {
        let key = ListenerKey::of(ChannelKind::UserTyping, &listener);
        self.add_listener(key, &self.typing, TypedCallback::Typing(listener))
    }

    /// Returns false if this exact listener was already registered.
    pub fn add_user_authored_listener(&self, listener: Arc<dyn UserAuthoredListener>) -> bool {
        let key = ListenerKey::of(ChannelKind::UserAuthored, &listener);
        self.add_listener(key, &self.authored, TypedCallback::Authored(listener))
    }

    /// Returns false (and does nothing) if the listener is not registered.
    pub fn remove_user_typing_listener<L>(&self, listener: &Arc<L>) -> bool
    where
        L: UserTypingListener + ?Sized,
    {
        self.remove_listener(ListenerKey::of(ChannelKind::UserTyping, listener))
    }

    /// Returns false (and does nothing) if the listener is not registered.
    pub fn remove_user_authored_listener<L>(&self, listener: &Arc<L>) -> bool
    where
        L: UserAuthoredListener + ?Sized,
    {
        self.remove_listener(ListenerKey::of(ChannelKind::UserAuthored, listener))
    }

    /// Listeners currently registered through this facade (retired ones excluded).
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn add_listener(&self, key: ListenerKey, channel: &BroadcastChannel, callback: TypedCallback) -> bool {
        let added = self.listeners.register(key, channel, || -> Arc<dyn Subscriber> {
            Arc::new(FilteringListener {
                key,
                callback,
                session: self.session.clone(),
                oracle: Arc::clone(&self.hub.oracle),
                identity: Arc::clone(&self.hub.identity),
                metrics: Arc::clone(&self.hub.metrics),
                registry: Arc::downgrade(&self.listeners),
            })
        });
        if added {
            debug!(channel = %channel.name(), session = %self.session.get(), "Listener added");
            self.hub.metrics.listener_added();
        } else {
            debug!(channel = %channel.name(), "Listener already registered");
        }
        added
    }

    fn remove_listener(&self, key: ListenerKey) -> bool {
        let removed = self.listeners.remove(&key);
        if removed {
            debug!(channel = %key.kind(), session = %self.session.get(), "Listener removed");
            self.hub.metrics.listener_removed();
        }
        removed
    }

    fn publish(&self, channel: &BroadcastChannel, message: Message) -> Dispatch {
        self.hub.metrics.message_sent();
        channel.publish(message)
    }

    /// Resolved on every send; hosts may rotate the token between requests.
    fn sender_id(&self) -> Result<String, ActivityError> {
        let sender_id = self.hub.identity.current_sender_id(&self.session.get())?;
        if sender_id.is_empty() {
            return Err(SessionError::Unavailable("empty sender id".to_string()).into());
        }
        Ok(sender_id)
    }

    fn latch_user_id(&self) -> i64 {
        let current = self.user_id.load(Ordering::SeqCst);
        if current != ANONYMOUS_USER_ID {
            return current;
        }
        match self.hub.identity.remote_user_id(&self.session.get()) {
            Some(id) if id != ANONYMOUS_USER_ID => {
                match self.user_id.compare_exchange(
                    ANONYMOUS_USER_ID,
                    id,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                ) {
                    Ok(_) => id,
                    Err(existing) => existing,
                }
            }
            _ => ANONYMOUS_USER_ID,
        }
    }
}

fn require_id(what: &str, id: i64) -> Result<(), ActivityError> {
    if id <= 0 {
        return Err(ActivityError::InvalidArgument(format!(
            "{} must be positive, got {}",
            what, id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{TestWorld, TypingLog};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()
    }

    #[tokio::test]
    async fn construction_provisions_both_channels_once() {
        let world = TestWorld::new();
        let _a = world.facade(Some(1));
        let _b = world.facade(Some(2));

        assert_eq!(world.registry.names(), vec!["user-authored", "user-typing"]);
        assert_eq!(world.registry.provisioned(), 2);
    }

    #[tokio::test]
    async fn namespaced_hub_uses_prefixed_channels() {
        let world = TestWorld::with_names(ChannelNames::with_namespace(Some("tori/activity")));
        let _a = world.facade(None);
        assert_eq!(
            world.registry.names(),
            vec!["tori/activity/user-authored", "tori/activity/user-typing"]
        );
    }

    #[tokio::test]
    async fn typing_reaches_other_session_with_sender_user_id() {
        let world = TestWorld::new();
        let a = world.facade(Some(11));
        let b = world.facade(Some(22));
        let log = TypingLog::new();
        b.add_user_typing_listener(log.listener());

        a.send_user_typing(42, t0()).unwrap().settled().await;

        assert_eq!(log.events(), vec![(11, 42, t0())]);
    }

    #[tokio::test]
    async fn own_typing_is_not_echoed() {
        let world = TestWorld::new();
        let a = world.facade(Some(11));
        let log = TypingLog::new();
        a.add_user_typing_listener(log.listener());

        let dispatch = a.send_user_typing(42, t0()).unwrap();
        assert_eq!(dispatch.len(), 1);
        dispatch.settled().await;

        assert!(log.events().is_empty());
        assert_eq!(world.hub.metrics().snapshot().echoes_suppressed, 1);
    }

    #[tokio::test]
    async fn anonymous_sender_uses_zero_user_id() {
        let world = TestWorld::new();
        let a = world.facade(None);
        let b = world.facade(Some(2));
        let log = TypingLog::new();
        b.add_user_typing_listener(log.listener());

        a.send_user_typing(3, t0()).unwrap().settled().await;
        assert_eq!(log.events(), vec![(ANONYMOUS_USER_ID, 3, t0())]);
    }

    #[tokio::test]
    async fn user_id_latches_first_login() {
        let world = TestWorld::new();
        let session = world.sessions.open(None);
        let a = world.hub.session(session.clone());
        assert_eq!(a.user_id(), ANONYMOUS_USER_ID);

        world.sessions.set_user(&session, Some(9));
        assert_eq!(a.user_id(), 9);

        world.sessions.set_user(&session, Some(10));
        assert_eq!(a.user_id(), 9);
    }

    #[tokio::test]
    async fn invalid_arguments_fail_before_publishing() {
        let world = TestWorld::new();
        let a = world.facade(Some(1));

        assert!(matches!(
            a.send_user_typing(0, t0()),
            Err(ActivityError::InvalidArgument(_))
        ));
        assert!(matches!(
            a.send_user_authored(-1, 5),
            Err(ActivityError::InvalidArgument(_))
        ));
        assert!(matches!(
            a.send_user_authored(1, 0),
            Err(ActivityError::InvalidArgument(_))
        ));
        assert_eq!(world.hub.metrics().snapshot().messages_sent, 0);
    }

    #[tokio::test]
    async fn typing_before_the_epoch_is_delivered_as_is() {
        let world = TestWorld::new();
        let a = world.facade(Some(1));
        let b = world.facade(Some(2));
        let log = TypingLog::new();
        b.add_user_typing_listener(log.listener());
        let before_epoch = Utc.with_ymd_and_hms(1969, 12, 31, 23, 59, 59).unwrap();

        a.send_user_typing(42, before_epoch).unwrap().settled().await;

        assert_eq!(log.events(), vec![(1, 42, before_epoch)]);
    }

    #[tokio::test]
    async fn dead_sender_cannot_send() {
        let world = TestWorld::new();
        let session = world.sessions.open(Some(1));
        let a = world.hub.session(session.clone());
        world.sessions.invalidate(&session);

        assert!(matches!(
            a.send_user_authored(1, 2),
            Err(ActivityError::Identity(SessionError::Invalidated(_)))
        ));
    }

    #[tokio::test]
    async fn duplicate_add_is_ignored() {
        let world = TestWorld::new();
        let a = world.facade(Some(1));
        let b = world.facade(Some(2));
        let log = TypingLog::new();
        let listener = log.listener();

        assert!(b.add_user_typing_listener(listener.clone()));
        assert!(!b.add_user_typing_listener(listener.clone()));
        assert_eq!(b.listener_count(), 1);

        a.send_user_typing(1, t0()).unwrap().settled().await;
        assert_eq!(log.events().len(), 1);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let world = TestWorld::new();
        let a = world.facade(Some(1));
        let b = world.facade(Some(2));
        let log = TypingLog::new();
        let listener = log.listener();

        b.add_user_typing_listener(listener.clone());
        assert!(b.remove_user_typing_listener(&listener));
        assert!(!b.remove_user_typing_listener(&listener));
        assert!(!b.remove_user_authored_listener(&world.authored_noop()));
        assert_eq!(b.listener_count(), 0);

        a.send_user_typing(1, t0()).unwrap().settled().await;
        assert!(log.events().is_empty());
        assert_eq!(world.hub.metrics().snapshot().listeners_removed, 1);
    }

    #[tokio::test]
    async fn rebind_follows_rotated_identity() {
        let world = TestWorld::new();
        let first = world.sessions.open(Some(1));
        let a = world.hub.session(first.clone());
        let log = TypingLog::new();
        a.add_user_typing_listener(log.listener());

        // Same user, new request/session reference: the listener now belongs
        // to the new reference, so sends from it are still echoes.
        let second = world.sessions.open(Some(1));
        a.rebind(second.clone());
        assert_eq!(a.session(), second);

        world.sessions.invalidate(&first);
        a.send_user_typing(4, t0()).unwrap().settled().await;

        assert!(log.events().is_empty());
        assert_eq!(a.listener_count(), 1);
        assert_eq!(world.hub.metrics().snapshot().echoes_suppressed, 1);
    }
}

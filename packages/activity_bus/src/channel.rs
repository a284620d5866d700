use dashmap::DashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use crate::message::Message;

/// Handle returned by [`BroadcastChannel::subscribe`], used to unsubscribe.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct SubscriptionToken(pub u64);

impl std::fmt::Display for SubscriptionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Receives messages published on a channel.
///
/// `receive` runs on the runtime's blocking pool, concurrently with other
/// subscribers and possibly with itself for successive publishes. It may
/// block without holding up async work or other subscribers.
pub trait Subscriber: Send + Sync + 'static {
    fn receive(&self, delivery: &Delivery);
}

/// One delivery attempt: the published message plus enough context for the
/// subscriber to remove itself from the channel.
pub struct Delivery {
    message: Arc<Message>,
    channel: BroadcastChannel,
    token: SubscriptionToken,
}

impl Delivery {
    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn channel(&self) -> &BroadcastChannel {
        &self.channel
    }

    pub fn token(&self) -> SubscriptionToken {
        self.token
    }

    /// Remove the receiving subscriber from the channel.
    pub fn unsubscribe(&self) -> bool {
        self.channel.unsubscribe(self.token)
    }
}

struct ChannelInner {
    name: String,
    subscribers: DashMap<SubscriptionToken, Arc<dyn Subscriber>>,
    next_token: AtomicU64,
    runtime: Handle,
}

/// A named fan-out channel. Cloning yields another handle to the same channel.
///
/// Every subscriber registered when [`publish`](Self::publish) starts gets
/// exactly one delivery attempt, spawned as its own blocking task. Nothing is buffered:
/// a subscriber that joins later never sees earlier messages.
#[derive(Clone)]
pub struct BroadcastChannel {
    inner: Arc<ChannelInner>,
}

impl std::fmt::Debug for BroadcastChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastChannel")
            .field("name", &self.inner.name)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl BroadcastChannel {
    /// Create a channel whose deliveries are spawned on `runtime`.
    pub fn new(name: impl Into<String>, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                name: name.into(),
                subscribers: DashMap::new(),
                next_token: AtomicU64::new(1),
                runtime,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> SubscriptionToken {
        let token = SubscriptionToken(self.inner.next_token.fetch_add(1, Ordering::SeqCst));
        self.inner.subscribers.insert(token, subscriber);
        debug!(channel = %self.inner.name, %token, "Subscribed");
        token
    }

    /// Returns false if the token was not subscribed (already removed).
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let removed = self.inner.subscribers.remove(&token).is_some();
        if removed {
            debug!(channel = %self.inner.name, %token, "Unsubscribed");
        }
        removed
    }

    pub fn contains(&self, token: SubscriptionToken) -> bool {
        self.inner.subscribers.contains_key(&token)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Whether both handles refer to the same channel instance.
    pub fn same_channel(&self, other: &BroadcastChannel) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Fan `message` out to every current subscriber.
    ///
    /// Returns once every delivery has been spawned; the returned [`Dispatch`]
    /// can be awaited for completion or dropped to detach.
    pub fn publish(&self, message: Message) -> Dispatch {
        let message = Arc::new(message);

        let targets: Vec<(SubscriptionToken, Arc<dyn Subscriber>)> = self
            .inner
            .subscribers
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        trace!(channel = %self.inner.name, targets = targets.len(), "Publishing");

        let handles = targets
            .into_iter()
            .map(|(token, subscriber)| {
                let delivery = Delivery {
                    message: Arc::clone(&message),
                    channel: self.clone(),
                    token,
                };
                self.inner
                    .runtime
                    .spawn_blocking(move || deliver(subscriber, delivery))
            })
            .collect();

        Dispatch { handles }
    }
}

fn deliver(subscriber: Arc<dyn Subscriber>, delivery: Delivery) {
    // Unsubscribed between publish and this task running.
    if !delivery.channel.contains(delivery.token) {
        trace!(channel = %delivery.channel.name(), token = %delivery.token, "Skipping removed subscriber");
        return;
    }

    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| subscriber.receive(&delivery))) {
        error!(
            channel = %delivery.channel.name(),
            token = %delivery.token,
            "Subscriber panicked during delivery: {}",
            panic_message(panic.as_ref())
        );
    }
}

/// Best-effort text of a caught panic payload.
pub fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// The deliveries spawned by one [`BroadcastChannel::publish`] call.
#[derive(Debug)]
pub struct Dispatch {
    handles: Vec<JoinHandle<()>>,
}

impl Dispatch {
    /// Number of delivery attempts started.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait until every delivery attempt has finished.
    pub async fn settled(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

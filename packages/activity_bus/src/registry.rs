use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::runtime::Handle;
use tracing::info;

use crate::channel::BroadcastChannel;

/// Owns the named channels of one process (or one test).
///
/// Channels are provisioned on first use and live as long as the registry.
pub struct ChannelRegistry {
    channels: DashMap<String, BroadcastChannel>,
    provisioned: AtomicU64,
    runtime: Handle,
}

impl ChannelRegistry {
    /// Create an empty registry. Channels it provisions spawn deliveries on `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self {
            channels: DashMap::new(),
            provisioned: AtomicU64::new(0),
            runtime,
        }
    }

    /// Return the channel called `name`, creating it if this is the first request.
    ///
    /// Concurrent callers asking for the same name all get the same instance
    /// and the channel is created (and logged) exactly once.
    pub fn ensure(&self, name: &str) -> BroadcastChannel {
        if let Some(channel) = self.get(name) {
            return channel;
        }

        match self.channels.entry(name.to_string()) {
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(slot) => {
                info!("Adding a message bus destination: {}", name);
                self.provisioned.fetch_add(1, Ordering::SeqCst);
                slot.insert(BroadcastChannel::new(name, self.runtime.clone()))
                    .value()
                    .clone()
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<BroadcastChannel> {
        self.channels.get(name).map(|ch| ch.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// Channel names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.iter().map(|ch| ch.key().clone()).collect();
        names.sort();
        names
    }

    /// How many channels this registry has ever created.
    pub fn provisioned(&self) -> u64 {
        self.provisioned.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.names())
            .finish()
    }
}

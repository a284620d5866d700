//! `tori-activity simulate`: many sessions sharing one registry in one process.

use activity_bus::{ChannelRegistry, Dispatch};
use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use crate::config::SimulateConfig;
use crate::events::ChannelNames;
use crate::messaging::{ActivityHub, ActivityMessaging};
use crate::metrics::MetricsSnapshot;
use crate::session::MemorySessions;

#[derive(Debug, Clone, Serialize)]
pub struct ChannelSummary {
    pub name: String,
    pub subscribers: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub sessions: usize,
    pub dead_sessions: usize,
    pub rounds: usize,
    pub typing_received: u64,
    pub authored_received: u64,
    pub channels: Vec<ChannelSummary>,
    pub metrics: MetricsSnapshot,
}

/// Run the simulation and return what happened.
///
/// Every session listens on both channels. The first `dead_sessions` sessions
/// are then invalidated, and each round every live session announces typing;
/// on even rounds it also publishes a post.
pub async fn simulate(config: &SimulateConfig, names: ChannelNames) -> Result<SimulationReport> {
    if config.dead_sessions > config.sessions {
        bail!(
            "dead_sessions ({}) cannot exceed sessions ({})",
            config.dead_sessions,
            config.sessions
        );
    }

    let sessions = Arc::new(MemorySessions::new());
    let registry = Arc::new(ChannelRegistry::new(tokio::runtime::Handle::current()));
    let hub = Arc::new(
        ActivityHub::new(registry.clone(), sessions.clone(), sessions.clone())
            .with_channel_names(names),
    );

    let typing_received = Arc::new(AtomicU64::new(0));
    let authored_received = Arc::new(AtomicU64::new(0));

    let facades: Vec<ActivityMessaging> = (0..config.sessions)
        .map(|i| {
            let facade = hub.session(sessions.open(Some(i as i64 + 1)));
            let counter = Arc::clone(&typing_received);
            facade.add_user_typing_listener(Arc::new(
                move |user_id: i64, thread_id: i64, started: DateTime<Utc>| -> Result<()> {
                    debug!(listener = i, user_id, thread_id, %started, "User typing");
                    counter.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                },
            ));
            let counter = Arc::clone(&authored_received);
            facade.add_user_authored_listener(Arc::new(
                move |post_id: i64, thread_id: i64| -> Result<()> {
                    debug!(listener = i, post_id, thread_id, "User authored");
                    counter.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                },
            ));
            facade
        })
        .collect();

    for facade in &facades[..config.dead_sessions] {
        sessions.invalidate(&facade.session());
    }
    info!(
        "Simulating {} sessions ({} dead) over {} rounds",
        config.sessions, config.dead_sessions, config.rounds
    );

    let threads = config.threads.max(1);
    let live = &facades[config.dead_sessions..];
    let mut next_post_id = 1;
    for round in 0..config.rounds {
        let mut dispatches: Vec<Dispatch> = Vec::new();
        for (i, facade) in live.iter().enumerate() {
            let thread_id = ((round + i) % threads) as i64 + 1;
            dispatches.push(facade.send_user_typing(thread_id, Utc::now())?);
            if round % 2 == 0 {
                dispatches.push(facade.send_user_authored(next_post_id, thread_id)?);
                next_post_id += 1;
            }
        }
        for dispatch in dispatches {
            dispatch.settled().await;
        }
        if !config.round_interval.is_zero() {
            tokio::time::sleep(config.round_interval).await;
        }
    }

    let channels = registry
        .names()
        .into_iter()
        .filter_map(|name| registry.get(&name))
        .map(|ch| ChannelSummary {
            name: ch.name().to_string(),
            subscribers: ch.subscriber_count(),
        })
        .collect();

    Ok(SimulationReport {
        sessions: config.sessions,
        dead_sessions: config.dead_sessions,
        rounds: config.rounds,
        typing_received: typing_received.load(Ordering::Relaxed),
        authored_received: authored_received.load(Ordering::Relaxed),
        channels,
        metrics: hub.metrics().snapshot(),
    })
}

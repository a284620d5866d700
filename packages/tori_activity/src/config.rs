use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::events::ChannelNames;

// =============================================================================
// File config (figment-deserialized from defaults / tori-activity.toml / env)
// =============================================================================
//
//   tori-activity.toml:   [simulate]
//                         sessions = 8
//
//   env var:              TORI_SIMULATE__SESSIONS=8   (double underscore = nesting)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ActivityFileConfig {
    #[serde(default)]
    pub channels: ChannelFileConfig,
    #[serde(default)]
    pub log: LogFileConfig,
    #[serde(default)]
    pub simulate: SimulateFileConfig,
}

/// Channel naming (lives under `[channels]`).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ChannelFileConfig {
    /// Prefix for channel names, e.g. `tori/activity`. Unset means bare names.
    #[serde(default)]
    pub namespace: Option<String>,
}

/// Logging (lives under `[log]`). `RUST_LOG` still wins when set.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LogFileConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogFileConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

/// Simulation knobs (lives under `[simulate]`).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SimulateFileConfig {
    #[serde(default = "default_sessions")]
    pub sessions: usize,
    #[serde(default = "default_threads")]
    pub threads: usize,
    #[serde(default = "default_rounds")]
    pub rounds: usize,
    #[serde(default = "default_dead_sessions")]
    pub dead_sessions: usize,
    #[serde(default = "default_round_interval_ms")]
    pub round_interval_ms: u64,
}

impl Default for SimulateFileConfig {
    fn default() -> Self {
        Self {
            sessions: default_sessions(),
            threads: default_threads(),
            rounds: default_rounds(),
            dead_sessions: default_dead_sessions(),
            round_interval_ms: default_round_interval_ms(),
        }
    }
}

fn default_log_filter() -> String {
    "tori_activity=info,activity_bus=info,warn".to_string()
}
fn default_sessions() -> usize {
    4
}
fn default_threads() -> usize {
    3
}
fn default_rounds() -> usize {
    5
}
fn default_dead_sessions() -> usize {
    1
}
fn default_round_interval_ms() -> u64 {
    10
}

/// Build a figment that layers: defaults → config file (if given) → TORI_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `TORI_CHANNELS__NAMESPACE=forum`  →  `channels.namespace = "forum"`
pub fn load_config(config_file: Option<&Path>) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let mut figment = Figment::from(Serialized::defaults(ActivityFileConfig::default()));
    if let Some(path) = config_file {
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(Env::prefixed("TORI_").split("__"))
}

// =============================================================================
// Runtime views
// =============================================================================

impl ChannelNames {
    pub fn from_file(fc: &ChannelFileConfig) -> Self {
        ChannelNames::with_namespace(fc.namespace.as_deref())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SimulateConfig {
    pub sessions: usize,
    pub threads: usize,
    pub rounds: usize,
    pub dead_sessions: usize,
    pub round_interval: Duration,
}

impl SimulateConfig {
    pub fn from_file(fc: &SimulateFileConfig) -> Self {
        Self {
            sessions: fc.sessions,
            threads: fc.threads.max(1),
            rounds: fc.rounds,
            dead_sessions: fc.dead_sessions,
            round_interval: Duration::from_millis(fc.round_interval_ms),
        }
    }
}

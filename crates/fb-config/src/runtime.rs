use serde::{Deserialize, Serialize};

use crate::types::HumanDuration;

/// The `[runtime]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// How often the timeout driver fires.
    #[serde(default = "default_tick_interval")]
    pub tick_interval: HumanDuration,
    /// Reader-to-ingest channel depth.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_tick_interval() -> HumanDuration {
    "1s".parse().expect("hardcoded duration must parse")
}

fn default_channel_capacity() -> usize {
    1024
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval: default_tick_interval(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

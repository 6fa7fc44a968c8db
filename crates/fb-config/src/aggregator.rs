use serde::{Deserialize, Serialize};

use crate::types::HumanDuration;

/// The `[aggregator]` section: merge timers, direction handling and the
/// policy chain.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AggregatorConfig {
    /// Entries idle this long are flushed. `"0s"` disables.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: HumanDuration,
    /// Entries spanning this long are emitted and reset. `"0s"` disables.
    #[serde(default = "default_status_timeout")]
    pub status_timeout: HumanDuration,
    /// Probe the reversed key on a miss and fix record orientation.
    #[serde(default = "default_true")]
    pub direction_correction: bool,
    /// Process every record twice, forward and reversed.
    #[serde(default)]
    pub mon_mode: bool,
    /// Canonicalise endpoint order so the smaller address is the source.
    #[serde(default)]
    pub matrix_mode: bool,
    #[serde(default, rename = "policy")]
    pub policies: Vec<PolicyConfig>,
}

/// One `[[aggregator.policy]]` entry. Records are offered to policies in
/// order; the first whose filter accepts takes the record, and the walk
/// continues past it only when `cont` is set.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolicyConfig {
    /// Key fields: any of `saddr`, `daddr`, `proto`, `sport`, `dport`.
    /// An empty list collects records without merging.
    pub key: Vec<String>,
    #[serde(default)]
    pub filter: Option<FilterConfig>,
    #[serde(default)]
    pub cont: bool,
}

/// Structural record filter for a policy.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FilterConfig {
    /// Protocol name: `tcp`, `udp`, `icmp`, `esp`, or a raw number.
    #[serde(default)]
    pub proto: Option<String>,
    /// Matches either source or destination port.
    #[serde(default)]
    pub port: Option<u16>,
}

fn default_idle_timeout() -> HumanDuration {
    "30s".parse().expect("hardcoded duration must parse")
}

fn default_status_timeout() -> HumanDuration {
    "60s".parse().expect("hardcoded duration must parse")
}

fn default_true() -> bool {
    true
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            idle_timeout: default_idle_timeout(),
            status_timeout: default_status_timeout(),
            direction_correction: default_true(),
            mon_mode: false,
            matrix_mode: false,
            policies: Vec::new(),
        }
    }
}

use serde::{Deserialize, Serialize};

use crate::types::{BinInterval, ByteSize, HumanDuration};

/// How records are assigned to bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BinMode {
    /// Fixed time intervals aligned to a calendar anchor.
    Time,
    /// A new bin every `count` admitted records.
    Count,
    /// A new bin once the running byte total passes `size`.
    Size,
    /// One bin per distinct flow, in first-seen order.
    Flow,
    /// No binning; records feed the pipeline-level aggregator directly.
    None,
}

/// The `[bin]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BinConfig {
    #[serde(default = "default_mode")]
    pub mode: BinMode,
    /// Time-mode span, `N[yMwdhms]`.
    #[serde(default)]
    pub span: Option<BinInterval>,
    /// Count-mode rotation threshold.
    #[serde(default)]
    pub count: Option<u64>,
    /// Size-mode rotation threshold.
    #[serde(default)]
    pub size: Option<ByteSize>,
    /// Split records that span bin boundaries. When off, a record is
    /// binned whole by its start time.
    #[serde(default = "default_true")]
    pub modify: bool,
    /// Clip split records exactly to their bin boundaries.
    #[serde(default)]
    pub hard: bool,
    /// Emit empty records for bins that saw no traffic.
    #[serde(default)]
    pub zero: bool,
    /// How long a closed interval is held before eviction.
    #[serde(default = "default_hold")]
    pub hold: HumanDuration,
    /// Ceiling on simultaneously live bin indices.
    #[serde(default = "default_max_span")]
    pub max_span: usize,
}

fn default_mode() -> BinMode {
    BinMode::Time
}

fn default_true() -> bool {
    true
}

fn default_hold() -> HumanDuration {
    "15s".parse().expect("hardcoded duration must parse")
}

fn default_max_span() -> usize {
    4096
}

impl Default for BinConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            span: None,
            count: None,
            size: None,
            modify: default_true(),
            hard: false,
            zero: false,
            hold: default_hold(),
            max_span: default_max_span(),
        }
    }
}

impl BinConfig {
    /// Count-mode threshold with the classic default of 10000 records.
    pub fn count_or_default(&self) -> u64 {
        self.count.unwrap_or(10_000)
    }
}

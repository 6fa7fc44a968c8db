use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The `[input]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputConfig {
    /// JSONL file of flow records; `"-"` reads stdin.
    #[serde(default = "default_path")]
    pub path: PathBuf,
    /// Pace processing by record timestamps instead of reading flat out.
    #[serde(default)]
    pub replay: bool,
    /// Replay speed multiple; 2.0 replays twice as fast as recorded.
    #[serde(default = "default_rate")]
    pub rate: f64,
}

fn default_path() -> PathBuf {
    PathBuf::from("-")
}

fn default_rate() -> f64 {
    1.0
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            replay: false,
            rate: default_rate(),
        }
    }
}

impl InputConfig {
    pub fn is_stdin(&self) -> bool {
        self.path.as_os_str() == "-"
    }
}

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::SortField;

/// The `[output]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// JSONL destination; `"-"` writes stdout.
    #[serde(default = "default_path")]
    pub path: PathBuf,
    /// Drain order within a bin.
    #[serde(default)]
    pub sort: SortField,
}

fn default_path() -> PathBuf {
    PathBuf::from("-")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            sort: SortField::default(),
        }
    }
}

impl OutputConfig {
    pub fn is_stdout(&self) -> bool {
        self.path.as_os_str() == "-"
    }
}

use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::aggregator::AggregatorConfig;
use crate::bin::BinConfig;
use crate::input::InputConfig;
use crate::logging::LoggingConfig;
use crate::output::OutputConfig;
use crate::runtime::RuntimeConfig;
use crate::validate;

// ---------------------------------------------------------------------------
// Raw TOML structure (intermediate representation)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FlowbinConfigRaw {
    /// `[bin]` is the one required section; a split mode must be chosen.
    bin: BinConfig,
    #[serde(default)]
    input: InputConfig,
    #[serde(default)]
    output: OutputConfig,
    #[serde(default)]
    aggregator: AggregatorConfig,
    #[serde(default)]
    runtime: RuntimeConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// FlowbinConfig (resolved, validated)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FlowbinConfig {
    pub bin: BinConfig,
    pub input: InputConfig,
    pub output: OutputConfig,
    pub aggregator: AggregatorConfig,
    pub runtime: RuntimeConfig,
    pub logging: LoggingConfig,
}

impl FlowbinConfig {
    /// Read and parse a `flowbin.toml` file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.as_ref().display()))?;
        content.parse()
    }
}

impl FromStr for FlowbinConfig {
    type Err = anyhow::Error;

    /// Parse a TOML string into a resolved, validated [`FlowbinConfig`].
    fn from_str(toml_str: &str) -> anyhow::Result<Self> {
        let raw: FlowbinConfigRaw = toml::from_str(toml_str)?;

        let config = FlowbinConfig {
            bin: raw.bin,
            input: raw.input,
            output: raw.output,
            aggregator: raw.aggregator,
            runtime: raw.runtime,
            logging: raw.logging,
        };

        validate::validate(&config)?;

        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

pub mod aggregator;
pub mod bin;
pub mod flowbin;
pub mod input;
pub mod logging;
pub mod output;
pub mod runtime;
pub mod types;
pub mod validate;

pub use aggregator::{AggregatorConfig, FilterConfig, PolicyConfig};
pub use bin::{BinConfig, BinMode};
pub use flowbin::FlowbinConfig;
pub use input::InputConfig;
pub use logging::{LogFormat, LoggingConfig};
pub use output::OutputConfig;
pub use runtime::RuntimeConfig;
pub use types::{BinInterval, BinUnit, ByteSize, HumanDuration, SortField};

//! Flow-key aggregation: masks, merge arithmetic and the policy chain.

pub mod aggregator;
pub mod chain;
pub mod filter;
pub mod key;
pub mod merge;

pub use aggregator::{FlowAggregator, InsertOutcome, SweepReport};
pub use chain::{AggregatorChain, ChainSpec, Disposition, OfferOutcome};
pub use filter::RecordFilter;
pub use key::{FlowKey, KeyMask};
pub use merge::merge_into;

//! Core flow binning and aggregation engine.
//!
//! Records move through three stages: the [`bin::Aligner`] maps each
//! record interval onto bin indices, splitting across boundaries in time
//! mode; the [`bin::BinTable`] keeps a sliding window of live bins, each
//! holding an [`aggregate::AggregatorChain`]; and eviction drains merged
//! records to a [`sink::RecordSink`]. [`pipeline::Pipeline`] wires the
//! stages together and owns the timers' effects.

pub mod aggregate;
pub mod bin;
pub mod error;
pub mod pipeline;
pub mod record;
pub mod sink;

pub use error::{CoreError, CoreReason, CoreResult};
pub use pipeline::{Pipeline, PipelineStats, TickReport};
pub use record::{Counters, Direction, FlowRecord, FlowTuple, IcmpKind, Proto, TcpSignals};
pub use sink::{FileRecordSink, RecordSink, StdoutRecordSink, build_sink};

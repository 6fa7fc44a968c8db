//! Interval alignment and the sliding bin window.

pub mod align;
pub mod spec;
pub mod table;

pub use align::{AlignIter, Aligner};
pub use spec::{BinSpec, SplitMode};
pub use table::{Bin, BinSlot, BinTable, Evicted};

use std::collections::HashMap;

use orion_error::prelude::*;

use crate::bin::spec::{BinSpec, SplitMode};
use crate::error::{CoreReason, CoreResult};
use crate::record::{FlowRecord, FlowTuple};

// ---------------------------------------------------------------------------
// Aligner
// ---------------------------------------------------------------------------

/// Maps records to bin indices, lazily splitting boundary-crossing records
/// in time mode. The sequential modes keep their rotation state here.
pub struct Aligner {
    spec: BinSpec,
    /// Records admitted so far (count mode).
    seq: u64,
    /// Bytes accumulated toward the current index (size mode).
    acc_bytes: u64,
    /// Current index for the count/size rotation.
    seq_index: i64,
    /// First-seen order of canonical flow tuples (flow mode).
    flow_index: HashMap<FlowTuple, i64>,
    next_flow_index: i64,
}

impl Aligner {
    pub fn new(spec: BinSpec) -> Self {
        Self {
            spec,
            seq: 0,
            acc_bytes: 0,
            seq_index: 0,
            flow_index: HashMap::new(),
            next_flow_index: 0,
        }
    }

    /// Assign `record` to one or more bins.
    ///
    /// Returns an iterator of `(bin_index, sub_record)` pairs. Time mode
    /// with `modify` splits the record at bin boundaries; each piece covers
    /// its overlap with the bin and carries the record's counters
    /// unprorated. With `hard`, piece timestamps snap to the full bin
    /// boundaries instead. All other modes yield the record whole.
    ///
    /// Fails with `InvalidInterval` when the record ends before it starts.
    pub fn align(&mut self, record: FlowRecord) -> CoreResult<AlignIter> {
        if record.end_micros < record.start_micros {
            return StructError::from(CoreReason::InvalidInterval)
                .with_detail(format!(
                    "end {} before start {}",
                    record.end_micros, record.start_micros,
                ))
                .err();
        }

        let state = match self.spec.mode {
            SplitMode::Time { .. } => {
                if self.spec.modify {
                    let first = self.spec.bin_index(record.start_micros);
                    let last = if record.end_micros > record.start_micros {
                        self.spec.bin_index(record.end_micros - 1)
                    } else {
                        first
                    };
                    AlignState::Split {
                        spec: self.spec,
                        template: record,
                        next_index: first,
                        last_index: last,
                    }
                } else {
                    let idx = self.spec.bin_index(record.start_micros);
                    let mut record = record;
                    if self.spec.hard {
                        // the whole record reports its start bin's interval
                        let (bstart, bend) = self.spec.bin_bounds(idx);
                        record.start_micros = bstart;
                        record.end_micros = bend;
                    }
                    AlignState::One(Some((idx, record)))
                }
            }
            SplitMode::Count { value } => {
                let idx = (self.seq / value) as i64;
                self.seq += 1;
                AlignState::One(Some((idx, record)))
            }
            SplitMode::Size { bytes } => {
                let rec_bytes = record.counters.total_bytes();
                if self.acc_bytes > 0 && self.acc_bytes.saturating_add(rec_bytes) > bytes {
                    self.seq_index += 1;
                    self.acc_bytes = 0;
                }
                self.acc_bytes = self.acc_bytes.saturating_add(rec_bytes);
                AlignState::One(Some((self.seq_index, record)))
            }
            SplitMode::Flow => {
                let key = record.flow.canonical();
                let idx = match self.flow_index.get(&key) {
                    Some(i) => *i,
                    None => {
                        let i = self.next_flow_index;
                        self.next_flow_index += 1;
                        self.flow_index.insert(key, i);
                        i
                    }
                };
                AlignState::One(Some((idx, record)))
            }
            SplitMode::None => AlignState::One(Some((0, record))),
        };

        Ok(AlignIter { state })
    }
}

// ---------------------------------------------------------------------------
// AlignIter
// ---------------------------------------------------------------------------

/// Lazy output of [`Aligner::align`]; splitting work happens per `next()`.
pub struct AlignIter {
    state: AlignState,
}

enum AlignState {
    One(Option<(i64, FlowRecord)>),
    Split {
        spec: BinSpec,
        template: FlowRecord,
        next_index: i64,
        last_index: i64,
    },
}

impl Iterator for AlignIter {
    type Item = (i64, FlowRecord);

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.state {
            AlignState::One(slot) => slot.take(),
            AlignState::Split {
                spec,
                template,
                next_index,
                last_index,
            } => {
                if *next_index > *last_index {
                    return None;
                }
                let idx = *next_index;
                *next_index += 1;

                let (bstart, bend) = spec.bin_bounds(idx);
                let mut piece = template.clone();
                if spec.hard {
                    piece.start_micros = bstart;
                    piece.end_micros = bend;
                } else {
                    piece.start_micros = template.start_micros.max(bstart);
                    piece.end_micros = template.end_micros.min(bend);
                }
                Some((idx, piece))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

use std::collections::VecDeque;

use orion_error::prelude::*;

use crate::aggregate::{AggregatorChain, ChainSpec};
use crate::bin::spec::BinSpec;
use crate::error::{CoreReason, CoreResult};

// ---------------------------------------------------------------------------
// Bin
// ---------------------------------------------------------------------------

/// One live bin: its index, interval extents and aggregation chain.
///
/// Time-mode bins carry their fixed boundary interval; sequential bins
/// carry the hull of what landed in them.
pub struct Bin {
    pub index: i64,
    pub stime: i64,
    pub etime: i64,
    pub chain: AggregatorChain,
}

/// Where a record's bin index landed relative to the sliding window.
pub enum BinSlot<'a> {
    Bin(&'a mut Bin),
    /// Below the window base. The caller still holds the record and
    /// emits it unbinned.
    Stale,
}

/// What an eviction pass produced, in chronological order.
pub enum Evicted {
    Bin(Bin),
    /// An empty slot the window slid past. Only time mode reports
    /// these; sequential indices are dense.
    Gap { index: i64, stime: i64, etime: i64 },
}

// ---------------------------------------------------------------------------
// BinTable
// ---------------------------------------------------------------------------

/// Sliding window of bins, indexed relative to `window_base`.
///
/// The base anchors on the first insert and only ever moves forward, so
/// an index below it is refused rather than resurrected. Growth toward
/// newer indices is capped by `max_span`.
pub struct BinTable {
    spec: BinSpec,
    chain_spec: ChainSpec,
    slots: VecDeque<Option<Bin>>,
    window_base: i64,
    anchored: bool,
}

impl BinTable {
    pub fn new(spec: BinSpec, chain_spec: ChainSpec) -> Self {
        Self {
            spec,
            chain_spec,
            slots: VecDeque::new(),
            window_base: 0,
            anchored: false,
        }
    }

    pub fn window_base(&self) -> i64 {
        self.window_base
    }

    /// Number of occupied slots.
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn oldest_active_index(&self) -> Option<i64> {
        self.slots
            .iter()
            .flatten()
            .next()
            .map(|bin| bin.index)
    }

    /// Fetch the bin for `index`, creating it if the slot is empty.
    ///
    /// `interval` is the record piece's own bounds; sequential bins widen
    /// their extents to cover it. Returns `Stale` for indices below the
    /// window base and a `Capacity` error when the index would stretch
    /// the window past `max_span` slots.
    pub fn insert_or_get(&mut self, index: i64, interval: (i64, i64)) -> CoreResult<BinSlot<'_>> {
        if !self.anchored {
            self.window_base = index;
            self.anchored = true;
        }

        let rel = index - self.window_base;
        if rel < 0 {
            return Ok(BinSlot::Stale);
        }
        let rel = rel as usize;
        if rel >= self.spec.max_span {
            return StructError::from(CoreReason::Capacity)
                .with_detail(format!(
                    "bin {index} sits {rel} slots past window base {}, limit {}",
                    self.window_base, self.spec.max_span
                ))
                .err();
        }

        while self.slots.len() <= rel {
            self.slots.push_back(None);
        }

        let time_mode = self.spec.is_time_mode();
        let bounds = if time_mode {
            self.spec.bin_bounds(index)
        } else {
            interval
        };
        let chain_spec = &self.chain_spec;
        let bin = self.slots[rel].get_or_insert_with(|| Bin {
            index,
            stime: bounds.0,
            etime: bounds.1,
            chain: AggregatorChain::new(chain_spec),
        });
        if !time_mode {
            bin.stime = bin.stime.min(interval.0);
            bin.etime = bin.etime.max(interval.1);
        }
        Ok(BinSlot::Bin(bin))
    }

    /// Evict every bin whose end time has reached `deadline`, oldest
    /// first, sliding the window past it. Empty slots on the way out
    /// become `Gap` entries in time mode.
    ///
    /// Sequential modes keep their newest occupied bin regardless of
    /// the deadline; it is still filling.
    pub fn evict_up_to(&mut self, deadline: i64) -> Vec<Evicted> {
        let mut out = Vec::new();
        loop {
            let Some(pos) = self.slots.iter().position(|s| s.is_some()) else {
                break;
            };
            let ready = matches!(&self.slots[pos], Some(bin) if bin.etime <= deadline);
            if !ready {
                break;
            }
            if !self.spec.is_time_mode() && self.slots.iter().skip(pos + 1).all(|s| s.is_none()) {
                break;
            }
            self.take_front(pos, &mut out);
        }
        out
    }

    /// Evict everything, newest bin included. Shutdown path.
    pub fn drain_all(&mut self) -> Vec<Evicted> {
        let mut out = Vec::new();
        while let Some(pos) = self.slots.iter().position(|s| s.is_some()) {
            self.take_front(pos, &mut out);
        }
        self.slots.clear();
        out
    }

    /// Pop `pos` leading empty slots, then the occupied one behind them.
    fn take_front(&mut self, pos: usize, out: &mut Vec<Evicted>) {
        for _ in 0..pos {
            self.slots.pop_front();
            if self.spec.is_time_mode() {
                let (stime, etime) = self.spec.bin_bounds(self.window_base);
                out.push(Evicted::Gap {
                    index: self.window_base,
                    stime,
                    etime,
                });
            }
            self.window_base += 1;
        }
        if let Some(Some(bin)) = self.slots.pop_front() {
            out.push(Evicted::Bin(bin));
        }
        self.window_base += 1;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

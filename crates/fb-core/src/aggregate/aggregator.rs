use std::collections::{HashMap, VecDeque};

use fb_config::SortField;

use crate::aggregate::key::{FlowKey, KeyMask};
use crate::aggregate::merge::merge_into;
use crate::record::{FlowRecord, Proto};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of offering one record to an aggregator.
#[derive(Debug)]
pub enum InsertOutcome {
    /// Merged into an existing entry. `flushed` carries a record that had
    /// to be emitted before the merge (status span or idle gap exceeded).
    Merged { flushed: Option<FlowRecord> },
    /// A new entry was created.
    Inserted,
    /// The mask cannot key this record; it is handed back so the caller
    /// can emit it unaggregated.
    Unkeyed(FlowRecord),
}

/// What a timer sweep flushed.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub flushed: Vec<FlowRecord>,
    /// Entries removed because they sat idle past the idle timeout.
    pub idle_closed: usize,
    /// Entries emitted (and kept) because their span passed the status
    /// timeout.
    pub status_flushed: usize,
}

// ---------------------------------------------------------------------------
// FlowAggregator
// ---------------------------------------------------------------------------

struct AggregatorEntry {
    record: FlowRecord,
    /// Arrival clock of the last record folded in.
    last_activity: i64,
    /// Stamp of this entry's live position in the idle queue.
    stamp: u64,
}

/// Key-addressed record store with an insertion-order idle queue.
///
/// The queue holds `(key, stamp)` pairs and is maintained lazily: merging
/// re-stamps the entry and pushes a fresh pair to the back, and sweeps skip
/// pairs whose stamp no longer matches. The front of the queue is therefore
/// always the least recently touched live entry.
pub struct FlowAggregator {
    mask: KeyMask,
    idle_micros: i64,
    status_micros: i64,
    direction_correction: bool,
    entries: HashMap<FlowKey, AggregatorEntry>,
    queue: VecDeque<(FlowKey, u64)>,
    next_stamp: u64,
}

impl FlowAggregator {
    pub fn new(
        mask: KeyMask,
        idle_micros: i64,
        status_micros: i64,
        direction_correction: bool,
    ) -> Self {
        Self {
            mask,
            idle_micros,
            status_micros,
            direction_correction,
            entries: HashMap::new(),
            queue: VecDeque::new(),
            next_stamp: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Offer a record for aggregation at arrival clock `now`.
    ///
    /// Forward key miss probes the reversed key when direction correction
    /// is on and the protocol is reversible; a reverse hit runs the
    /// orientation tie-breaks. An empty mask collects every record as its
    /// own entry.
    pub fn insert(&mut self, record: FlowRecord, now: i64) -> InsertOutcome {
        if self.mask.is_empty() {
            // collect-without-merge: synthetic unique keys
            let key = format!("#{}", self.next_stamp);
            return self.insert_new(key, record, now);
        }

        let key = match self.mask.key(&record) {
            Ok(k) => k,
            Err(_) => return InsertOutcome::Unkeyed(record),
        };

        if self.entries.contains_key(&key) {
            let flushed = self.merge_at(&key, record, now);
            return InsertOutcome::Merged { flushed };
        }

        if self.direction_correction && record.flow.proto.supports_reverse() {
            let reversed = record.reverse();
            if let Ok(rkey) = self.mask.key(&reversed)
                && self.entries.contains_key(&rkey)
            {
                return self.resolve_reverse_hit(key, rkey, record, reversed, now);
            }

            // ICMP request/reply pairing: probe with the counterpart type.
            if record.flow.proto == Proto::Icmp
                && let Some(probe) = icmp_pair_probe(&record)
                && let Ok(pkey) = self.mask.key(&probe)
                && self.entries.contains_key(&pkey)
            {
                let flushed = self.merge_at(&pkey, record.reverse(), now);
                return InsertOutcome::Merged { flushed };
            }
        }

        self.insert_new(key, record, now)
    }

    /// Timer sweep: close idle entries from the queue front, then emit
    /// long-span entries in place.
    pub fn sweep(&mut self, now: i64) -> SweepReport {
        let mut report = SweepReport::default();

        if self.idle_micros > 0 {
            while let Some((key, stamp)) = self.queue.front() {
                match self.entries.get(key) {
                    Some(e) if e.stamp == *stamp => {
                        if now - e.last_activity < self.idle_micros {
                            // queue is insertion-ordered: nothing behind is older
                            break;
                        }
                    }
                    _ => {
                        // stale pair from a later re-stamp
                        self.queue.pop_front();
                        continue;
                    }
                }
                if let Some((key, _)) = self.queue.pop_front()
                    && let Some(entry) = self.entries.remove(&key)
                {
                    if !entry.record.written {
                        report.flushed.push(entry.record);
                    }
                    report.idle_closed += 1;
                }
            }
        }

        if self.status_micros > 0 {
            for (key, stamp) in &self.queue {
                let Some(entry) = self.entries.get_mut(key) else {
                    continue;
                };
                if entry.stamp != *stamp || entry.record.written {
                    continue;
                }
                if entry.record.duration_micros() >= self.status_micros {
                    report.flushed.push(entry.record.clone());
                    entry.record.written = true;
                    report.status_flushed += 1;
                }
            }
        }

        report
    }

    /// Remove and return every unwritten entry, sorted, with ranks
    /// assigned 1..N in drain order.
    pub fn drain(&mut self, sort: SortField) -> Vec<FlowRecord> {
        let mut records = Vec::with_capacity(self.entries.len());
        while let Some((key, stamp)) = self.queue.pop_front() {
            let live = matches!(self.entries.get(&key), Some(e) if e.stamp == stamp);
            if live && let Some(entry) = self.entries.remove(&key) {
                if !entry.record.written {
                    records.push(entry.record);
                }
            }
        }
        self.entries.clear();

        sort_records(&mut records, sort);
        for (i, record) in records.iter_mut().enumerate() {
            record.rank = Some(i as u64 + 1);
        }
        records
    }

    // -- private helpers ----------------------------------------------------

    fn insert_new(&mut self, key: FlowKey, record: FlowRecord, now: i64) -> InsertOutcome {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        self.queue.push_back((key.clone(), stamp));
        self.entries.insert(
            key,
            AggregatorEntry {
                record,
                last_activity: now,
                stamp,
            },
        );
        InsertOutcome::Inserted
    }

    /// Fold `incoming` (already oriented to match the entry) into the
    /// entry at `key`, flushing the entry first when its reporting period
    /// is over. Returns the flushed record, if any.
    fn merge_at(&mut self, key: &FlowKey, incoming: FlowRecord, now: i64) -> Option<FlowRecord> {
        let entry = self.entries.get_mut(key)?;
        let mut flushed = None;

        if entry.record.written {
            // already emitted by a status sweep: fresh period, no re-emit
            entry.record = entry.record.zeroed();
        } else {
            let span = entry.record.end_micros.max(incoming.end_micros)
                - entry.record.start_micros.min(incoming.start_micros);
            let gap = disjoint_gap(&entry.record, &incoming);

            if (self.status_micros > 0 && span >= self.status_micros)
                || (self.idle_micros > 0 && gap >= self.idle_micros)
            {
                flushed = Some(entry.record.clone());
                entry.record = entry.record.zeroed();
            }
        }

        merge_into(&mut entry.record, &incoming);
        entry.last_activity = now;

        // LRU touch: re-stamp and append; the old pair goes stale
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        entry.stamp = stamp;
        self.queue.push_back((key.clone(), stamp));

        flushed
    }

    /// A record arrived whose reverse matches an existing entry; decide
    /// which orientation wins.
    fn resolve_reverse_hit(
        &mut self,
        fwd_key: FlowKey,
        rkey: FlowKey,
        record: FlowRecord,
        reversed: FlowRecord,
        now: i64,
    ) -> InsertOutcome {
        if record.flow.proto == Proto::Tcp {
            let incoming = record.tcp.unwrap_or_default();
            let existing = self
                .entries
                .get(&rkey)
                .and_then(|e| e.record.tcp)
                .unwrap_or_default();

            // both sides opened a handshake: two distinct connections
            if incoming.saw_syn && existing.saw_syn {
                return self.insert_new(fwd_key, record, now);
            }

            // the incoming side opened the handshake: it is the source
            if incoming.saw_syn || (incoming.saw_syn_sent && incoming.established) {
                self.rekey_reversed(&rkey, fwd_key.clone(), now);
                let flushed = self.merge_at(&fwd_key, record, now);
                return InsertOutcome::Merged { flushed };
            }
        }

        // default: the earlier start time wins as source
        let existing_start = self
            .entries
            .get(&rkey)
            .map(|e| e.record.start_micros)
            .unwrap_or(i64::MIN);
        if record.start_micros < existing_start {
            self.rekey_reversed(&rkey, fwd_key.clone(), now);
            let flushed = self.merge_at(&fwd_key, record, now);
            InsertOutcome::Merged { flushed }
        } else {
            let flushed = self.merge_at(&rkey, reversed, now);
            InsertOutcome::Merged { flushed }
        }
    }

    /// Reverse the entry stored at `from` and re-home it under `to`.
    fn rekey_reversed(&mut self, from: &FlowKey, to: FlowKey, now: i64) {
        let Some(mut entry) = self.entries.remove(from) else {
            return;
        };
        entry.record = entry.record.reverse();
        entry.last_activity = now;

        let stamp = self.next_stamp;
        self.next_stamp += 1;
        entry.stamp = stamp;
        self.queue.push_back((to.clone(), stamp));
        self.entries.insert(to, entry);
    }
}

/// Distance between two non-overlapping intervals, zero when they touch
/// or overlap.
fn disjoint_gap(a: &FlowRecord, b: &FlowRecord) -> i64 {
    if b.end_micros < a.start_micros {
        a.start_micros - b.end_micros
    } else if a.end_micros < b.start_micros {
        b.start_micros - a.end_micros
    } else {
        0
    }
}

/// Probe record for ICMP request/reply pairing: endpoints swapped, type
/// replaced with its counterpart, code untouched.
fn icmp_pair_probe(record: &FlowRecord) -> Option<FlowRecord> {
    let pair = record.icmp?.reply_pair()?;
    let mut probe = record.clone();
    probe.flow.saddr = record.flow.daddr;
    probe.flow.daddr = record.flow.saddr;
    probe.flow.sport = pair.wire_type() as u16;
    probe.icmp = Some(pair);
    Some(probe)
}

fn sort_records(records: &mut [FlowRecord], sort: SortField) {
    use std::cmp::Reverse;
    match sort {
        SortField::StartTime => records.sort_by_key(|r| r.start_micros),
        SortField::Bytes => records.sort_by_key(|r| Reverse(r.counters.total_bytes())),
        SortField::Pkts => records.sort_by_key(|r| Reverse(r.counters.total_pkts())),
        SortField::Duration => records.sort_by_key(|r| Reverse(r.duration_micros())),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

use fb_config::{FlowbinConfig, SortField};
use orion_error::prelude::*;

use crate::aggregate::{AggregatorChain, ChainSpec, Disposition, OfferOutcome};
use crate::bin::{Aligner, BinSlot, BinSpec, BinTable, Evicted, SplitMode};
use crate::error::{CoreReason, CoreResult};
use crate::record::FlowRecord;
use crate::sink::RecordSink;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Running totals since the pipeline was built.
#[derive(Debug, Default, Clone, Copy)]
pub struct PipelineStats {
    /// Records accepted into the pipeline, mirrors included.
    pub admitted: u64,
    /// Bin-aligned pieces produced from admitted records.
    pub pieces: u64,
    /// Records handed to the sink.
    pub emitted: u64,
    /// Records rejected by every policy filter.
    pub dropped: u64,
    /// Pieces that arrived below the bin window and went out unbinned.
    pub stale: u64,
    /// Records no policy mask could key.
    pub unkeyed: u64,
    /// Records refused for a negative interval.
    pub invalid: u64,
}

/// What one timer pass moved out of the pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickReport {
    pub bins_evicted: u64,
    pub gaps_zero_filled: u64,
    pub records_emitted: u64,
    pub idle_closed: u64,
    pub status_flushed: u64,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// The full ingest-to-sink path: alignment, the bin window and the
/// aggregation chains, wired to one output sink.
///
/// Time drives it from outside: `ingest` takes the arrival clock with
/// each record and `tick` runs eviction and timer sweeps. Binned chains
/// flush only when their bin is evicted, which keeps each bin's output
/// contiguous; the pipeline-level chain used by the `none` split mode is
/// the only one the timer sweeps directly.
pub struct Pipeline {
    spec: BinSpec,
    aligner: Aligner,
    table: BinTable,
    global: AggregatorChain,
    sort: SortField,
    sink: Box<dyn RecordSink>,
    mon_mode: bool,
    matrix_mode: bool,
    /// Last admitted record, lending its flow identity to gap fills.
    zero_template: Option<FlowRecord>,
    stats: PipelineStats,
}

impl Pipeline {
    pub fn new(
        cfg: &FlowbinConfig,
        sink: Box<dyn RecordSink>,
        now_micros: i64,
    ) -> CoreResult<Self> {
        let spec = BinSpec::build(&cfg.bin, now_micros)?;
        let chain_spec = ChainSpec::build(&cfg.aggregator)?;
        let table = BinTable::new(spec, chain_spec.clone());
        let global = AggregatorChain::new(&chain_spec);

        Ok(Self {
            spec,
            aligner: Aligner::new(spec),
            table,
            global,
            sort: cfg.output.sort,
            sink,
            mon_mode: cfg.aggregator.mon_mode,
            // canonical orientation only matters to masks that key on addresses
            matrix_mode: cfg.aggregator.matrix_mode && chain_spec.uses_addresses(),
            zero_template: None,
            stats: PipelineStats::default(),
        })
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Occupied bins plus live aggregator entries, for progress logs.
    pub fn live_counts(&self) -> (usize, usize) {
        (self.table.occupied(), self.global.len())
    }

    /// Feed one record in at arrival clock `now_micros`.
    ///
    /// Monitor mode admits the record twice, once per direction. A
    /// `Capacity` error is fatal; a negative interval only drops the
    /// record.
    pub fn ingest(&mut self, record: FlowRecord, now_micros: i64) -> CoreResult<()> {
        if self.mon_mode {
            let mirror = record.reverse();
            self.admit(record, now_micros)?;
            self.admit(mirror, now_micros)?;
        } else {
            self.admit(record, now_micros)?;
        }
        Ok(())
    }

    /// Run the timers at `now_micros`: evict bins whose hold expired,
    /// then sweep the pipeline-level chain.
    pub fn tick(&mut self, now_micros: i64) -> CoreResult<TickReport> {
        let mut report = TickReport::default();

        let deadline = now_micros - self.spec.hold_micros;
        let evicted = self.table.evict_up_to(deadline);
        self.flush_evicted(evicted, &mut report)?;

        let sweep = self.global.sweep(now_micros);
        report.idle_closed += sweep.idle_closed as u64;
        report.status_flushed += sweep.status_flushed as u64;
        for record in &sweep.flushed {
            self.emit(record)?;
            report.records_emitted += 1;
        }

        Ok(report)
    }

    /// Flush everything still live: every bin regardless of hold, then
    /// the pipeline-level chain.
    pub fn shutdown(&mut self) -> CoreResult<TickReport> {
        let mut report = TickReport::default();

        let evicted = self.table.drain_all();
        self.flush_evicted(evicted, &mut report)?;

        for record in self.global.drain(self.sort) {
            self.emit(&record)?;
            report.records_emitted += 1;
        }

        Ok(report)
    }

    // -- ingest path --------------------------------------------------------

    fn admit(&mut self, mut record: FlowRecord, now_micros: i64) -> CoreResult<()> {
        if self.matrix_mode && !record.flow.src_is_canonical() {
            record = record.reverse();
        }

        let template = record.clone();
        let pieces = match self.aligner.align(record) {
            Ok(pieces) => pieces,
            Err(e) => {
                self.stats.invalid += 1;
                log::warn!("dropping record with invalid interval: {e}");
                return Ok(());
            }
        };
        self.stats.admitted += 1;
        self.zero_template = Some(template);

        for (index, piece) in pieces {
            self.stats.pieces += 1;
            self.place(index, piece, now_micros)?;
        }
        Ok(())
    }

    fn place(&mut self, index: i64, piece: FlowRecord, now_micros: i64) -> CoreResult<()> {
        if self.spec.mode == SplitMode::None {
            let outcome = self.global.offer(piece, now_micros);
            return self.settle(outcome);
        }

        let interval = (piece.start_micros, piece.end_micros);
        match self.table.insert_or_get(index, interval)? {
            BinSlot::Stale => {
                self.stats.stale += 1;
                log::debug!(
                    "bin {index} below window base {}, emitting unbinned",
                    self.table.window_base()
                );
                self.emit(&piece)?;
            }
            BinSlot::Bin(bin) => {
                let outcome = bin.chain.offer(piece, now_micros);
                self.settle(outcome)?;
            }
        }
        Ok(())
    }

    fn settle(&mut self, outcome: OfferOutcome) -> CoreResult<()> {
        for record in &outcome.flushed {
            self.emit(record)?;
        }
        match outcome.disposition {
            Disposition::Taken => {}
            Disposition::Dropped => self.stats.dropped += 1,
            Disposition::Unkeyed(record) => {
                self.stats.unkeyed += 1;
                log::debug!("policy mask cannot key record, emitting as is");
                self.emit(&record)?;
            }
        }
        Ok(())
    }

    // -- drain path ---------------------------------------------------------

    fn flush_evicted(&mut self, evicted: Vec<Evicted>, report: &mut TickReport) -> CoreResult<()> {
        for item in evicted {
            match item {
                Evicted::Bin(mut bin) => {
                    report.bins_evicted += 1;
                    for record in bin.chain.drain(self.sort) {
                        self.emit(&record)?;
                        report.records_emitted += 1;
                    }
                }
                Evicted::Gap {
                    index,
                    stime,
                    etime,
                } => {
                    if !self.spec.zero {
                        continue;
                    }
                    let Some(template) = &self.zero_template else {
                        continue;
                    };
                    let mut zero = template.zeroed();
                    zero.start_micros = stime;
                    zero.end_micros = etime;
                    log::debug!("zero-filling empty bin {index}");
                    self.emit(&zero)?;
                    report.gaps_zero_filled += 1;
                    report.records_emitted += 1;
                }
            }
        }
        Ok(())
    }

    fn emit(&mut self, record: &FlowRecord) -> CoreResult<()> {
        self.sink
            .emit(record)
            .map_err(|e| StructError::from(CoreReason::Resource).with_detail(e.to_string()))?;
        self.stats.emitted += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Counters, Direction, FlowTuple, Proto};
    use crate::sink::RecordSink;
    use anyhow::Result;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::{Arc, Mutex};

    const SEC: i64 = 1_000_000;

    /// In-memory sink that keeps every record it gets.
    struct CaptureSink {
        records: Mutex<Vec<FlowRecord>>,
    }

    impl CaptureSink {
        fn new() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
            }
        }

        fn take(&self) -> Vec<FlowRecord> {
            std::mem::take(&mut self.records.lock().unwrap())
        }

        fn len(&self) -> usize {
            self.records.lock().unwrap().len()
        }
    }

    impl RecordSink for CaptureSink {
        fn emit(&self, record: &FlowRecord) -> Result<()> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    // Implement RecordSink for Arc<T> so Arc<CaptureSink> works as Box<dyn RecordSink>
    impl<T: RecordSink> RecordSink for Arc<T> {
        fn emit(&self, record: &FlowRecord) -> Result<()> {
            (**self).emit(record)
        }
    }

    fn record(start_s: i64, end_s: i64, dport: u16) -> FlowRecord {
        FlowRecord {
            start_micros: start_s * SEC,
            end_micros: end_s * SEC,
            flow: FlowTuple {
                saddr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
                daddr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
                sport: 50000,
                dport,
                proto: Proto::Udp,
            },
            counters: Counters {
                src_pkts: 4,
                dst_pkts: 0,
                src_bytes: 400,
                dst_bytes: 0,
            },
            direction: Direction::Forward,
            tcp: None,
            icmp: None,
            written: false,
            rank: None,
        }
    }

    fn time_config(span: &str, hold: &str, zero: bool) -> FlowbinConfig {
        format!(
            r#"
[bin]
mode = "time"
span = "{span}"
hold = "{hold}"
zero = {zero}
"#
        )
        .parse()
        .unwrap()
    }

    fn none_config(extra: &str) -> FlowbinConfig {
        format!(
            r#"
[bin]
mode = "none"

[aggregator]
{extra}
"#
        )
        .parse()
        .unwrap()
    }

    fn pipeline(cfg: &FlowbinConfig) -> (Pipeline, Arc<CaptureSink>) {
        let cap = Arc::new(CaptureSink::new());
        let pipe = Pipeline::new(cfg, Box::new(Arc::clone(&cap)), 0).unwrap();
        (pipe, cap)
    }

    // -- 1. evicted_bin_emits_merged_records --------------------------------

    #[test]
    fn evicted_bin_emits_merged_records() {
        let cfg = time_config("10s", "0s", false);
        let (mut pipe, cap) = pipeline(&cfg);

        pipe.ingest(record(0, 5, 443), 5 * SEC).unwrap();
        pipe.ingest(record(2, 6, 443), 6 * SEC).unwrap();
        pipe.ingest(record(11, 12, 443), 12 * SEC).unwrap();

        // bin 0 closes at 10s; with no hold it leaves on the next tick
        let report = pipe.tick(12 * SEC).unwrap();
        assert_eq!(report.bins_evicted, 1);
        assert_eq!(report.records_emitted, 1);

        let out = cap.take();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].counters.src_pkts, 8);
        assert_eq!(out[0].rank, Some(1));
    }

    // -- 2. boundary_crossing_record_feeds_both_bins ------------------------

    #[test]
    fn boundary_crossing_record_feeds_both_bins() {
        let cfg = time_config("10s", "0s", false);
        let (mut pipe, cap) = pipeline(&cfg);

        pipe.ingest(record(5, 15, 443), 15 * SEC).unwrap();
        assert_eq!(pipe.stats().pieces, 2);

        let report = pipe.shutdown().unwrap();
        assert_eq!(report.bins_evicted, 2);

        let out = cap.take();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].start_micros, 5 * SEC);
        assert_eq!(out[0].end_micros, 10 * SEC);
        assert_eq!(out[1].start_micros, 10 * SEC);
        assert_eq!(out[1].end_micros, 15 * SEC);
        // counters ride along whole, not prorated
        assert_eq!(out[0].counters.src_pkts, 4);
        assert_eq!(out[1].counters.src_pkts, 4);
    }

    // -- 3. gap_bins_zero_filled --------------------------------------------

    #[test]
    fn gap_bins_zero_filled() {
        let cfg = time_config("10s", "0s", true);
        let (mut pipe, cap) = pipeline(&cfg);

        pipe.ingest(record(0, 5, 443), 5 * SEC).unwrap();
        pipe.ingest(record(31, 35, 443), 35 * SEC).unwrap();

        let report = pipe.tick(40 * SEC).unwrap();
        assert_eq!(report.bins_evicted, 2);
        assert_eq!(report.gaps_zero_filled, 2);
        assert_eq!(report.records_emitted, 4);

        let out = cap.take();
        assert_eq!(out.len(), 4);
        // the two gap records cover bins 1 and 2 with empty counters
        assert!(out[1].counters.is_empty());
        assert_eq!(out[1].start_micros, 10 * SEC);
        assert_eq!(out[1].end_micros, 20 * SEC);
        assert!(out[2].counters.is_empty());
        assert_eq!(out[2].start_micros, 20 * SEC);
        assert_eq!(out[2].end_micros, 30 * SEC);
        // identity borrowed from live traffic
        assert_eq!(out[1].flow.dport, 443);
    }

    // -- 4. gaps_silent_without_zero_mode -----------------------------------

    #[test]
    fn gaps_silent_without_zero_mode() {
        let cfg = time_config("10s", "0s", false);
        let (mut pipe, cap) = pipeline(&cfg);

        pipe.ingest(record(0, 5, 443), 5 * SEC).unwrap();
        pipe.ingest(record(31, 35, 443), 35 * SEC).unwrap();

        let report = pipe.tick(40 * SEC).unwrap();
        assert_eq!(report.gaps_zero_filled, 0);
        assert_eq!(cap.len(), 2);
    }

    // -- 5. stale_record_emitted_unbinned -----------------------------------

    #[test]
    fn stale_record_emitted_unbinned() {
        let cfg = time_config("10s", "0s", false);
        let (mut pipe, cap) = pipeline(&cfg);

        pipe.ingest(record(50, 55, 443), 55 * SEC).unwrap();
        pipe.tick(60 * SEC).unwrap();
        cap.take();

        // a straggler from a window that has already closed
        pipe.ingest(record(0, 5, 443), 61 * SEC).unwrap();
        assert_eq!(pipe.stats().stale, 1);

        let out = cap.take();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].start_micros, 0);
        assert!(out[0].rank.is_none());
    }

    // -- 6. hold_keeps_closed_bins_resident ---------------------------------

    #[test]
    fn hold_keeps_closed_bins_resident() {
        let cfg = time_config("10s", "15s", false);
        let (mut pipe, cap) = pipeline(&cfg);

        pipe.ingest(record(0, 5, 443), 5 * SEC).unwrap();

        // bin 0 closed at 10s but the hold runs to 25s
        let report = pipe.tick(20 * SEC).unwrap();
        assert_eq!(report.bins_evicted, 0);
        assert_eq!(cap.len(), 0);

        let report = pipe.tick(25 * SEC).unwrap();
        assert_eq!(report.bins_evicted, 1);
        assert_eq!(cap.len(), 1);
    }

    // -- 7. none_mode_drains_through_global_chain ---------------------------

    #[test]
    fn none_mode_drains_through_global_chain() {
        let cfg = none_config("");
        let (mut pipe, cap) = pipeline(&cfg);

        pipe.ingest(record(0, 5, 443), 5 * SEC).unwrap();
        pipe.ingest(record(2, 8, 443), 8 * SEC).unwrap();
        pipe.ingest(record(3, 9, 80), 9 * SEC).unwrap();

        let report = pipe.shutdown().unwrap();
        assert_eq!(report.records_emitted, 2);

        let out = cap.take();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].rank, Some(1));
        assert_eq!(out[1].rank, Some(2));
        // start-time order puts the merged 443 entry first
        assert_eq!(out[0].flow.dport, 443);
        assert_eq!(out[0].counters.src_pkts, 8);
    }

    // -- 8. none_mode_timers_flush_idle_entries -----------------------------

    #[test]
    fn none_mode_timers_flush_idle_entries() {
        let cfg = none_config("idle_timeout = \"30s\"\nstatus_timeout = \"0s\"");
        let (mut pipe, cap) = pipeline(&cfg);

        pipe.ingest(record(0, 5, 443), 0).unwrap();
        let report = pipe.tick(31 * SEC).unwrap();
        assert_eq!(report.idle_closed, 1);
        assert_eq!(cap.len(), 1);
        assert!(pipe.shutdown().unwrap().records_emitted == 0);
    }

    // -- 9. mon_mode_admits_both_directions ---------------------------------

    #[test]
    fn mon_mode_admits_both_directions() {
        let cfg = none_config("mon_mode = true\n\n[[aggregator.policy]]\nkey = [\"saddr\"]");
        let (mut pipe, cap) = pipeline(&cfg);

        pipe.ingest(record(0, 5, 443), 5 * SEC).unwrap();
        assert_eq!(pipe.stats().admitted, 2);

        pipe.shutdown().unwrap();
        let out = cap.take();
        assert_eq!(out.len(), 2);
        let mut sources: Vec<_> = out.iter().map(|r| r.flow.saddr.to_string()).collect();
        sources.sort();
        assert_eq!(sources, vec!["10.0.0.1", "10.0.0.2"]);
    }

    // -- 10. matrix_mode_folds_directions_together --------------------------

    #[test]
    fn matrix_mode_folds_directions_together() {
        let cfg = none_config("matrix_mode = true\ndirection_correction = false");
        let (mut pipe, cap) = pipeline(&cfg);

        let fwd = record(0, 5, 443);
        let rev = record(6, 9, 443).reverse();
        pipe.ingest(fwd, 5 * SEC).unwrap();
        pipe.ingest(rev, 9 * SEC).unwrap();

        pipe.shutdown().unwrap();
        let out = cap.take();
        assert_eq!(out.len(), 1);
        // the smaller address ends up as source either way
        assert_eq!(out[0].flow.saddr.to_string(), "10.0.0.1");
        assert_eq!(out[0].counters.src_pkts, 8);
    }

    // -- 11. matrix_mode_inert_without_address_keys -------------------------

    #[test]
    fn matrix_mode_inert_without_address_keys() {
        let cfg = none_config(
            "matrix_mode = true\ndirection_correction = false\n\n[[aggregator.policy]]\nkey = [\"dport\"]",
        );
        let (mut pipe, cap) = pipeline(&cfg);

        pipe.ingest(record(0, 5, 443), 5 * SEC).unwrap();
        pipe.ingest(record(6, 9, 443).reverse(), 9 * SEC).unwrap();

        // no flipping, so the reversed record keys on its own dport
        pipe.shutdown().unwrap();
        let out = cap.take();
        assert_eq!(out.len(), 2);
        let mut ports: Vec<_> = out.iter().map(|r| r.flow.dport).collect();
        ports.sort();
        assert_eq!(ports, vec![443, 50000]);
    }

    // -- 12. invalid_interval_dropped_not_fatal -----------------------------

    #[test]
    fn invalid_interval_dropped_not_fatal() {
        let cfg = time_config("10s", "0s", false);
        let (mut pipe, cap) = pipeline(&cfg);

        let mut bad = record(5, 5, 443);
        bad.start_micros = 6 * SEC;
        assert!(pipe.ingest(bad, 6 * SEC).is_ok());
        assert_eq!(pipe.stats().invalid, 1);
        assert_eq!(pipe.stats().admitted, 0);

        pipe.shutdown().unwrap();
        assert_eq!(cap.len(), 0);
    }

    // -- 13. window_overflow_is_fatal ---------------------------------------

    #[test]
    fn window_overflow_is_fatal() {
        let cfg: FlowbinConfig = r#"
[bin]
mode = "time"
span = "10s"
max_span = 4
"#
        .parse()
        .unwrap();
        let (mut pipe, _cap) = pipeline(&cfg);

        pipe.ingest(record(0, 5, 443), 5 * SEC).unwrap();
        assert!(pipe.ingest(record(45, 46, 443), 46 * SEC).is_err());
    }

    // -- 14. shutdown_is_exhaustive -----------------------------------------

    #[test]
    fn shutdown_is_exhaustive() {
        let cfg = time_config("10s", "60s", false);
        let (mut pipe, cap) = pipeline(&cfg);

        pipe.ingest(record(0, 5, 443), 5 * SEC).unwrap();
        pipe.ingest(record(12, 15, 80), 15 * SEC).unwrap();

        // hold would keep both bins for another minute
        let report = pipe.shutdown().unwrap();
        assert_eq!(report.bins_evicted, 2);
        assert_eq!(cap.len(), 2);

        // nothing left behind
        assert_eq!(pipe.shutdown().unwrap().records_emitted, 0);
        assert_eq!(pipe.live_counts(), (0, 0));
    }
}

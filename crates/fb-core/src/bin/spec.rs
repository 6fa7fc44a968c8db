use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use fb_config::{BinConfig, BinMode, BinUnit};
use orion_error::ErrorOwe;

use crate::error::CoreResult;

// ---------------------------------------------------------------------------
// SplitMode
// ---------------------------------------------------------------------------

/// How bin indices are assigned to records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitMode {
    /// Fixed intervals aligned to `anchor_micros`; records crossing a
    /// boundary are split.
    Time { value: u32, unit: BinUnit },
    /// A new index every `value` admitted records.
    Count { value: u64 },
    /// A new index once the running byte total passes `bytes`.
    Size { bytes: u64 },
    /// One index per distinct flow, in first-seen order.
    Flow,
    /// Everything lands on index 0 and drains through the
    /// pipeline-level aggregator.
    None,
}

// ---------------------------------------------------------------------------
// BinSpec
// ---------------------------------------------------------------------------

/// Resolved binning parameters, fixed for the lifetime of a pipeline.
#[derive(Debug, Clone, Copy)]
pub struct BinSpec {
    pub mode: SplitMode,
    /// Bin width in microseconds; zero for the sequential modes.
    pub size_micros: i64,
    /// Alignment origin for time mode, from calendar truncation of the
    /// construction instant.
    pub anchor_micros: i64,
    /// Split boundary-crossing records. When off, a record is binned
    /// whole by its start time.
    pub modify: bool,
    /// Clip single-bin output records to their bin boundaries.
    pub hard: bool,
    /// Synthesise empty records for gap bins during eviction.
    pub zero: bool,
    pub hold_micros: i64,
    /// Ceiling on simultaneously live bin indices.
    pub max_span: usize,
}

impl BinSpec {
    /// Resolve a `[bin]` config section at `now_micros`.
    pub fn build(cfg: &BinConfig, now_micros: i64) -> CoreResult<Self> {
        let (mode, size_micros, anchor_micros) = match cfg.mode {
            BinMode::Time => {
                let span = cfg
                    .span
                    .ok_or_else(|| anyhow::anyhow!("bin.span missing for time mode"))
                    .owe_conf()?;
                let anchor = truncate_anchor(now_micros, span.value, span.unit)?;
                (
                    SplitMode::Time {
                        value: span.value,
                        unit: span.unit,
                    },
                    span.span_micros(),
                    anchor,
                )
            }
            BinMode::Count => (
                SplitMode::Count {
                    value: cfg.count_or_default(),
                },
                0,
                0,
            ),
            BinMode::Size => {
                let size = cfg
                    .size
                    .ok_or_else(|| anyhow::anyhow!("bin.size missing for size mode"))
                    .owe_conf()?;
                (
                    SplitMode::Size {
                        bytes: size.as_bytes() as u64,
                    },
                    0,
                    0,
                )
            }
            BinMode::Flow => (SplitMode::Flow, 0, 0),
            BinMode::None => (SplitMode::None, 0, 0),
        };

        Ok(Self {
            mode,
            size_micros,
            anchor_micros,
            modify: cfg.modify,
            hard: cfg.hard,
            zero: cfg.zero,
            hold_micros: cfg.hold.as_micros(),
            max_span: cfg.max_span,
        })
    }

    pub fn is_time_mode(&self) -> bool {
        matches!(self.mode, SplitMode::Time { .. })
    }

    /// Index of the bin containing `t_micros`. Floor division, so
    /// timestamps before the anchor map to negative indices.
    pub fn bin_index(&self, t_micros: i64) -> i64 {
        debug_assert!(self.size_micros > 0);
        (t_micros - self.anchor_micros).div_euclid(self.size_micros)
    }

    pub fn bin_start(&self, index: i64) -> i64 {
        self.anchor_micros + index * self.size_micros
    }

    /// Half-open `[start, end)` boundaries of a time-mode bin.
    pub fn bin_bounds(&self, index: i64) -> (i64, i64) {
        let start = self.bin_start(index);
        (start, start + self.size_micros)
    }
}

// ---------------------------------------------------------------------------
// Calendar truncation
// ---------------------------------------------------------------------------

/// Truncate `now_micros` down to the start of its calendar unit in UTC:
/// year and month to their first day, week to the previous Sunday, and
/// second mode to a multiple of `value` seconds from the epoch.
fn truncate_anchor(now_micros: i64, value: u32, unit: BinUnit) -> CoreResult<i64> {
    if unit == BinUnit::Second {
        let width = value as i64 * 1_000_000;
        return Ok(now_micros.div_euclid(width) * width);
    }

    let dt = DateTime::from_timestamp_micros(now_micros)
        .ok_or_else(|| anyhow::anyhow!("timestamp {now_micros} out of range"))
        .owe_conf()?;

    let anchored = match unit {
        BinUnit::Year => Utc.with_ymd_and_hms(dt.year(), 1, 1, 0, 0, 0),
        BinUnit::Month => Utc.with_ymd_and_hms(dt.year(), dt.month(), 1, 0, 0, 0),
        BinUnit::Week => {
            let back = dt.weekday().num_days_from_sunday() as i64;
            let sunday = dt - chrono::Duration::days(back);
            Utc.with_ymd_and_hms(sunday.year(), sunday.month(), sunday.day(), 0, 0, 0)
        }
        BinUnit::Day => Utc.with_ymd_and_hms(dt.year(), dt.month(), dt.day(), 0, 0, 0),
        BinUnit::Hour => Utc.with_ymd_and_hms(dt.year(), dt.month(), dt.day(), dt.hour(), 0, 0),
        BinUnit::Minute => {
            Utc.with_ymd_and_hms(dt.year(), dt.month(), dt.day(), dt.hour(), dt.minute(), 0)
        }
        BinUnit::Second => unreachable!("handled above"),
    };

    let anchored = anchored
        .single()
        .ok_or_else(|| anyhow::anyhow!("ambiguous anchor for {now_micros}"))
        .owe_conf()?;

    Ok(anchored.timestamp_micros())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn micros(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> i64 {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s)
            .unwrap()
            .timestamp_micros()
    }

    fn time_spec(span: &str, now: i64) -> BinSpec {
        let mut cfg = BinConfig::default();
        cfg.span = Some(span.parse().unwrap());
        BinSpec::build(&cfg, now).unwrap()
    }

    #[test]
    fn anchor_second_floors_to_multiple() {
        let spec = time_spec("30s", 100_500_000);
        assert_eq!(spec.anchor_micros, 90_000_000);
        assert_eq!(spec.size_micros, 30_000_000);
    }

    #[test]
    fn anchor_minute_zeroes_seconds() {
        let now = micros(2024, 2, 15, 10, 30, 45);
        let spec = time_spec("5m", now);
        assert_eq!(spec.anchor_micros, micros(2024, 2, 15, 10, 30, 0));
    }

    #[test]
    fn anchor_hour_zeroes_minutes() {
        let now = micros(2024, 2, 15, 10, 30, 45);
        let spec = time_spec("1h", now);
        assert_eq!(spec.anchor_micros, micros(2024, 2, 15, 10, 0, 0));
    }

    #[test]
    fn anchor_day_zeroes_time() {
        let now = micros(2024, 2, 15, 10, 30, 45);
        let spec = time_spec("1d", now);
        assert_eq!(spec.anchor_micros, micros(2024, 2, 15, 0, 0, 0));
    }

    #[test]
    fn anchor_week_goes_to_sunday() {
        // 2024-01-10 was a Wednesday; the preceding Sunday was the 7th.
        let now = micros(2024, 1, 10, 8, 0, 0);
        let spec = time_spec("1w", now);
        assert_eq!(spec.anchor_micros, micros(2024, 1, 7, 0, 0, 0));
    }

    #[test]
    fn anchor_month_goes_to_first() {
        let now = micros(2024, 2, 15, 10, 30, 45);
        let spec = time_spec("1M", now);
        assert_eq!(spec.anchor_micros, micros(2024, 2, 1, 0, 0, 0));
    }

    #[test]
    fn anchor_year_goes_to_january() {
        let now = micros(2024, 2, 15, 10, 30, 45);
        let spec = time_spec("1y", now);
        assert_eq!(spec.anchor_micros, micros(2024, 1, 1, 0, 0, 0));
    }

    #[test]
    fn bin_index_floor_division() {
        let spec = time_spec("60s", 0);
        assert_eq!(spec.anchor_micros, 0);
        assert_eq!(spec.bin_index(0), 0);
        assert_eq!(spec.bin_index(59_999_999), 0);
        assert_eq!(spec.bin_index(60_000_000), 1);
        // before the anchor: floor, not truncation toward zero
        assert_eq!(spec.bin_index(-1), -1);
        assert_eq!(spec.bin_index(-60_000_000), -1);
        assert_eq!(spec.bin_index(-60_000_001), -2);
    }

    #[test]
    fn bin_bounds_are_half_open_width() {
        let spec = time_spec("60s", 130_000_000);
        let (start, end) = spec.bin_bounds(spec.bin_index(130_000_000));
        assert_eq!(start, 120_000_000);
        assert_eq!(end, 180_000_000);
    }

    #[test]
    fn build_count_mode_default_threshold() {
        let cfg = BinConfig {
            mode: BinMode::Count,
            ..BinConfig::default()
        };
        let spec = BinSpec::build(&cfg, 0).unwrap();
        assert_eq!(spec.mode, SplitMode::Count { value: 10_000 });
        assert!(!spec.is_time_mode());
    }

    #[test]
    fn build_time_mode_without_span_fails() {
        let cfg = BinConfig {
            span: None,
            ..BinConfig::default()
        };
        assert!(BinSpec::build(&cfg, 0).is_err());
    }
}

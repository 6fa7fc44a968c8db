use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Where the pipeline's notion of "now" comes from.
///
/// Live input runs on the wall clock. Replay runs on the record clock: the
/// largest record end time seen so far, so idle and status timeouts fire
/// relative to the data instead of to how fast the reader happens to go.
pub enum PipelineClock {
    Wall,
    Replay { last_record: AtomicI64 },
}

impl PipelineClock {
    pub fn new(replay: bool) -> Self {
        if replay {
            Self::Replay {
                last_record: AtomicI64::new(0),
            }
        } else {
            Self::Wall
        }
    }

    /// Advance the record clock. A no-op on the wall clock, and records
    /// arriving out of order never move the clock backwards.
    pub fn observe_record(&self, end_micros: i64) {
        if let Self::Replay { last_record } = self {
            last_record.fetch_max(end_micros, Ordering::Relaxed);
        }
    }

    pub fn now_micros(&self) -> i64 {
        match self {
            Self::Wall => wall_micros(),
            Self::Replay { last_record } => last_record.load(Ordering::Relaxed),
        }
    }
}

/// Microseconds since the Unix epoch.
pub(crate) fn wall_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as i64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- 1. wall_clock_runs_forward ----------------------------------------

    #[test]
    fn wall_clock_runs_forward() {
        let clock = PipelineClock::new(false);
        let a = clock.now_micros();
        let b = clock.now_micros();
        assert!(a > 0);
        assert!(b >= a);
    }

    // -- 2. wall_clock_ignores_records -------------------------------------

    #[test]
    fn wall_clock_ignores_records() {
        let clock = PipelineClock::new(false);
        clock.observe_record(42);
        assert!(clock.now_micros() > 1_000_000_000);
    }

    // -- 3. replay_clock_follows_high_water --------------------------------

    #[test]
    fn replay_clock_follows_high_water() {
        let clock = PipelineClock::new(true);
        assert_eq!(clock.now_micros(), 0);

        clock.observe_record(5_000_000);
        assert_eq!(clock.now_micros(), 5_000_000);

        // out-of-order record does not rewind
        clock.observe_record(3_000_000);
        assert_eq!(clock.now_micros(), 5_000_000);

        clock.observe_record(9_000_000);
        assert_eq!(clock.now_micros(), 9_000_000);
    }
}

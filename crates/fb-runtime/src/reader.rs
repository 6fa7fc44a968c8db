use std::time::Duration;

use fb_config::InputConfig;
use fb_core::FlowRecord;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Longest single pacing sleep in replay mode. Bounds how long a quiet
/// stretch in the input can stall the read loop, so cancellation stays
/// responsive.
const MAX_PACE: Duration = Duration::from_millis(100);

type BoxedInput = Box<dyn AsyncRead + Send + Unpin>;

// ---------------------------------------------------------------------------
// FlowReader
// ---------------------------------------------------------------------------

/// JSON Lines record source: a file, or stdin when the configured path is
/// `"-"`. In replay mode the reader paces itself by record start times
/// instead of reading flat out.
pub struct FlowReader {
    lines: Lines<BufReader<BoxedInput>>,
    tx: mpsc::Sender<FlowRecord>,
    cancel: CancellationToken,
    pacer: Option<ReplayPacer>,
    parsed: u64,
    skipped: u64,
}

impl FlowReader {
    /// Open the configured input source.
    pub async fn open(
        cfg: &InputConfig,
        tx: mpsc::Sender<FlowRecord>,
        cancel: CancellationToken,
    ) -> anyhow::Result<Self> {
        let input: BoxedInput = if cfg.is_stdin() {
            Box::new(tokio::io::stdin())
        } else {
            let file = tokio::fs::File::open(&cfg.path).await.map_err(|e| {
                anyhow::anyhow!("failed to open input {}: {e}", cfg.path.display())
            })?;
            Box::new(file)
        };

        fb_info!(
            io,
            path = %cfg.path.display(),
            replay = cfg.replay,
            "input source open"
        );

        Ok(Self {
            lines: BufReader::new(input).lines(),
            tx,
            cancel,
            pacer: cfg.replay.then(|| ReplayPacer::new(cfg.rate)),
            parsed: 0,
            skipped: 0,
        })
    }

    /// Read lines until EOF or cancellation, sending parsed records down the
    /// channel. Dropping the sender on return is what tells the ingest side
    /// the stream is over.
    #[tracing::instrument(name = "reader", skip_all)]
    pub async fn run(mut self) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                line = self.lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if !self.handle_line(&line).await {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            fb_warn!(io, error = %e, "input read error, stopping");
                            break;
                        }
                    }
                }
                _ = self.cancel.cancelled() => break,
            }
        }

        fb_info!(
            io,
            records = self.parsed,
            skipped = self.skipped,
            "input source finished"
        );
        Ok(())
    }

    /// Parse and forward one line. Returns `false` when the reader should
    /// stop because the downstream channel is gone or shutdown was requested
    /// mid-pace.
    async fn handle_line(&mut self, line: &str) -> bool {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return true;
        }

        let record: FlowRecord = match serde_json::from_str(trimmed) {
            Ok(record) => record,
            Err(e) => {
                self.skipped += 1;
                fb_warn!(io, error = %e, "skipping malformed record");
                return true;
            }
        };

        if let Some(pacer) = &mut self.pacer
            && let Some(delay) = pacer.delay_for(record.start_micros)
        {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => return false,
            }
        }

        fb_trace!(io, start = record.start_micros, "record parsed");
        self.parsed += 1;

        if self.tx.send(record).await.is_err() {
            fb_warn!(io, "record channel closed, stopping reader");
            return false;
        }
        true
    }
}

// ---------------------------------------------------------------------------
// ReplayPacer
// ---------------------------------------------------------------------------

/// Reproduces the recorded inter-record timing, scaled by the replay rate.
struct ReplayPacer {
    rate: f64,
    prev_start: Option<i64>,
}

impl ReplayPacer {
    fn new(rate: f64) -> Self {
        Self {
            rate,
            prev_start: None,
        }
    }

    /// How long to sleep before forwarding a record that starts at
    /// `start_micros`. The first record and records that do not advance the
    /// timeline go out immediately; everything else waits for the recorded
    /// gap divided by the rate, capped at [`MAX_PACE`].
    fn delay_for(&mut self, start_micros: i64) -> Option<Duration> {
        let prev = self.prev_start.replace(start_micros)?;
        let gap = start_micros.saturating_sub(prev);
        if gap <= 0 {
            return None;
        }
        let scaled = (gap as f64 / self.rate).round() as u64;
        Some(Duration::from_micros(scaled).min(MAX_PACE))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

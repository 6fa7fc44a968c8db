use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::clock::PipelineClock;
use crate::ingest_task::SharedPipeline;

/// Run the pipeline's timeout pass periodically until cancelled.
///
/// Each pass evicts bins that have aged out of the hold window and sweeps
/// the global aggregator's idle and status timers.
#[tracing::instrument(name = "ticker", skip_all)]
pub(crate) async fn run_ticker(
    pipeline: SharedPipeline,
    clock: Arc<PipelineClock>,
    interval: Duration,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let mut tick = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = tick.tick() => {
                let now = clock.now_micros();
                let report = pipeline
                    .lock()
                    .expect("pipeline lock poisoned")
                    .tick(now)
                    .map_err(|e| anyhow::anyhow!("{e}"))?;
                if report.bins_evicted > 0 || report.records_emitted > 0 {
                    fb_debug!(bin,
                        evicted = report.bins_evicted,
                        emitted = report.records_emitted,
                        zero_filled = report.gaps_zero_filled,
                        idle_closed = report.idle_closed,
                        status_flushed = report.status_flushed,
                        "timer pass"
                    );
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
    Ok(())
}

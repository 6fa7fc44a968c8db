use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use fb_core::{FlowRecord, Pipeline};

use crate::clock::PipelineClock;

/// Pipeline handle shared between the ingest and timer tasks.
///
/// A plain std mutex: both tasks take it only for short synchronous calls
/// and never hold it across an await point.
pub(crate) type SharedPipeline = Arc<Mutex<Pipeline>>;

/// Consume flow records from the reader channel and feed the pipeline.
///
/// Shutdown is driven by channel close: the reader drops its sender on EOF
/// or cancellation, `rx.recv()` returns `None`, and this task exits after
/// logging the ingest totals. A pipeline error is fatal and tears the
/// engine down.
#[tracing::instrument(name = "ingest", skip_all)]
pub(crate) async fn run_ingest(
    mut rx: mpsc::Receiver<FlowRecord>,
    pipeline: SharedPipeline,
    clock: Arc<PipelineClock>,
) -> anyhow::Result<()> {
    while let Some(record) = rx.recv().await {
        clock.observe_record(record.end_micros);
        let now = clock.now_micros();
        pipeline
            .lock()
            .expect("pipeline lock poisoned")
            .ingest(record, now)
            .map_err(|e| anyhow::anyhow!("{e}"))?;
    }

    let stats = pipeline.lock().expect("pipeline lock poisoned").stats();
    fb_info!(
        agg,
        admitted = stats.admitted,
        pieces = stats.pieces,
        dropped = stats.dropped,
        stale = stats.stale,
        unkeyed = stats.unkeyed,
        invalid = stats.invalid,
        "record channel drained"
    );
    Ok(())
}

use std::sync::Arc;
use std::time::Duration;

use orion_error::ErrorOwe;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use fb_config::FlowbinConfig;
use fb_core::FlowRecord;

use crate::clock::PipelineClock;
use crate::error::RuntimeResult;
use crate::ingest_task::{self, SharedPipeline};
use crate::reader::FlowReader;
use crate::tick_task;

use super::types::TaskGroup;

// ---------------------------------------------------------------------------
// Task spawn helpers — one per task group, in start order
// ---------------------------------------------------------------------------

/// Spawn the periodic timeout task.
pub(super) fn spawn_tick_task(
    pipeline: &SharedPipeline,
    clock: &Arc<PipelineClock>,
    interval: Duration,
    cancel: CancellationToken,
) -> TaskGroup {
    let pipeline = Arc::clone(pipeline);
    let clock = Arc::clone(clock);
    let mut group = TaskGroup::new("ticker");
    group.push(tokio::spawn(async move {
        tick_task::run_ticker(pipeline, clock, interval, cancel).await
    }));
    group
}

/// Spawn the ingest task on the consuming end of the record channel.
pub(super) fn spawn_ingest_task(
    rx: mpsc::Receiver<FlowRecord>,
    pipeline: &SharedPipeline,
    clock: &Arc<PipelineClock>,
) -> TaskGroup {
    let pipeline = Arc::clone(pipeline);
    let clock = Arc::clone(clock);
    let mut group = TaskGroup::new("ingest");
    group.push(tokio::spawn(async move {
        ingest_task::run_ingest(rx, pipeline, clock).await
    }));
    group
}

/// Open the input source and spawn the reader task.
pub(super) async fn spawn_reader_task(
    config: &FlowbinConfig,
    tx: mpsc::Sender<FlowRecord>,
    cancel: CancellationToken,
) -> RuntimeResult<TaskGroup> {
    let reader = FlowReader::open(&config.input, tx, cancel).await.owe_sys()?;
    let mut group = TaskGroup::new("reader");
    group.push(tokio::spawn(async move { reader.run().await }));
    Ok(group)
}

mod signal;
mod spawn;
mod types;

use std::sync::{Arc, Mutex};

use orion_error::op_context;
use orion_error::prelude::*;
use orion_error::ErrorOweBase;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use fb_config::FlowbinConfig;
use fb_core::{Pipeline, build_sink};

use crate::clock::{self, PipelineClock};
use crate::error::{RuntimeReason, RuntimeResult};
use crate::ingest_task::SharedPipeline;

// Re-export public API
pub use signal::wait_for_signal;

use spawn::{spawn_ingest_task, spawn_reader_task, spawn_tick_task};
use types::TaskGroup;

// ---------------------------------------------------------------------------
// Engine — the top-level lifecycle handle
// ---------------------------------------------------------------------------

/// Manages the full lifecycle of the binning runtime: bootstrap, run, and
/// graceful shutdown.
///
/// Task groups are stored in start order and joined in reverse (LIFO)
/// during [`wait`](Self::wait), ensuring correct drain sequencing: the
/// reader stops first, the ingest task drains the record channel, the
/// timers stop, and finally everything still resident in the pipeline is
/// flushed to the sink.
pub struct Engine {
    cancel: CancellationToken,
    /// Separate cancel token for the timer task — triggered only after the
    /// ingest task has drained the record channel, so the last timer pass
    /// never races a live merge.
    tick_cancel: CancellationToken,
    groups: Vec<TaskGroup>,
    pipeline: SharedPipeline,
}

impl Engine {
    /// Bootstrap the entire runtime from a [`FlowbinConfig`].
    #[tracing::instrument(name = "engine.start", skip_all, fields(input = %config.input.path.display()))]
    pub async fn start(config: FlowbinConfig) -> RuntimeResult<Self> {
        let mut op = op_context!("engine-bootstrap").with_auto_log();
        op.record("input", config.input.path.display().to_string().as_str());
        op.record("output", config.output.path.display().to_string().as_str());

        let cancel = CancellationToken::new();
        let tick_cancel = CancellationToken::new();

        // Phase 1: build the sink and the pipeline it feeds
        let sink = build_sink(&config.output).owe(RuntimeReason::Bootstrap)?;
        let pipeline = Pipeline::new(&config, sink, clock::wall_micros()).err_conv()?;
        let pipeline: SharedPipeline = Arc::new(Mutex::new(pipeline));
        let clock = Arc::new(PipelineClock::new(config.input.replay));

        fb_info!(
            sys,
            mode = ?config.bin.mode,
            replay = config.input.replay,
            policies = config.aggregator.policies.len(),
            "engine bootstrap complete"
        );

        // Phase 2: spawn task groups (start order: ticker → ingest → reader)
        let (record_tx, record_rx) = mpsc::channel(config.runtime.channel_capacity);

        let mut groups: Vec<TaskGroup> = Vec::with_capacity(3);
        groups.push(spawn_tick_task(
            &pipeline,
            &clock,
            config.runtime.tick_interval.as_duration(),
            tick_cancel.child_token(),
        ));
        groups.push(spawn_ingest_task(record_rx, &pipeline, &clock));
        groups.push(spawn_reader_task(&config, record_tx, cancel.child_token()).await?);

        op.mark_suc();
        Ok(Self {
            cancel,
            tick_cancel,
            groups,
            pipeline,
        })
    }

    /// Request graceful shutdown of all tasks.
    pub fn shutdown(&self) {
        fb_info!(sys, "initiating graceful shutdown");
        self.cancel.cancel();
    }

    /// Wait for all task groups to complete, then run the final drain.
    ///
    /// Groups are joined in LIFO order (reverse of start order):
    /// reader → ingest → ticker.
    ///
    /// Two-phase shutdown: the reader is joined first and drops its sender,
    /// the ingest task drains whatever is still in the channel, and only
    /// then is the timer task cancelled. The final drain below therefore
    /// sees a quiescent pipeline.
    pub async fn wait(mut self) -> RuntimeResult<()> {
        while let Some(group) = self.groups.pop() {
            let name = group.name;
            fb_debug!(sys, task_group = name, "waiting for task group to finish");
            group.wait().await?;
            fb_debug!(sys, task_group = name, "task group finished");

            if name == "ingest" {
                // every record is in the pipeline now, stop the timers
                self.tick_cancel.cancel();
            }
        }

        let report = {
            let mut guard = self.pipeline.lock().expect("pipeline lock poisoned");
            guard.shutdown().err_conv()?
        };
        let stats = self.pipeline.lock().expect("pipeline lock poisoned").stats();
        fb_info!(
            sys,
            bins = report.bins_evicted,
            records = report.records_emitted,
            total_emitted = stats.emitted,
            "final drain complete"
        );
        Ok(())
    }

    /// Returns a clone of the root cancellation token (for signal integration).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

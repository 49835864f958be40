//! Owns the background workers and shuts them down in order.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::CoreResult;
use crate::jobs::failure::format_failure;
use crate::jobs::JobStore;
use crate::scheduler::Scheduler;
use crate::workers::{PoolHandle, WorkerPool};

pub struct Supervisor {
    stop: CancellationToken,
    scheduler: JoinHandle<()>,
    pool: PoolHandle,
}

impl Supervisor {
    /// Fail units a previous process left `in_progress` so they can be
    /// retried, then start the scheduler and the worker pool.
    pub async fn start(jobs: Arc<dyn JobStore>, pool: WorkerPool, scheduler: Scheduler) -> CoreResult<Self> {
        let message = format_failure("internal", "interrupted before completion");
        let interrupted = jobs.fail_interrupted(&message).await?;
        if !interrupted.is_empty() {
            tracing::warn!(count = interrupted.len(), "Marked interrupted jobs as failed");
        }

        let stop = CancellationToken::new();
        let scheduler = tokio::spawn(scheduler.run(stop.child_token()));
        let pool = pool.start();
        Ok(Self {
            stop,
            scheduler,
            pool,
        })
    }

    /// Stop the scheduler, stop claiming, and give in-flight units what is
    /// left of `deadline` before cancelling them. Both stages share the one
    /// budget. Returns whether all units finished.
    pub async fn shutdown(self, deadline: Duration) -> bool {
        tracing::info!(deadline_ms = deadline.as_millis() as u64, "Shutting down workers");
        let end = Instant::now() + deadline;
        self.stop.cancel();
        self.pool.stop_claiming();
        if tokio::time::timeout_at(end, self.scheduler).await.is_err() {
            tracing::warn!("Scheduler did not stop within the deadline");
        }
        let drained = self
            .pool
            .shutdown(end.saturating_duration_since(Instant::now()))
            .await;
        tracing::info!(drained, "Workers stopped");
        drained
    }
}

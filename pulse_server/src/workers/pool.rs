//! Claim loops, one per job type, running units under timeouts.
//!
//! Each loop claims up to its free capacity on every tick or wake, runs each
//! job in its own task and records the outcome. Units that overrun the soft
//! timeout are cancelled; units still running at twice the soft timeout are
//! aborted. Panics are caught at the task boundary and recorded as failures.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::WorkUnit;
use crate::error::{CoreError, CoreResult};
use crate::jobs::failure::{failure_message, panic_message};
use crate::jobs::JobStore;
use crate::models::job::{Job, JobStatus, JobType};

/// How long cancelled units get to record their failure before the pool
/// stops waiting.
const CANCEL_GRACE: Duration = Duration::from_millis(250);

/// Concurrent units per job type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerLimits {
    pub clone: usize,
    pub commit: usize,
    pub pull_request: usize,
    pub stats: usize,
}

impl WorkerLimits {
    pub fn for_type(&self, job_type: JobType) -> usize {
        match job_type {
            JobType::Clone => self.clone,
            JobType::Commit => self.commit,
            JobType::PullRequest => self.pull_request,
            JobType::Stats => self.stats,
        }
    }
}

impl Default for WorkerLimits {
    fn default() -> Self {
        Self {
            clone: 2,
            commit: 4,
            pull_request: 2,
            stats: 4,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub limits: WorkerLimits,
    pub tick: Duration,
    /// Soft per-job timeout; the hard limit is twice this.
    pub job_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            limits: WorkerLimits::default(),
            tick: Duration::from_secs(2),
            job_timeout: Duration::from_secs(30 * 60),
        }
    }
}

pub struct WorkerPool {
    jobs: Arc<dyn JobStore>,
    units: Vec<Arc<dyn WorkUnit>>,
    config: PoolConfig,
    wake: Arc<Notify>,
}

impl WorkerPool {
    /// `wake` is shared with whoever enqueues jobs.
    pub fn new(
        jobs: Arc<dyn JobStore>,
        units: Vec<Arc<dyn WorkUnit>>,
        config: PoolConfig,
        wake: Arc<Notify>,
    ) -> Self {
        Self {
            jobs,
            units,
            config,
            wake,
        }
    }

    pub fn start(self) -> PoolHandle {
        let stop = CancellationToken::new();
        let cancel = CancellationToken::new();
        let mut loops = JoinSet::new();
        for unit in self.units {
            let job_type = unit.job_type();
            let claim_loop = ClaimLoop {
                jobs: self.jobs.clone(),
                unit,
                capacity: self.config.limits.for_type(job_type),
                tick: self.config.tick,
                job_timeout: self.config.job_timeout,
                wake: self.wake.clone(),
            };
            loops.spawn(claim_loop.run(stop.clone(), cancel.clone()));
        }
        tracing::info!(
            limits = ?self.config.limits,
            tick_ms = self.config.tick.as_millis() as u64,
            job_timeout_secs = self.config.job_timeout.as_secs(),
            "Worker pool started"
        );
        PoolHandle {
            stop,
            cancel,
            loops,
        }
    }
}

/// Owned by the supervisor.
pub struct PoolHandle {
    stop: CancellationToken,
    cancel: CancellationToken,
    loops: JoinSet<()>,
}

impl PoolHandle {
    pub fn stop_claiming(&self) {
        self.stop.cancel();
    }

    /// Stop claiming and wait up to `deadline` for in-flight units, then
    /// cancel whatever is left. Returns whether everything finished in time.
    pub async fn shutdown(mut self, deadline: Duration) -> bool {
        self.stop.cancel();
        let drained = tokio::time::timeout(deadline, join_all(&mut self.loops))
            .await
            .is_ok();
        if !drained {
            tracing::warn!(
                deadline_ms = deadline.as_millis() as u64,
                "Units still running at shutdown deadline, cancelling"
            );
            self.cancel.cancel();
            if tokio::time::timeout(CANCEL_GRACE * 2, join_all(&mut self.loops))
                .await
                .is_err()
            {
                self.loops.abort_all();
            }
        }
        drained
    }
}

async fn join_all(set: &mut JoinSet<()>) {
    while set.join_next().await.is_some() {}
}

struct ClaimLoop {
    jobs: Arc<dyn JobStore>,
    unit: Arc<dyn WorkUnit>,
    capacity: usize,
    tick: Duration,
    job_timeout: Duration,
    wake: Arc<Notify>,
}

impl ClaimLoop {
    async fn run(self, stop: CancellationToken, cancel: CancellationToken) {
        let job_type = self.unit.job_type();
        let mut running: JoinSet<()> = JoinSet::new();
        tracing::debug!(job_type = %job_type, capacity = self.capacity, "Claim loop started");

        loop {
            while running.try_join_next().is_some() {}

            let free = self.capacity.saturating_sub(running.len());
            if free > 0 && !stop.is_cancelled() {
                match self.jobs.claim_next(job_type, free).await {
                    Ok(claimed) => {
                        for job in claimed {
                            running.spawn(execute(
                                self.jobs.clone(),
                                self.unit.clone(),
                                job,
                                self.job_timeout,
                                cancel.child_token(),
                                self.wake.clone(),
                            ));
                        }
                    }
                    Err(e) => tracing::error!(job_type = %job_type, "Job claim failed: {e}"),
                }
            }
            crate::metrics::workers_in_flight(job_type, running.len());

            tokio::select! {
                _ = stop.cancelled() => break,
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(self.tick) => {}
                Some(_) = running.join_next(), if !running.is_empty() => {}
            }
        }

        if !running.is_empty() {
            tracing::info!(job_type = %job_type, in_flight = running.len(), "Waiting for in-flight units");
        }
        tokio::select! {
            _ = join_all(&mut running) => {}
            _ = cancel.cancelled() => {
                let _ = tokio::time::timeout(CANCEL_GRACE, join_all(&mut running)).await;
            }
        }
        crate::metrics::workers_in_flight(job_type, 0);
        tracing::debug!(job_type = %job_type, "Claim loop stopped");
    }
}

/// Run one claimed job and record its outcome.
async fn execute(
    jobs: Arc<dyn JobStore>,
    unit: Arc<dyn WorkUnit>,
    job: Job,
    soft_timeout: Duration,
    cancel: CancellationToken,
    wake: Arc<Notify>,
) {
    let started = Instant::now();
    crate::metrics::job_status_changed(job.job_type, JobStatus::InProgress);
    tracing::info!(
        job_id = %job.id,
        job_type = %job.job_type,
        project_id = %job.project_id,
        attempt = job.attempt,
        "Job started"
    );

    let outcome = run_guarded(unit, &job, soft_timeout, &cancel).await;
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    crate::metrics::job_duration(job.job_type, elapsed_ms);

    match outcome {
        Ok(()) => match jobs.complete(job.id).await {
            Ok(()) => {
                crate::metrics::job_status_changed(job.job_type, JobStatus::Completed);
                tracing::info!(job_id = %job.id, job_type = %job.job_type, elapsed_ms, "Job completed");
                // Dependents may now be claimable.
                wake.notify_waiters();
            }
            Err(e) => tracing::error!(job_id = %job.id, "Failed to record completion: {e}"),
        },
        Err(err) => {
            let message = failure_message(&err);
            match jobs.fail(job.id, &message).await {
                Ok(()) => {
                    crate::metrics::job_status_changed(job.job_type, JobStatus::Failed);
                    tracing::warn!(
                        job_id = %job.id,
                        job_type = %job.job_type,
                        code = err.code(),
                        elapsed_ms,
                        "Job failed: {message}"
                    );
                }
                Err(e) => tracing::error!(job_id = %job.id, "Failed to record failure ({message}): {e}"),
            }
        }
    }
}

async fn run_guarded(
    unit: Arc<dyn WorkUnit>,
    job: &Job,
    soft_timeout: Duration,
    cancel: &CancellationToken,
) -> CoreResult<()> {
    let mut task = {
        let job = job.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { unit.run(&job, &cancel).await })
    };

    let joined = tokio::select! {
        joined = &mut task => joined,
        _ = tokio::time::sleep(soft_timeout) => {
            tracing::warn!(
                job_id = %job.id,
                timeout_secs = soft_timeout.as_secs(),
                "Job exceeded its soft timeout, cancelling"
            );
            cancel.cancel();
            let exceeded = CoreError::TransientIo(format!(
                "job exceeded its timeout of {}s",
                soft_timeout.as_secs()
            ));
            return match tokio::time::timeout(soft_timeout, &mut task).await {
                Ok(Ok(Ok(()))) => Ok(()),
                Ok(_) => Err(exceeded),
                Err(_) => {
                    task.abort();
                    Err(CoreError::TransientIo(format!(
                        "job aborted after {}s",
                        (soft_timeout * 2).as_secs()
                    )))
                }
            };
        }
    };

    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(CoreError::internal(format!(
            "unit panicked: {}",
            panic_message(e.into_panic().as_ref())
        ))),
        Err(e) => Err(CoreError::internal(format!("unit did not finish: {e}"))),
    }
}

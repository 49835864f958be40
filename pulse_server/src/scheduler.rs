//! Hourly auto-update: enqueue update chains for projects due this hour.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta, TimeZone, Timelike, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, CoreResult};
use crate::jobs::JobService;
use crate::store::Store;

pub struct Scheduler {
    store: Arc<dyn Store>,
    jobs: JobService,
    tick: Duration,
}

impl Scheduler {
    pub fn new(store: Arc<dyn Store>, jobs: JobService, tick: Duration) -> Self {
        Self { store, jobs, tick }
    }

    /// Tick until `stop` fires.
    pub async fn run(self, stop: CancellationToken) {
        tracing::info!(tick_secs = self.tick.as_secs(), "Scheduler started");
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(self.tick) => {}
            }
            if let Err(e) = self.tick_at(Local::now()).await {
                tracing::error!("Scheduler tick failed: {e}");
            }
        }
        tracing::info!("Scheduler stopped");
    }

    /// Enqueue chains for projects whose update hour is `now`'s wall-clock
    /// hour in `now`'s time zone. Returns the number of jobs enqueued.
    pub async fn tick_at<Tz: TimeZone>(&self, now: DateTime<Tz>) -> CoreResult<usize> {
        let hour = now.hour();
        let hour_start = now
            .with_minute(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .ok_or_else(|| CoreError::internal(format!("no hour start for {now:?}")))?
            .with_timezone(&Utc);
        let now = now.with_timezone(&Utc);
        let since = now - TimeDelta::hours(1);
        let due = self.store.due_projects(hour as i32).await?;

        let mut enqueued = 0;
        for settings in due {
            let project_id = settings.project_id;
            if self.jobs.job_store().has_active_jobs(project_id, since).await? {
                tracing::debug!(project_id = %project_id, "Update still in flight, skipping");
                continue;
            }
            if !self.store.claim_update_slot(project_id, hour_start, now).await? {
                tracing::debug!(project_id = %project_id, "Already triggered this hour");
                continue;
            }
            match self.jobs.enqueue_update_all(project_id).await {
                Ok(jobs) => {
                    tracing::info!(project_id = %project_id, jobs = jobs.len(), "Scheduled update enqueued");
                    enqueued += jobs.len();
                }
                Err(e) => tracing::error!(project_id = %project_id, "Scheduled update failed: {e}"),
            }
        }
        if enqueued > 0 {
            crate::metrics::scheduler_enqueued(enqueued);
        }
        Ok(enqueued)
    }
}

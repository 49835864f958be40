//! `stats`: rebuild a repository's per-person daily statistics.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{cancelled, WorkUnit, WorkerContext};
use crate::error::{CoreError, CoreResult};
use crate::identity::MergeGraph;
use crate::models::job::{Job, JobType};
use crate::stats::{compute, StatsInput};

pub struct StatsUnit {
    ctx: Arc<WorkerContext>,
}

impl StatsUnit {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl WorkUnit for StatsUnit {
    fn job_type(&self) -> JobType {
        JobType::Stats
    }

    async fn run(&self, job: &Job, cancel: &CancellationToken) -> CoreResult<()> {
        let store = &self.ctx.store;
        let project_id = job.project_id;
        let target = self.ctx.target(job).await?;
        if !store.has_bindings(project_id).await? {
            return Err(CoreError::NoIdentities);
        }

        let upstream_id = target.github_repository.id;
        let filters = store.project_filters(project_id).await?;
        let merges = MergeGraph::from_merges(&store.merges(project_id).await?);
        let bindings = store.bindings(project_id).await?;
        let commits = store.commits_with_files(upstream_id).await?;
        let pull_requests = store.pull_requests(upstream_id).await?;
        let reviews = store.reviews(upstream_id).await?;

        let rows = compute(&StatsInput {
            commits: &commits,
            pull_requests: &pull_requests,
            reviews: &reviews,
            merges: &merges,
            bindings: &bindings,
            filters: &filters,
        });

        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        let row_count = rows.len();
        store
            .replace_repository_stats(project_id, target.project_repository.id, rows)
            .await?;
        tracing::info!(
            job_id = %job.id,
            project_id = %project_id,
            repository = %target.github_repository.full_name,
            commits = commits.len(),
            rows = row_count,
            "Statistics rebuilt"
        );
        Ok(())
    }
}

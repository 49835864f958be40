//! `commit`: ingest commits reachable from the tracked branch.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{cancelled, WorkUnit, WorkerContext};
use crate::error::{CoreError, CoreResult};
use crate::git::workspace_path;
use crate::models::job::{Job, JobType};
use crate::retry::retry_with_backoff;

pub struct CommitUnit {
    ctx: Arc<WorkerContext>,
}

impl CommitUnit {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl WorkUnit for CommitUnit {
    fn job_type(&self) -> JobType {
        JobType::Commit
    }

    async fn run(&self, job: &Job, cancel: &CancellationToken) -> CoreResult<()> {
        let ctx = &self.ctx;
        let target = ctx.target(job).await?;
        let path = workspace_path(&ctx.workspace, &target.github_repository.full_name)?;
        let _guard = ctx.lock(target.github_repository.github_repo_id, cancel).await?;

        // Re-read under the lock: another project's ingest may have advanced it.
        let upstream = ctx
            .store
            .repository_target(target.project_repository.id)
            .await?
            .github_repository;
        if !upstream.is_cloned {
            return Err(CoreError::PermanentIo(format!(
                "{} has no working copy",
                upstream.full_name
            )));
        }

        let branch = &upstream.default_branch;
        let Some(head) = ctx.git.head(&path, branch).await? else {
            tracing::info!(job_id = %job.id, repository = %upstream.full_name, "Empty repository, nothing to ingest");
            return Ok(());
        };
        if upstream.ingested_sha.as_deref() == Some(head.as_str()) {
            tracing::info!(job_id = %job.id, repository = %upstream.full_name, "Already up to date");
            return Ok(());
        }

        let walked = retry_with_backoff(ctx.retry, cancel, "git_log", || {
            ctx.git.walk_commits(&path, branch, upstream.ingested_sha.as_deref())
        })
        .await
        .map_err(CoreError::from)?;

        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        let inserted = ctx.store.insert_commits(upstream.id, &walked).await?;
        ctx.store.set_ingested_sha(upstream.id, &head).await?;
        tracing::info!(
            job_id = %job.id,
            repository = %upstream.full_name,
            walked = walked.len(),
            inserted,
            head = %head,
            "Commits ingested"
        );
        Ok(())
    }
}

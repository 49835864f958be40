//! `clone`: make sure the upstream has a current working copy.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{WorkUnit, WorkerContext};
use crate::error::{CoreError, CoreResult};
use crate::git::workspace_path;
use crate::models::job::{Job, JobType};
use crate::retry::retry_with_backoff;

pub struct CloneUnit {
    ctx: Arc<WorkerContext>,
}

impl CloneUnit {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl WorkUnit for CloneUnit {
    fn job_type(&self) -> JobType {
        JobType::Clone
    }

    async fn run(&self, job: &Job, cancel: &CancellationToken) -> CoreResult<()> {
        let ctx = &self.ctx;
        let upstream = ctx.target(job).await?.github_repository;
        let path = workspace_path(&ctx.workspace, &upstream.full_name)?;
        let _guard = ctx.lock(upstream.github_repo_id, cancel).await?;

        let cloned = retry_with_backoff(ctx.retry, cancel, "git_clone", || {
            ctx.git.clone_or_open(&upstream.clone_url, &path, &ctx.token)
        })
        .await
        .map_err(CoreError::from)?;

        // An existing copy may belong to another project; bring it up to date.
        if !cloned {
            retry_with_backoff(ctx.retry, cancel, "git_fetch", || {
                ctx.git.fetch(&path, &upstream.clone_url, &ctx.token)
            })
            .await
            .map_err(CoreError::from)?;
        }

        let head = ctx.git.head(&path, &upstream.default_branch).await?;
        ctx.store.mark_cloned(upstream.id, head.as_deref()).await?;
        tracing::info!(
            job_id = %job.id,
            repository = %upstream.full_name,
            fresh = cloned,
            head = head.as_deref().unwrap_or("-"),
            "Working copy ready"
        );
        Ok(())
    }
}

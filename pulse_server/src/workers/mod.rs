//! Worker units for each job type and the pool that runs them.

pub mod clone;
pub mod commit;
pub mod locks;
pub mod pool;
pub mod pull_request;
pub mod stats;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;

pub use locks::RepoLocks;
pub use pool::{PoolConfig, PoolHandle, WorkerLimits, WorkerPool};

use crate::error::{CoreError, CoreResult};
use crate::git::Git;
use crate::github::GithubApi;
use crate::models::job::{Job, JobType};
use crate::models::project::RepositoryTarget;
use crate::retry::RetryConfig;
use crate::store::Store;

/// Runs one claimed job to completion. Errors become the job's failure.
#[async_trait]
pub trait WorkUnit: Send + Sync {
    fn job_type(&self) -> JobType;

    /// `cancel` fires on soft timeout or shutdown; units stop at the next
    /// suspension point and must not commit partial writes.
    async fn run(&self, job: &Job, cancel: &CancellationToken) -> CoreResult<()>;
}

/// Collaborators shared by every unit.
pub struct WorkerContext {
    pub store: Arc<dyn Store>,
    pub github: Arc<dyn GithubApi>,
    pub git: Arc<dyn Git>,
    pub locks: RepoLocks,
    pub workspace: PathBuf,
    /// Service token for clones and API calls.
    pub token: String,
    pub retry: RetryConfig,
}

impl WorkerContext {
    async fn target(&self, job: &Job) -> CoreResult<RepositoryTarget> {
        let id = job.project_repository_id.ok_or_else(|| {
            CoreError::InvalidInput(format!("{} job {} has no repository", job.job_type, job.id))
        })?;
        self.store.repository_target(id).await
    }

    async fn lock(&self, github_repo_id: i64, cancel: &CancellationToken) -> CoreResult<OwnedMutexGuard<()>> {
        tokio::select! {
            guard = self.locks.lock(github_repo_id) => Ok(guard),
            _ = cancel.cancelled() => Err(cancelled()),
        }
    }
}

fn cancelled() -> CoreError {
    CoreError::TransientIo("cancelled".to_string())
}

/// One unit per job type, in chain order.
pub fn units(ctx: Arc<WorkerContext>) -> Vec<Arc<dyn WorkUnit>> {
    vec![
        Arc::new(clone::CloneUnit::new(ctx.clone())),
        Arc::new(commit::CommitUnit::new(ctx.clone())),
        Arc::new(pull_request::PullRequestUnit::new(ctx.clone())),
        Arc::new(stats::StatsUnit::new(ctx)),
    ]
}

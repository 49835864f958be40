//! Operator-facing job operations: enqueue chains and retry failures.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Notify;
use uuid::Uuid;

use super::store::JobStore;
use crate::error::{CoreError, CoreResult};
use crate::models::job::{Job, JobStatus, JobType, NewJob};
use crate::models::project::RepositoryTarget;
use crate::store::Store;

#[derive(Clone)]
pub struct JobService {
    jobs: Arc<dyn JobStore>,
    store: Arc<dyn Store>,
    wake: Arc<Notify>,
}

impl JobService {
    /// `wake` is notified whenever new work becomes claimable.
    pub fn new(jobs: Arc<dyn JobStore>, store: Arc<dyn Store>, wake: Arc<Notify>) -> Self {
        Self { jobs, store, wake }
    }

    pub fn job_store(&self) -> &Arc<dyn JobStore> {
        &self.jobs
    }

    /// `clone`, then `commit` depending on it.
    pub async fn enqueue_clone(&self, project_id: Uuid, project_repository_id: Uuid) -> CoreResult<Vec<Job>> {
        self.target_in_project(project_id, project_repository_id).await?;
        self.insert_chain(
            project_id,
            Some(project_repository_id),
            &[JobType::Clone, JobType::Commit],
            None,
        )
        .await
    }

    pub async fn enqueue_fetch_github(&self, project_id: Uuid, project_repository_id: Uuid) -> CoreResult<Job> {
        self.target_in_project(project_id, project_repository_id).await?;
        let mut jobs = self
            .insert_chain(project_id, Some(project_repository_id), &[JobType::PullRequest], None)
            .await?;
        jobs.pop()
            .ok_or_else(|| CoreError::internal("pull request job was not created"))
    }

    /// Rejected with `no_identities` until the project has an association.
    pub async fn enqueue_analyze(&self, project_id: Uuid, project_repository_id: Uuid) -> CoreResult<Job> {
        self.target_in_project(project_id, project_repository_id).await?;
        if !self.store.has_bindings(project_id).await? {
            return Err(CoreError::NoIdentities);
        }
        let mut jobs = self
            .insert_chain(project_id, Some(project_repository_id), &[JobType::Stats], None)
            .await?;
        jobs.pop()
            .ok_or_else(|| CoreError::internal("stats job was not created"))
    }

    /// One full chain per tracked repository.
    pub async fn enqueue_update_all(&self, project_id: Uuid) -> CoreResult<Vec<Job>> {
        self.store.get_project(project_id).await?;
        let targets = self.store.project_targets(project_id).await?;

        let now = Utc::now();
        let mut jobs = Vec::new();
        for target in targets.iter().filter(|t| t.project_repository.is_tracked) {
            jobs.extend(chain(
                project_id,
                Some(target.project_repository.id),
                &JobType::CHAIN,
                None,
                now,
            ));
        }
        if jobs.is_empty() {
            tracing::info!(project_id = %project_id, "No tracked repositories to update");
            return Ok(jobs);
        }

        self.jobs.insert(&jobs).await?;
        self.wake.notify_waiters();
        tracing::info!(
            project_id = %project_id,
            repositories = jobs.len() / JobType::CHAIN.len(),
            "Update chains enqueued"
        );
        Ok(jobs)
    }

    /// Replace a failed job. The replacement keeps the target, type and
    /// parent; the failed job's pending dependents are re-created behind it.
    /// The original rows stay for audit and their dependents stay blocked.
    pub async fn retry_job(&self, job_id: Uuid) -> CoreResult<Vec<Job>> {
        let failed = self.jobs.get(job_id).await?;
        if failed.status != JobStatus::Failed {
            return Err(CoreError::not_failed(format!(
                "job {job_id} is {}, only failed jobs can be retried",
                failed.status
            )));
        }
        if let Some(existing) = self.jobs.retry_of(job_id).await? {
            return Err(CoreError::conflict(format!(
                "job {job_id} was already retried as {}",
                existing.id
            )));
        }

        let now = Utc::now();
        let replacement = NewJob {
            project_id: failed.project_id,
            project_repository_id: failed.project_repository_id,
            job_type: failed.job_type,
            depends_on: failed.depends_on,
            attempt: failed.attempt + 1,
            retry_of: Some(failed.id),
        }
        .into_job(now);

        let mut remap = HashMap::from([(failed.id, replacement.id)]);
        let mut created = vec![replacement];
        let mut queue = VecDeque::from([failed.id]);
        while let Some(parent) = queue.pop_front() {
            for dependent in self.jobs.dependents_of(parent).await? {
                if dependent.status != JobStatus::Pending {
                    continue;
                }
                let Some(&new_parent) = remap.get(&parent) else {
                    continue;
                };
                let copy = NewJob {
                    project_id: dependent.project_id,
                    project_repository_id: dependent.project_repository_id,
                    job_type: dependent.job_type,
                    depends_on: Some(new_parent),
                    attempt: 1,
                    retry_of: None,
                }
                .into_job(now);
                remap.insert(dependent.id, copy.id);
                queue.push_back(dependent.id);
                created.push(copy);
            }
        }

        // The store allows one replacement per job; a concurrent retry loses here.
        if let Err(e) = self.jobs.insert(&created).await {
            return Err(match e {
                CoreError::Conflict { .. } => {
                    CoreError::conflict(format!("job {job_id} was already retried"))
                }
                other => other,
            });
        }
        self.wake.notify_waiters();
        tracing::info!(
            job_id = %job_id,
            replacement_id = %created[0].id,
            attempt = created[0].attempt,
            recreated_dependents = created.len() - 1,
            "Job retried"
        );
        Ok(created)
    }

    pub async fn jobs_for_project(&self, project_id: Uuid) -> CoreResult<Vec<Job>> {
        self.jobs.by_project(project_id).await
    }

    pub async fn jobs_for_repository(&self, project_repository_id: Uuid) -> CoreResult<Vec<Job>> {
        self.jobs.by_repository(project_repository_id).await
    }

    async fn target_in_project(
        &self,
        project_id: Uuid,
        project_repository_id: Uuid,
    ) -> CoreResult<RepositoryTarget> {
        let target = self.store.repository_target(project_repository_id).await?;
        if target.project_repository.project_id != project_id {
            return Err(CoreError::not_found(format!(
                "repository {project_repository_id} is not part of project {project_id}"
            )));
        }
        Ok(target)
    }

    async fn insert_chain(
        &self,
        project_id: Uuid,
        project_repository_id: Option<Uuid>,
        types: &[JobType],
        parent: Option<Uuid>,
    ) -> CoreResult<Vec<Job>> {
        let jobs = chain(project_id, project_repository_id, types, parent, Utc::now());
        self.jobs.insert(&jobs).await?;
        self.wake.notify_waiters();
        for job in &jobs {
            tracing::info!(
                job_id = %job.id,
                job_type = %job.job_type,
                project_id = %project_id,
                depends_on = ?job.depends_on,
                "Job enqueued"
            );
        }
        Ok(jobs)
    }
}

/// Jobs of `types`, each depending on the one before it.
fn chain(
    project_id: Uuid,
    project_repository_id: Option<Uuid>,
    types: &[JobType],
    parent: Option<Uuid>,
    now: chrono::DateTime<Utc>,
) -> Vec<Job> {
    let mut previous = parent;
    types
        .iter()
        .map(|&job_type| {
            let job = NewJob::new(project_id, project_repository_id, job_type)
                .after(previous)
                .into_job(now);
            previous = Some(job.id);
            job
        })
        .collect()
}

//! In-memory job queue for tests, with the same claim semantics as
//! [`super::store::PgJobStore`].

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::store::JobStore;
use crate::error::{CoreError, CoreResult};
use crate::models::job::{Job, JobStatus, JobType};

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<Vec<Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Vec<Job>) -> T) -> T {
        let mut jobs = self.jobs.lock().expect("job store poisoned");
        f(&mut jobs)
    }

    pub fn all(&self) -> Vec<Job> {
        self.with(|jobs| jobs.clone())
    }

    fn finish(&self, id: Uuid, status: JobStatus, message: Option<&str>) -> CoreResult<()> {
        self.with(|jobs| {
            let job = jobs
                .iter_mut()
                .find(|j| j.id == id)
                .ok_or_else(|| CoreError::not_found(format!("job {id} not found")))?;
            if !job.status.can_transition_to(status) {
                return Err(CoreError::conflict(format!("job {id} is not in progress")));
            }
            job.status = status;
            job.error_message = message.map(str::to_string);
            job.finished_at = Some(Utc::now());
            Ok(())
        })
    }

    fn select(&self, pred: impl Fn(&Job) -> bool) -> Vec<Job> {
        self.with(|jobs| {
            let mut found: Vec<Job> = jobs.iter().filter(|j| pred(j)).cloned().collect();
            found.sort_by_key(|j| (j.created_at, j.id));
            found
        })
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, new_jobs: &[Job]) -> CoreResult<()> {
        self.with(|jobs| {
            let mut replaced: HashSet<Uuid> = jobs.iter().filter_map(|j| j.retry_of).collect();
            for job in new_jobs {
                if let Some(original) = job.retry_of {
                    if !replaced.insert(original) {
                        return Err(CoreError::conflict(format!("job {original} already has a replacement")));
                    }
                }
            }
            jobs.extend_from_slice(new_jobs);
            Ok(())
        })
    }

    async fn claim_next(&self, job_type: JobType, limit: usize) -> CoreResult<Vec<Job>> {
        self.with(|jobs| {
            let eligible: Vec<usize> = {
                let all: &[Job] = jobs;
                let completed = |id: Uuid| {
                    all.iter()
                        .any(|p| p.id == id && p.status == JobStatus::Completed)
                };
                let mut eligible: Vec<usize> = (0..all.len())
                    .filter(|&i| {
                        let j = &all[i];
                        j.status == JobStatus::Pending
                            && j.job_type == job_type
                            && j.depends_on.is_none_or(|p| completed(p))
                    })
                    .collect();
                eligible.sort_by_key(|&i| (all[i].created_at, all[i].id));
                eligible.truncate(limit);
                eligible
            };

            let now = Utc::now();
            let mut claimed = Vec::with_capacity(eligible.len());
            for i in eligible {
                jobs[i].status = JobStatus::InProgress;
                jobs[i].started_at = Some(now);
                claimed.push(jobs[i].clone());
            }
            Ok(claimed)
        })
    }

    async fn complete(&self, id: Uuid) -> CoreResult<()> {
        self.finish(id, JobStatus::Completed, None)
    }

    async fn fail(&self, id: Uuid, message: &str) -> CoreResult<()> {
        self.finish(id, JobStatus::Failed, Some(message))
    }

    async fn get(&self, id: Uuid) -> CoreResult<Job> {
        self.with(|jobs| {
            jobs.iter()
                .find(|j| j.id == id)
                .cloned()
                .ok_or_else(|| CoreError::not_found(format!("job {id} not found")))
        })
    }

    async fn by_project(&self, project_id: Uuid) -> CoreResult<Vec<Job>> {
        Ok(self.select(|j| j.project_id == project_id))
    }

    async fn by_repository(&self, project_repository_id: Uuid) -> CoreResult<Vec<Job>> {
        Ok(self.select(|j| j.project_repository_id == Some(project_repository_id)))
    }

    async fn by_status(&self, status: JobStatus) -> CoreResult<Vec<Job>> {
        Ok(self.select(|j| j.status == status))
    }

    async fn dependents_of(&self, id: Uuid) -> CoreResult<Vec<Job>> {
        Ok(self.select(|j| j.depends_on == Some(id)))
    }

    async fn retry_of(&self, id: Uuid) -> CoreResult<Option<Job>> {
        Ok(self.select(|j| j.retry_of == Some(id)).into_iter().next())
    }

    async fn has_active_jobs(&self, project_id: Uuid, since: DateTime<Utc>) -> CoreResult<bool> {
        Ok(!self
            .select(|j| {
                j.project_id == project_id
                    && matches!(j.status, JobStatus::Pending | JobStatus::InProgress)
                    && j.created_at >= since
            })
            .is_empty())
    }

    async fn fail_interrupted(&self, message: &str) -> CoreResult<Vec<Uuid>> {
        self.with(|jobs| {
            let now = Utc::now();
            let mut failed = Vec::new();
            for job in jobs.iter_mut().filter(|j| j.status == JobStatus::InProgress) {
                job.status = JobStatus::Failed;
                job.error_message = Some(message.to_string());
                job.finished_at = Some(now);
                failed.push(job.id);
            }
            Ok(failed)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use chrono::TimeDelta;

    use super::*;
    use crate::models::job::NewJob;

    fn pending(project_id: Uuid, job_type: JobType, parent: Option<Uuid>, offset_secs: i64) -> Job {
        let created = Utc::now() - TimeDelta::hours(1) + TimeDelta::seconds(offset_secs);
        NewJob::new(project_id, None, job_type).after(parent).into_job(created)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_claims_are_disjoint_and_complete() {
        let store = Arc::new(MemoryJobStore::new());
        let project = Uuid::new_v4();
        let jobs: Vec<Job> = (0..60).map(|i| pending(project, JobType::Commit, None, i)).collect();
        store.insert(&jobs).await.unwrap();

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    let mut mine = Vec::new();
                    loop {
                        let batch = store.claim_next(JobType::Commit, 3).await.unwrap();
                        if batch.is_empty() {
                            return mine;
                        }
                        mine.extend(batch.into_iter().map(|j| j.id));
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for worker in workers {
            for id in worker.await.unwrap() {
                assert!(seen.insert(id), "job {id} claimed twice");
            }
        }
        let expected: HashSet<Uuid> = jobs.iter().map(|j| j.id).collect();
        assert_eq!(seen, expected);
        assert!(store.all().iter().all(|j| j.status == JobStatus::InProgress));
    }

    #[tokio::test]
    async fn claims_follow_creation_order() {
        let store = MemoryJobStore::new();
        let project = Uuid::new_v4();
        let jobs: Vec<Job> = (0..5).map(|i| pending(project, JobType::Clone, None, i)).collect();
        // Insertion order differs from creation order.
        let shuffled = [jobs[3].clone(), jobs[0].clone(), jobs[4].clone(), jobs[1].clone(), jobs[2].clone()];
        store.insert(&shuffled).await.unwrap();

        let first: Vec<Uuid> = store.claim_next(JobType::Clone, 2).await.unwrap().iter().map(|j| j.id).collect();
        assert_eq!(first, vec![jobs[0].id, jobs[1].id]);
        let rest: Vec<Uuid> = store.claim_next(JobType::Clone, 10).await.unwrap().iter().map(|j| j.id).collect();
        assert_eq!(rest, vec![jobs[2].id, jobs[3].id, jobs[4].id]);
    }

    #[tokio::test]
    async fn dependents_wait_for_a_completed_parent() {
        let store = MemoryJobStore::new();
        let project = Uuid::new_v4();
        let parent = pending(project, JobType::Clone, None, 0);
        let child = pending(project, JobType::Commit, Some(parent.id), 1);
        let other_parent = pending(project, JobType::Clone, None, 2);
        let blocked = pending(project, JobType::Commit, Some(other_parent.id), 3);
        store
            .insert(&[parent.clone(), child.clone(), other_parent.clone(), blocked.clone()])
            .await
            .unwrap();

        assert!(store.claim_next(JobType::Commit, 10).await.unwrap().is_empty());

        store.claim_next(JobType::Clone, 10).await.unwrap();
        assert!(store.claim_next(JobType::Commit, 10).await.unwrap().is_empty());

        store.complete(parent.id).await.unwrap();
        store.fail(other_parent.id, "permanent_io: gone [tag 00000000]").await.unwrap();
        let claimed = store.claim_next(JobType::Commit, 10).await.unwrap();
        assert_eq!(claimed.iter().map(|j| j.id).collect::<Vec<_>>(), vec![child.id]);
        assert_eq!(store.get(blocked.id).await.unwrap().status, JobStatus::Pending);
    }
}

//! Durable job queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};
use diesel_async::pooled_connection::deadpool::Object;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::{CoreError, CoreResult};
use crate::models::job::{Job, JobRow, JobStatus, JobType};
use crate::schema::jobs;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert pending jobs atomically, in order, so chains never appear half-written.
    async fn insert(&self, jobs: &[Job]) -> CoreResult<()>;

    /// Atomically move up to `limit` eligible pending jobs of `job_type` to
    /// `in_progress`, oldest first. A job is eligible when it has no parent or
    /// its parent is completed.
    async fn claim_next(&self, job_type: JobType, limit: usize) -> CoreResult<Vec<Job>>;

    async fn complete(&self, id: Uuid) -> CoreResult<()>;

    async fn fail(&self, id: Uuid, message: &str) -> CoreResult<()>;

    async fn get(&self, id: Uuid) -> CoreResult<Job>;

    async fn by_project(&self, project_id: Uuid) -> CoreResult<Vec<Job>>;

    async fn by_repository(&self, project_repository_id: Uuid) -> CoreResult<Vec<Job>>;

    async fn by_status(&self, status: JobStatus) -> CoreResult<Vec<Job>>;

    /// Jobs whose `depends_on` is `id`.
    async fn dependents_of(&self, id: Uuid) -> CoreResult<Vec<Job>>;

    /// The replacement created by retrying `id`, if any.
    async fn retry_of(&self, id: Uuid) -> CoreResult<Option<Job>>;

    /// Whether the project has pending or in-progress jobs created at or after `since`.
    async fn has_active_jobs(&self, project_id: Uuid, since: DateTime<Utc>) -> CoreResult<bool>;

    /// Fail every `in_progress` job with `message`. Run at startup only,
    /// before any worker claims, so these are units a previous process lost.
    async fn fail_interrupted(&self, message: &str) -> CoreResult<Vec<Uuid>>;
}

fn into_jobs(rows: Vec<JobRow>) -> CoreResult<Vec<Job>> {
    rows.into_iter().map(Job::try_from).collect()
}

const CLAIM_SQL: &str = r#"
UPDATE jobs SET status = 'in_progress', started_at = NOW()
WHERE id IN (
    SELECT j.id FROM jobs j
    LEFT JOIN jobs p ON p.id = j.depends_on
    WHERE j.status = 'pending'
      AND j.job_type = $1
      AND (j.depends_on IS NULL OR p.status = 'completed')
    ORDER BY j.created_at ASC, j.id ASC
    LIMIT $2
    FOR UPDATE OF j SKIP LOCKED
)
RETURNING *
"#;

pub struct PgJobStore {
    pool: DbPool,
}

impl PgJobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> CoreResult<Object<AsyncPgConnection>> {
        Ok(self.pool.get().await?)
    }

    async fn finish(&self, id: Uuid, status: JobStatus, message: Option<&str>) -> CoreResult<()> {
        if !JobStatus::InProgress.can_transition_to(status) {
            return Err(CoreError::internal(format!("job {id} cannot finish as {status}")));
        }
        let mut conn = self.conn().await?;
        let updated = diesel::update(
            jobs::table
                .find(id)
                .filter(jobs::status.eq(JobStatus::InProgress.as_str())),
        )
        .set((
            jobs::status.eq(status.as_str()),
            jobs::error_message.eq(message),
            jobs::finished_at.eq(Utc::now()),
        ))
        .execute(&mut conn)
        .await?;
        if updated == 0 {
            return Err(CoreError::conflict(format!("job {id} is not in progress")));
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, new_jobs: &[Job]) -> CoreResult<()> {
        let rows: Vec<JobRow> = new_jobs.iter().map(JobRow::from).collect();
        let mut conn = self.conn().await?;
        conn.transaction::<_, CoreError, _>(|conn| {
            async move {
                diesel::insert_into(jobs::table)
                    .values(&rows)
                    .execute(conn)
                    .await?;
                Ok(())
            }
            .scope_boxed()
        })
        .await?;
        for job in new_jobs {
            crate::metrics::job_status_changed(job.job_type, JobStatus::Pending);
        }
        Ok(())
    }

    async fn claim_next(&self, job_type: JobType, limit: usize) -> CoreResult<Vec<Job>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn().await?;
        let rows = diesel::sql_query(CLAIM_SQL)
            .bind::<Text, _>(job_type.as_str())
            .bind::<BigInt, _>(i64::try_from(limit).unwrap_or(i64::MAX))
            .load::<JobRow>(&mut conn)
            .await?;
        // RETURNING does not preserve the subquery order.
        let mut claimed = into_jobs(rows)?;
        claimed.sort_by_key(|j| (j.created_at, j.id));
        Ok(claimed)
    }

    async fn complete(&self, id: Uuid) -> CoreResult<()> {
        self.finish(id, JobStatus::Completed, None).await
    }

    async fn fail(&self, id: Uuid, message: &str) -> CoreResult<()> {
        self.finish(id, JobStatus::Failed, Some(message)).await
    }

    async fn get(&self, id: Uuid) -> CoreResult<Job> {
        let mut conn = self.conn().await?;
        jobs::table
            .find(id)
            .select(JobRow::as_select())
            .first::<JobRow>(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| CoreError::not_found(format!("job {id} not found")))?
            .try_into()
    }

    async fn by_project(&self, project_id: Uuid) -> CoreResult<Vec<Job>> {
        let mut conn = self.conn().await?;
        let rows = jobs::table
            .filter(jobs::project_id.eq(project_id))
            .order((jobs::created_at.asc(), jobs::id.asc()))
            .select(JobRow::as_select())
            .load::<JobRow>(&mut conn)
            .await?;
        into_jobs(rows)
    }

    async fn by_repository(&self, project_repository_id: Uuid) -> CoreResult<Vec<Job>> {
        let mut conn = self.conn().await?;
        let rows = jobs::table
            .filter(jobs::project_repository_id.eq(project_repository_id))
            .order((jobs::created_at.asc(), jobs::id.asc()))
            .select(JobRow::as_select())
            .load::<JobRow>(&mut conn)
            .await?;
        into_jobs(rows)
    }

    async fn by_status(&self, status: JobStatus) -> CoreResult<Vec<Job>> {
        let mut conn = self.conn().await?;
        let rows = jobs::table
            .filter(jobs::status.eq(status.as_str()))
            .order((jobs::created_at.asc(), jobs::id.asc()))
            .select(JobRow::as_select())
            .load::<JobRow>(&mut conn)
            .await?;
        into_jobs(rows)
    }

    async fn dependents_of(&self, id: Uuid) -> CoreResult<Vec<Job>> {
        let mut conn = self.conn().await?;
        let rows = jobs::table
            .filter(jobs::depends_on.eq(id))
            .order((jobs::created_at.asc(), jobs::id.asc()))
            .select(JobRow::as_select())
            .load::<JobRow>(&mut conn)
            .await?;
        into_jobs(rows)
    }

    async fn retry_of(&self, id: Uuid) -> CoreResult<Option<Job>> {
        let mut conn = self.conn().await?;
        jobs::table
            .filter(jobs::retry_of.eq(id))
            .select(JobRow::as_select())
            .first::<JobRow>(&mut conn)
            .await
            .optional()?
            .map(Job::try_from)
            .transpose()
    }

    async fn has_active_jobs(&self, project_id: Uuid, since: DateTime<Utc>) -> CoreResult<bool> {
        let mut conn = self.conn().await?;
        let count: i64 = jobs::table
            .filter(jobs::project_id.eq(project_id))
            .filter(jobs::status.eq_any([
                JobStatus::Pending.as_str(),
                JobStatus::InProgress.as_str(),
            ]))
            .filter(jobs::created_at.ge(since))
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(count > 0)
    }

    async fn fail_interrupted(&self, message: &str) -> CoreResult<Vec<Uuid>> {
        let mut conn = self.conn().await?;
        let ids = diesel::update(jobs::table.filter(jobs::status.eq(JobStatus::InProgress.as_str())))
            .set((
                jobs::status.eq(JobStatus::Failed.as_str()),
                jobs::error_message.eq(message),
                jobs::finished_at.eq(Utc::now()),
            ))
            .returning(jobs::id)
            .get_results::<Uuid>(&mut conn)
            .await?;
        Ok(ids)
    }
}

//! Analysis jobs: the durable queue driving clone, ingest, fetch and stats work.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::schema::jobs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Clone,
    Commit,
    PullRequest,
    Stats,
}

impl JobType {
    /// Order in which a repository's update chain runs.
    pub const CHAIN: [JobType; 4] = [Self::Clone, Self::Commit, Self::PullRequest, Self::Stats];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clone => "clone",
            Self::Commit => "commit",
            Self::PullRequest => "pull_request",
            Self::Stats => "stats",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clone" => Ok(Self::Clone),
            "commit" => Ok(Self::Commit),
            "pull_request" => Ok(Self::PullRequest),
            "stats" => Ok(Self::Stats),
            other => Err(CoreError::internal(format!("unknown job type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Allowed edges: pending → in_progress → {completed, failed}.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::InProgress, Self::Completed)
                | (Self::InProgress, Self::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(CoreError::internal(format!("unknown job status: {other}"))),
        }
    }
}

/// Row shape of the `jobs` table.
#[derive(Debug, Clone, Queryable, QueryableByName, Selectable, Insertable)]
#[diesel(table_name = jobs)]
pub struct JobRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub project_repository_id: Option<Uuid>,
    pub job_type: String,
    pub status: String,
    pub depends_on: Option<Uuid>,
    pub error_message: Option<String>,
    pub attempt: i32,
    pub retry_of: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub project_id: Uuid,
    pub project_repository_id: Option<Uuid>,
    pub job_type: JobType,
    pub status: JobStatus,
    pub depends_on: Option<Uuid>,
    pub error_message: Option<String>,
    pub attempt: i32,
    pub retry_of: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for Job {
    type Error = CoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            project_id: row.project_id,
            project_repository_id: row.project_repository_id,
            job_type: row.job_type.parse()?,
            status: row.status.parse()?,
            depends_on: row.depends_on,
            error_message: row.error_message,
            attempt: row.attempt,
            retry_of: row.retry_of,
            created_at: row.created_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
        })
    }
}

impl From<&Job> for JobRow {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            project_id: job.project_id,
            project_repository_id: job.project_repository_id,
            job_type: job.job_type.as_str().to_string(),
            status: job.status.as_str().to_string(),
            depends_on: job.depends_on,
            error_message: job.error_message.clone(),
            attempt: job.attempt,
            retry_of: job.retry_of,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
        }
    }
}

/// A job to enqueue. Always starts out `pending`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub project_id: Uuid,
    pub project_repository_id: Option<Uuid>,
    pub job_type: JobType,
    pub depends_on: Option<Uuid>,
    pub attempt: i32,
    pub retry_of: Option<Uuid>,
}

impl NewJob {
    pub fn new(project_id: Uuid, project_repository_id: Option<Uuid>, job_type: JobType) -> Self {
        Self {
            project_id,
            project_repository_id,
            job_type,
            depends_on: None,
            attempt: 1,
            retry_of: None,
        }
    }

    pub fn after(mut self, parent: Option<Uuid>) -> Self {
        self.depends_on = parent;
        self
    }

    pub fn into_job(self, now: DateTime<Utc>) -> Job {
        Job {
            id: Uuid::new_v4(),
            project_id: self.project_id,
            project_repository_id: self.project_repository_id,
            job_type: self.job_type,
            status: JobStatus::Pending,
            depends_on: self.depends_on,
            error_message: None,
            attempt: self.attempt,
            retry_of: self.retry_of,
            created_at: now,
            started_at: None,
            finished_at: None,
        }
    }
}

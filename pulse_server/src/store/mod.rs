//! Typed access to the analytics tables.
//!
//! Each concern is a trait so workers and the resolver can run against
//! PostgreSQL ([`pg::PgStore`]) or, in tests, an in-memory store.

#[cfg(test)]
pub mod memory;
pub mod pg;

use std::ops::RangeInclusive;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

pub use pg::PgStore;

use crate::error::CoreResult;
use crate::git::WalkedCommit;
use crate::github::{GithubAccount, RemotePullRequest, RemoteReview};
use crate::models::commit::CommitWithFiles;
use crate::models::identity::{EmailMerge, GithubPerson, GithubPersonEmail, IdentityBinding, Person};
use crate::models::project::{GithubRepository, Project, ProjectRepository, RepositoryTarget};
use crate::models::pull_request::{PrReview, PullRequest};
use crate::models::settings::{
    ExcludedExtension, ExcludedFolder, ProjectFilters, ProjectUpdateSettings, ScoreSettings,
    WorkingHoursSettings,
};
use crate::models::statistics::{PeopleStatistics, PersonDayStats};

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn create_project(&self, project: Project) -> CoreResult<Project>;

    async fn get_project(&self, project_id: Uuid) -> CoreResult<Project>;

    /// Filters, weights and working hours; default weights when unset.
    async fn project_filters(&self, project_id: Uuid) -> CoreResult<ProjectFilters>;

    async fn set_score_settings(&self, settings: ScoreSettings) -> CoreResult<()>;

    /// `None` removes the window so every commit counts.
    async fn set_working_hours(
        &self,
        project_id: Uuid,
        settings: Option<WorkingHoursSettings>,
    ) -> CoreResult<()>;

    async fn add_excluded_extension(&self, project_id: Uuid, value: &str)
        -> CoreResult<ExcludedExtension>;

    async fn add_excluded_folder(&self, project_id: Uuid, value: &str) -> CoreResult<ExcludedFolder>;

    async fn set_update_settings(&self, settings: ProjectUpdateSettings) -> CoreResult<()>;

    /// Projects with auto update enabled at `hour`.
    async fn due_projects(&self, hour: i32) -> CoreResult<Vec<ProjectUpdateSettings>>;

    /// Stamp `last_triggered_at = now` unless it is already at or after
    /// `hour_start`. Returns whether this call took the slot.
    async fn claim_update_slot(
        &self,
        project_id: Uuid,
        hour_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> CoreResult<bool>;
}

#[async_trait]
pub trait RepositoryStore: Send + Sync {
    /// Insert or refresh by `github_repo_id`; returns the stored row.
    async fn upsert_github_repository(&self, repo: GithubRepository) -> CoreResult<GithubRepository>;

    async fn add_project_repository(
        &self,
        project_id: Uuid,
        github_repository_id: Uuid,
    ) -> CoreResult<ProjectRepository>;

    async fn set_tracked(&self, project_repository_id: Uuid, tracked: bool) -> CoreResult<()>;

    async fn repository_target(&self, project_repository_id: Uuid) -> CoreResult<RepositoryTarget>;

    /// Every repository of the project, oldest first.
    async fn project_targets(&self, project_id: Uuid) -> CoreResult<Vec<RepositoryTarget>>;

    /// Record a working copy for the upstream and every project referencing it.
    async fn mark_cloned(&self, github_repository_id: Uuid, head_sha: Option<&str>) -> CoreResult<()>;

    async fn set_ingested_sha(&self, github_repository_id: Uuid, sha: &str) -> CoreResult<()>;
}

#[async_trait]
pub trait CommitStore: Send + Sync {
    /// Insert commits not yet stored; returns how many were new. Files are
    /// written only for new commits.
    async fn insert_commits(
        &self,
        github_repository_id: Uuid,
        commits: &[WalkedCommit],
    ) -> CoreResult<usize>;

    async fn commits_with_files(&self, github_repository_id: Uuid) -> CoreResult<Vec<CommitWithFiles>>;

    /// Distinct normalised author emails across the repositories.
    async fn author_emails(&self, github_repository_ids: &[Uuid]) -> CoreResult<Vec<String>>;
}

#[async_trait]
pub trait PullRequestStore: Send + Sync {
    async fn upsert_pull_request(
        &self,
        repository_id: Uuid,
        pr: &RemotePullRequest,
        review_comments: i32,
    ) -> CoreResult<PullRequest>;

    async fn upsert_review(
        &self,
        pr: &PullRequest,
        review: &RemoteReview,
        comment_count: i32,
    ) -> CoreResult<PrReview>;

    async fn pull_requests(&self, repository_id: Uuid) -> CoreResult<Vec<PullRequest>>;

    async fn reviews(&self, repository_id: Uuid) -> CoreResult<Vec<PrReview>>;

    /// Distinct pull request authors and reviewers across the repositories.
    async fn logins(&self, github_repository_ids: &[Uuid]) -> CoreResult<Vec<String>>;
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn merges(&self, project_id: Uuid) -> CoreResult<Vec<EmailMerge>>;

    /// Validate against the project's current graph and insert, atomically.
    async fn create_merge(&self, project_id: Uuid, source: &str, target: &str) -> CoreResult<EmailMerge>;

    async fn delete_merge(&self, project_id: Uuid, source: &str) -> CoreResult<()>;

    async fn bindings(&self, project_id: Uuid) -> CoreResult<Vec<IdentityBinding>>;

    async fn has_bindings(&self, project_id: Uuid) -> CoreResult<bool>;

    async fn get_or_create_person(&self, email: &str, name: &str) -> CoreResult<Person>;

    async fn upsert_github_person(&self, account: &GithubAccount) -> CoreResult<GithubPerson>;

    async fn github_person_by_login(&self, login: &str) -> CoreResult<Option<GithubPerson>>;

    /// Conflict when the account is already bound in the project.
    async fn bind(
        &self,
        project_id: Uuid,
        github_person_id: Uuid,
        person_id: Uuid,
    ) -> CoreResult<GithubPersonEmail>;

    async fn unbind(&self, project_id: Uuid, github_person_id: Uuid) -> CoreResult<()>;
}

#[async_trait]
pub trait StatsStore: Send + Sync {
    /// Make `rows` the complete statistics of one project repository in a
    /// single transaction. Rows keep their ids across reruns.
    async fn replace_repository_stats(
        &self,
        project_id: Uuid,
        repository_id: Uuid,
        rows: Vec<PersonDayStats>,
    ) -> CoreResult<()>;

    async fn project_stats(
        &self,
        project_id: Uuid,
        dates: Option<RangeInclusive<NaiveDate>>,
    ) -> CoreResult<Vec<PeopleStatistics>>;
}

/// Everything the workers and resolver read and write.
pub trait Store:
    ProjectStore + RepositoryStore + CommitStore + PullRequestStore + IdentityStore + StatsStore
{
}

impl<T> Store for T where
    T: ProjectStore + RepositoryStore + CommitStore + PullRequestStore + IdentityStore + StatsStore
{
}

/// Login recorded for accounts deleted on the platform.
pub const GHOST_LOGIN: &str = "ghost";

//! Projects and the repositories they track.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{github_repositories, project_repositories, projects};

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = projects)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: impl Into<String>, owner_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            owner_id,
            created_at: Utc::now(),
        }
    }
}

/// An upstream repository, shared by every project that references it.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = github_repositories)]
pub struct GithubRepository {
    pub id: Uuid,
    pub github_repo_id: i64,
    pub full_name: String,
    pub clone_url: String,
    pub default_branch: String,
    pub is_cloned: bool,
    pub head_sha: Option<String>,
    pub ingested_sha: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl GithubRepository {
    pub fn new(
        github_repo_id: i64,
        full_name: impl Into<String>,
        clone_url: impl Into<String>,
        default_branch: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            github_repo_id,
            full_name: full_name.into(),
            clone_url: clone_url.into(),
            default_branch: default_branch.into(),
            is_cloned: false,
            head_sha: None,
            ingested_sha: None,
            created_at: Utc::now(),
        }
    }

    /// `(owner, repo)` from `owner/repo`.
    pub fn owner_and_name(&self) -> Option<(&str, &str)> {
        let (owner, name) = self.full_name.split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some((owner, name))
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = project_repositories)]
pub struct ProjectRepository {
    pub id: Uuid,
    pub project_id: Uuid,
    pub github_repository_id: Uuid,
    pub is_tracked: bool,
    pub is_cloned: bool,
    pub created_at: DateTime<Utc>,
}

impl ProjectRepository {
    pub fn new(project_id: Uuid, github_repository_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            github_repository_id,
            is_tracked: true,
            is_cloned: false,
            created_at: Utc::now(),
        }
    }
}

/// A project repository joined with its upstream.
#[derive(Debug, Clone, Serialize)]
pub struct RepositoryTarget {
    pub project_repository: ProjectRepository,
    pub github_repository: GithubRepository,
}

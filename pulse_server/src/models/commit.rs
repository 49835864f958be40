//! Ingested commits and their per-file patch stats.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::schema::{commit_files, commits};

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = commits)]
pub struct Commit {
    pub id: Uuid,
    pub github_repository_id: Uuid,
    pub sha: String,
    pub author_email: String,
    pub author_name: String,
    pub commit_date: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = commit_files)]
pub struct CommitFile {
    pub id: Uuid,
    pub commit_id: Uuid,
    pub path: String,
    pub additions: i32,
    pub deletions: i32,
    pub status: String,
}

/// A commit with its files, as loaded for statistics.
#[derive(Debug, Clone)]
pub struct CommitWithFiles {
    pub commit: Commit,
    pub files: Vec<CommitFile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Added,
    Modified,
    Renamed,
    Removed,
}

impl FileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Renamed => "renamed",
            Self::Removed => "removed",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "added" => Ok(Self::Added),
            "modified" => Ok(Self::Modified),
            "renamed" => Ok(Self::Renamed),
            "removed" => Ok(Self::Removed),
            other => Err(CoreError::internal(format!("unknown file status: {other}"))),
        }
    }
}

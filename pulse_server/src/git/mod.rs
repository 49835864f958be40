//! Local working copies: clone, fetch and commit walks with per-file stats.

pub mod cli;
pub mod log;

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use cli::GitCli;

use crate::error::CoreError;
use crate::models::commit::FileStatus;
use crate::retry::{RetryHint, Retryable};

#[derive(Debug, Error)]
pub enum GitError {
    #[error("git authentication failed: {0}")]
    Auth(String),

    #[error("repository not found: {0}")]
    NotFound(String),

    #[error("git transient failure: {0}")]
    Transient(String),

    #[error("git failed: {0}")]
    Permanent(String),
}

impl GitError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::NotFound(_) => "not_found",
            Self::Transient(_) => "transient",
            Self::Permanent(_) => "permanent",
        }
    }
}

impl Retryable for GitError {
    fn retry_hint(&self) -> RetryHint {
        match self {
            Self::Transient(_) => RetryHint::Backoff,
            _ => RetryHint::Stop,
        }
    }
}

impl From<CoreError> for GitError {
    fn from(err: CoreError) -> Self {
        if err.is_transient() {
            Self::Transient(err.to_string())
        } else {
            Self::Permanent(err.to_string())
        }
    }
}

impl From<GitError> for CoreError {
    fn from(err: GitError) -> Self {
        match err {
            GitError::Auth(msg) => CoreError::Forbidden(format!("git authentication failed: {msg}")),
            GitError::NotFound(msg) => CoreError::NotFound(msg),
            GitError::Transient(msg) => CoreError::TransientIo(format!("git: {msg}")),
            GitError::Permanent(msg) => CoreError::PermanentIo(format!("git: {msg}")),
        }
    }
}

impl From<std::io::Error> for GitError {
    fn from(err: std::io::Error) -> Self {
        Self::Permanent(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedFile {
    pub path: String,
    pub additions: i32,
    pub deletions: i32,
    pub status: FileStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedCommit {
    pub sha: String,
    pub author_email: String,
    pub author_name: String,
    pub commit_date: DateTime<Utc>,
    pub message: String,
    pub files: Vec<WalkedFile>,
}

#[async_trait]
pub trait Git: Send + Sync {
    /// Clone `clone_url` bare into `path`, or reuse the copy already there.
    /// Returns `true` when a new clone was made.
    async fn clone_or_open(&self, clone_url: &str, path: &Path, token: &str)
        -> Result<bool, GitError>;

    /// Update every branch from the remote.
    async fn fetch(&self, path: &Path, clone_url: &str, token: &str) -> Result<(), GitError>;

    /// Commit id at the tip of `branch`, or `None` for an empty repository.
    async fn head(&self, path: &Path, branch: &str) -> Result<Option<String>, GitError>;

    /// Commits reachable from `branch`, oldest first. With `since`, only
    /// commits after it; falls back to the full history when `since` is no
    /// longer an ancestor of `branch`.
    async fn walk_commits(
        &self,
        path: &Path,
        branch: &str,
        since: Option<&str>,
    ) -> Result<Vec<WalkedCommit>, GitError>;
}

/// `workspace/<owner>/<repo>` for a `owner/repo` full name. Rejects names
/// that would escape the workspace.
pub fn workspace_path(root: &Path, full_name: &str) -> Result<PathBuf, CoreError> {
    let (owner, repo) = full_name
        .split_once('/')
        .filter(|(o, r)| !o.is_empty() && !r.is_empty() && !r.contains('/'))
        .ok_or_else(|| CoreError::InvalidInput(format!("invalid repository name: {full_name}")))?;

    let relative = Path::new(owner).join(repo);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(CoreError::InvalidInput(format!(
            "invalid repository name: {full_name}"
        )));
    }
    Ok(root.join(relative))
}

//! Platform API facade: repositories, pull requests, reviews and accounts.

pub mod client;
pub mod error;

use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

pub use client::GithubClient;
pub use error::GithubError;

use crate::models::identity::AccountType;
use crate::models::pull_request::{PrState, ReviewState};
use crate::retry::{retry_with_backoff, RetryConfig};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GithubAccount {
    pub id: i64,
    pub login: String,
    pub account_type: AccountType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteRepository {
    pub id: i64,
    pub full_name: String,
    pub clone_url: String,
    pub default_branch: String,
    pub private: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemotePullRequest {
    pub number: i32,
    pub title: String,
    pub state: PrState,
    pub author: Option<GithubAccount>,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteReview {
    pub id: i64,
    pub reviewer: Option<GithubAccount>,
    pub state: ReviewState,
    pub has_body: bool,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteReviewComment {
    pub id: i64,
    pub review_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimit {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// One page of a listing plus the cursor of the next page, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<u32>,
}

/// Pages are numbered from 1.
#[async_trait]
pub trait GithubApi: Send + Sync {
    async fn list_user_repositories(
        &self,
        token: &str,
        page: u32,
    ) -> Result<Page<RemoteRepository>, GithubError>;

    async fn list_pull_requests(
        &self,
        repo: &str,
        page: u32,
    ) -> Result<Page<RemotePullRequest>, GithubError>;

    async fn list_reviews(
        &self,
        repo: &str,
        number: i32,
        page: u32,
    ) -> Result<Page<RemoteReview>, GithubError>;

    async fn list_review_comments(
        &self,
        repo: &str,
        number: i32,
        page: u32,
    ) -> Result<Page<RemoteReviewComment>, GithubError>;

    async fn get_user(&self, login: &str) -> Result<GithubAccount, GithubError>;

    async fn get_rate_limit(&self) -> Result<RateLimit, GithubError>;
}

/// Follow `next` cursors until the last page, retrying each page independently.
pub async fn fetch_all<T, F, Fut>(
    retry: RetryConfig,
    cancel: &CancellationToken,
    label: &str,
    mut fetch: F,
) -> Result<Vec<T>, GithubError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Page<T>, GithubError>>,
{
    let mut items = Vec::new();
    let mut page = 1;
    loop {
        let current = retry_with_backoff(retry, cancel, label, || fetch(page)).await?;
        items.extend(current.items);
        match current.next {
            Some(next) if next > page => page = next,
            _ => break,
        }
    }
    Ok(items)
}

/// List every repository visible to `token`.
pub async fn list_all_user_repositories(
    api: &dyn GithubApi,
    token: &str,
    retry: RetryConfig,
    cancel: &CancellationToken,
) -> Result<Vec<RemoteRepository>, GithubError> {
    fetch_all(retry, cancel, "list_user_repositories", |page| {
        api.list_user_repositories(token, page)
    })
    .await
}

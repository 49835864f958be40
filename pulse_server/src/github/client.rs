//! reqwest-backed GitHub REST client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::{HeaderMap, LINK, RETRY_AFTER};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{
    GithubAccount, GithubApi, GithubError, Page, RateLimit, RemotePullRequest, RemoteRepository,
    RemoteReview, RemoteReviewComment,
};
use crate::models::identity::AccountType;
use crate::models::pull_request::{PrState, ReviewState};

const PER_PAGE: u32 = 100;
const USER_AGENT: &str = "devpulse";

pub struct GithubClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl GithubClient {
    /// `token` authenticates every call except `list_user_repositories`,
    /// which uses the caller's own token.
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
        page: Option<u32>,
    ) -> Result<(T, Option<u32>), GithubError> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self
            .http
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if !token.is_empty() {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        if let Some(page) = page {
            request = request.query(&[("per_page", PER_PAGE), ("page", page)]);
        }

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let headers = resp.headers().clone();
            let body = resp.text().await.unwrap_or_default();
            tracing::debug!(%status, path, "GitHub request failed");
            return Err(classify_status(status, &headers, &body, Utc::now()));
        }

        let next = next_page(resp.headers());
        let value = resp.json::<T>().await?;
        Ok((value, next))
    }
}

#[async_trait]
impl GithubApi for GithubClient {
    async fn list_user_repositories(
        &self,
        token: &str,
        page: u32,
    ) -> Result<Page<RemoteRepository>, GithubError> {
        let (repos, next) = self
            .get_json::<Vec<RepoDto>>(token, "/user/repos", Some(page))
            .await?;
        Ok(Page {
            items: repos.into_iter().map(RemoteRepository::from).collect(),
            next,
        })
    }

    async fn list_pull_requests(
        &self,
        repo: &str,
        page: u32,
    ) -> Result<Page<RemotePullRequest>, GithubError> {
        let path = format!("/repos/{repo}/pulls?state=all&sort=created&direction=asc");
        let (pulls, next) = self
            .get_json::<Vec<PullDto>>(&self.token, &path, Some(page))
            .await?;
        Ok(Page {
            items: pulls.into_iter().map(RemotePullRequest::from).collect(),
            next,
        })
    }

    async fn list_reviews(
        &self,
        repo: &str,
        number: i32,
        page: u32,
    ) -> Result<Page<RemoteReview>, GithubError> {
        let path = format!("/repos/{repo}/pulls/{number}/reviews");
        let (reviews, next) = self
            .get_json::<Vec<ReviewDto>>(&self.token, &path, Some(page))
            .await?;
        Ok(Page {
            items: reviews.into_iter().filter_map(ReviewDto::into_review).collect(),
            next,
        })
    }

    async fn list_review_comments(
        &self,
        repo: &str,
        number: i32,
        page: u32,
    ) -> Result<Page<RemoteReviewComment>, GithubError> {
        let path = format!("/repos/{repo}/pulls/{number}/comments");
        let (comments, next) = self
            .get_json::<Vec<ReviewCommentDto>>(&self.token, &path, Some(page))
            .await?;
        Ok(Page {
            items: comments
                .into_iter()
                .map(|c| RemoteReviewComment {
                    id: c.id,
                    review_id: c.pull_request_review_id,
                })
                .collect(),
            next,
        })
    }

    async fn get_user(&self, login: &str) -> Result<GithubAccount, GithubError> {
        let (user, _) = self
            .get_json::<UserDto>(&self.token, &format!("/users/{login}"), None)
            .await?;
        Ok(user.into())
    }

    async fn get_rate_limit(&self) -> Result<RateLimit, GithubError> {
        let (limits, _) = self
            .get_json::<RateLimitDto>(&self.token, "/rate_limit", None)
            .await?;
        let core = limits.resources.core;
        Ok(RateLimit {
            limit: core.limit,
            remaining: core.remaining,
            reset_at: Utc
                .timestamp_opt(core.reset, 0)
                .single()
                .unwrap_or_else(Utc::now),
        })
    }
}

/// Map a non-success response onto an error kind.
///
/// 403 and 429 count as rate limiting when the response carries a
/// `Retry-After` header, an exhausted `x-ratelimit-remaining`, or GitHub's
/// secondary rate limit message.
pub fn classify_status(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    now: DateTime<Utc>,
) -> GithubError {
    let message = api_message(body).unwrap_or_else(|| status.to_string());
    match status {
        StatusCode::UNAUTHORIZED => GithubError::Auth(message),
        StatusCode::NOT_FOUND | StatusCode::GONE => GithubError::NotFound(message),
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = retry_after(headers, now);
            let exhausted = header_str(headers, "x-ratelimit-remaining") == Some("0");
            let secondary = message.to_lowercase().contains("rate limit");
            if status == StatusCode::TOO_MANY_REQUESTS
                || retry_after.is_some()
                || exhausted
                || secondary
            {
                GithubError::RateLimited { retry_after }
            } else {
                GithubError::Auth(message)
            }
        }
        s if s.is_server_error() => GithubError::Transient(message),
        _ => GithubError::Permanent(message),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

fn retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    if let Some(secs) = header_str(headers, RETRY_AFTER.as_str()).and_then(|v| v.parse::<u64>().ok()) {
        return Some(Duration::from_secs(secs));
    }
    if header_str(headers, "x-ratelimit-remaining") != Some("0") {
        return None;
    }
    let reset = header_str(headers, "x-ratelimit-reset")?.parse::<i64>().ok()?;
    let wait = (reset - now.timestamp()).max(0);
    Some(Duration::from_secs(u64::try_from(wait).unwrap_or(0)))
}

fn api_message(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }
    serde_json::from_str::<ErrorBody>(body).ok().map(|b| b.message)
}

/// Page number of the `rel="next"` entry in a `Link` header.
pub fn next_page(headers: &HeaderMap) -> Option<u32> {
    let link = header_str(headers, LINK.as_str())?;
    link.split(',').find_map(|entry| {
        let (target, params) = entry.split_once(';')?;
        if !params.split(';').any(|p| p.trim() == r#"rel="next""#) {
            return None;
        }
        let url = target.trim().trim_start_matches('<').trim_end_matches('>');
        let url = Url::parse(url).ok()?;
        url.query_pairs()
            .find(|(key, _)| key == "page")
            .and_then(|(_, value)| value.parse().ok())
    })
}

#[derive(Deserialize)]
struct UserDto {
    id: i64,
    login: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

impl From<UserDto> for GithubAccount {
    fn from(user: UserDto) -> Self {
        let account_type = match user.kind.as_deref() {
            Some("Bot") => AccountType::Bot,
            Some("Organization") => AccountType::Organization,
            _ => AccountType::User,
        };
        Self {
            id: user.id,
            login: user.login,
            account_type,
        }
    }
}

#[derive(Deserialize)]
struct RepoDto {
    id: i64,
    full_name: String,
    clone_url: String,
    default_branch: Option<String>,
    #[serde(default)]
    private: bool,
}

impl From<RepoDto> for RemoteRepository {
    fn from(repo: RepoDto) -> Self {
        Self {
            id: repo.id,
            full_name: repo.full_name,
            clone_url: repo.clone_url,
            default_branch: repo.default_branch.unwrap_or_else(|| "main".to_string()),
            private: repo.private,
        }
    }
}

#[derive(Deserialize)]
struct PullDto {
    number: i32,
    #[serde(default)]
    title: String,
    state: String,
    user: Option<UserDto>,
    created_at: DateTime<Utc>,
    merged_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
}

impl From<PullDto> for RemotePullRequest {
    fn from(pr: PullDto) -> Self {
        Self {
            number: pr.number,
            title: pr.title,
            state: PrState::from_api(&pr.state, pr.merged_at),
            author: pr.user.map(GithubAccount::from),
            created_at: pr.created_at,
            merged_at: pr.merged_at,
            closed_at: pr.closed_at,
        }
    }
}

#[derive(Deserialize)]
struct ReviewDto {
    id: i64,
    user: Option<UserDto>,
    state: String,
    body: Option<String>,
    submitted_at: Option<DateTime<Utc>>,
}

impl ReviewDto {
    /// Drafts have neither a submitted state nor a timestamp.
    fn into_review(self) -> Option<RemoteReview> {
        let state = ReviewState::from_api(&self.state)?;
        let submitted_at = self.submitted_at?;
        Some(RemoteReview {
            id: self.id,
            reviewer: self.user.map(GithubAccount::from),
            state,
            has_body: self.body.is_some_and(|b| !b.trim().is_empty()),
            submitted_at,
        })
    }
}

#[derive(Deserialize)]
struct ReviewCommentDto {
    id: i64,
    pull_request_review_id: Option<i64>,
}

#[derive(Deserialize)]
struct RateLimitDto {
    resources: RateLimitResources,
}

#[derive(Deserialize)]
struct RateLimitResources {
    core: RateLimitCore,
}

#[derive(Deserialize)]
struct RateLimitCore {
    limit: u32,
    remaining: u32,
    reset: i64,
}

//! `pull_request`: mirror pull requests, reviews and review comment counts.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{cancelled, WorkUnit, WorkerContext};
use crate::error::CoreResult;
use crate::github::{fetch_all, GithubAccount};
use crate::models::job::{Job, JobType};

pub struct PullRequestUnit {
    ctx: Arc<WorkerContext>,
}

impl PullRequestUnit {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl WorkUnit for PullRequestUnit {
    fn job_type(&self) -> JobType {
        JobType::PullRequest
    }

    async fn run(&self, job: &Job, cancel: &CancellationToken) -> CoreResult<()> {
        let ctx = &self.ctx;
        let github = ctx.github.as_ref();
        let upstream = ctx.target(job).await?.github_repository;
        let repo = upstream.full_name.as_str();

        let pulls = fetch_all(ctx.retry, cancel, "list_pull_requests", |page| {
            github.list_pull_requests(repo, page)
        })
        .await?;

        let mut accounts: BTreeMap<i64, GithubAccount> = BTreeMap::new();
        let mut review_count = 0;
        for pr in &pulls {
            if cancel.is_cancelled() {
                return Err(cancelled());
            }
            let reviews = fetch_all(ctx.retry, cancel, "list_reviews", |page| {
                github.list_reviews(repo, pr.number, page)
            })
            .await?;
            let comments = fetch_all(ctx.retry, cancel, "list_review_comments", |page| {
                github.list_review_comments(repo, pr.number, page)
            })
            .await?;

            let mut per_review: HashMap<i64, i32> = HashMap::new();
            for comment in &comments {
                if let Some(review_id) = comment.review_id {
                    *per_review.entry(review_id).or_default() += 1;
                }
            }

            let total_comments = i32::try_from(comments.len()).unwrap_or(i32::MAX);
            let stored = ctx
                .store
                .upsert_pull_request(upstream.id, pr, total_comments)
                .await?;
            for review in &reviews {
                let count = per_review.get(&review.id).copied().unwrap_or(0);
                ctx.store.upsert_review(&stored, review, count).await?;
                if let Some(reviewer) = &review.reviewer {
                    accounts.insert(reviewer.id, reviewer.clone());
                }
            }
            if let Some(author) = &pr.author {
                accounts.insert(author.id, author.clone());
            }
            review_count += reviews.len();
        }

        // Accounts seen here become candidates for identity association.
        for account in accounts.values() {
            ctx.store.upsert_github_person(account).await?;
        }

        // Only logged; one attempt, no backoff.
        let rate = github.get_rate_limit().await.ok();
        tracing::info!(
            job_id = %job.id,
            repository = %repo,
            pull_requests = pulls.len(),
            reviews = review_count,
            accounts = accounts.len(),
            rate_remaining = rate.map(|r| r.remaining),
            "Pull requests synced"
        );
        Ok(())
    }
}

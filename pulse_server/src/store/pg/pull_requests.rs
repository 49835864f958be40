use std::collections::BTreeSet;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use super::PgStore;
use crate::error::CoreResult;
use crate::github::{RemotePullRequest, RemoteReview};
use crate::models::pull_request::{PrReview, PullRequest};
use crate::schema::{pr_reviews, pull_requests};
use crate::store::{PullRequestStore, GHOST_LOGIN};

#[async_trait]
impl PullRequestStore for PgStore {
    async fn upsert_pull_request(
        &self,
        repository_id: Uuid,
        pr: &RemotePullRequest,
        review_comments: i32,
    ) -> CoreResult<PullRequest> {
        let mut conn = self.conn().await?;
        let row = PullRequest {
            id: Uuid::new_v4(),
            repository_id,
            number: pr.number,
            title: pr.title.clone(),
            user_login: pr
                .author
                .as_ref()
                .map_or_else(|| GHOST_LOGIN.to_string(), |a| a.login.clone()),
            state: pr.state.as_str().to_string(),
            review_comments,
            github_created_at: pr.created_at,
            merged_at: pr.merged_at,
            closed_at: pr.closed_at,
        };

        use pull_requests::dsl as p;
        Ok(diesel::insert_into(p::pull_requests)
            .values(&row)
            .on_conflict((p::repository_id, p::number))
            .do_update()
            .set((
                p::title.eq(excluded(p::title)),
                p::user_login.eq(excluded(p::user_login)),
                p::state.eq(excluded(p::state)),
                p::review_comments.eq(excluded(p::review_comments)),
                p::merged_at.eq(excluded(p::merged_at)),
                p::closed_at.eq(excluded(p::closed_at)),
            ))
            .get_result::<PullRequest>(&mut conn)
            .await?)
    }

    async fn upsert_review(
        &self,
        pr: &PullRequest,
        review: &RemoteReview,
        comment_count: i32,
    ) -> CoreResult<PrReview> {
        let mut conn = self.conn().await?;
        let row = PrReview {
            id: Uuid::new_v4(),
            repository_id: pr.repository_id,
            pr_id: pr.id,
            github_review_id: review.id,
            reviewer_login: review
                .reviewer
                .as_ref()
                .map_or_else(|| GHOST_LOGIN.to_string(), |a| a.login.clone()),
            state: review.state.as_str().to_string(),
            has_body: review.has_body,
            comment_count,
            github_created_at: review.submitted_at,
        };

        use pr_reviews::dsl as r;
        Ok(diesel::insert_into(r::pr_reviews)
            .values(&row)
            .on_conflict(r::github_review_id)
            .do_update()
            .set((
                r::reviewer_login.eq(excluded(r::reviewer_login)),
                r::state.eq(excluded(r::state)),
                r::has_body.eq(excluded(r::has_body)),
                r::comment_count.eq(excluded(r::comment_count)),
            ))
            .get_result::<PrReview>(&mut conn)
            .await?)
    }

    async fn pull_requests(&self, repository_id: Uuid) -> CoreResult<Vec<PullRequest>> {
        let mut conn = self.conn().await?;
        Ok(pull_requests::table
            .filter(pull_requests::repository_id.eq(repository_id))
            .order(pull_requests::number.asc())
            .load::<PullRequest>(&mut conn)
            .await?)
    }

    async fn reviews(&self, repository_id: Uuid) -> CoreResult<Vec<PrReview>> {
        let mut conn = self.conn().await?;
        Ok(pr_reviews::table
            .filter(pr_reviews::repository_id.eq(repository_id))
            .order((pr_reviews::github_created_at.asc(), pr_reviews::github_review_id.asc()))
            .load::<PrReview>(&mut conn)
            .await?)
    }

    async fn logins(&self, github_repository_ids: &[Uuid]) -> CoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let authors = pull_requests::table
            .filter(pull_requests::repository_id.eq_any(github_repository_ids))
            .select(pull_requests::user_login)
            .distinct()
            .load::<String>(&mut conn)
            .await?;
        let reviewers = pr_reviews::table
            .filter(pr_reviews::repository_id.eq_any(github_repository_ids))
            .select(pr_reviews::reviewer_login)
            .distinct()
            .load::<String>(&mut conn)
            .await?;

        let logins: BTreeSet<String> = authors
            .into_iter()
            .chain(reviewers)
            .filter(|login| login != GHOST_LOGIN)
            .collect();
        Ok(logins.into_iter().collect())
    }
}

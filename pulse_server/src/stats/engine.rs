//! Deterministic per-repository statistics compute.
//!
//! Attribution runs through the project's bindings: a commit belongs to the
//! account bound to its author's canonical email, a pull request or review to
//! the bound account with the same login. Unattributed activity is dropped.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use uuid::Uuid;

use super::filters::{PathFilters, WorkingWindow};
use crate::identity::MergeGraph;
use crate::models::commit::CommitWithFiles;
use crate::models::identity::IdentityBinding;
use crate::models::pull_request::{PrReview, PullRequest, ReviewState};
use crate::models::settings::{ProjectFilters, ScoreSettings};
use crate::models::statistics::PersonDayStats;
use crate::store::GHOST_LOGIN;

/// Everything one repository's recompute reads.
pub struct StatsInput<'a> {
    pub commits: &'a [CommitWithFiles],
    pub pull_requests: &'a [PullRequest],
    pub reviews: &'a [PrReview],
    pub merges: &'a MergeGraph,
    pub bindings: &'a [IdentityBinding],
    pub filters: &'a ProjectFilters,
}

#[derive(Debug, Default)]
struct Bucket {
    additions: i64,
    deletions: i64,
    commits: i32,
    prs_authored: i32,
    reviewed: BTreeSet<Uuid>,
    comments: i32,
}

/// Rows for every (account, day) with activity, ordered by that key.
pub fn compute(input: &StatsInput<'_>) -> Vec<PersonDayStats> {
    let paths = PathFilters::from_project(input.filters);
    let window = WorkingWindow::new(input.filters.working_hours);

    // Bindings arrive ordered by login, so an email bound to several
    // accounts goes to the first of them.
    let mut by_email: HashMap<String, Uuid> = HashMap::new();
    let mut by_login: HashMap<&str, Uuid> = HashMap::new();
    for binding in input.bindings {
        by_email
            .entry(input.merges.resolve(&binding.person.primary_email))
            .or_insert(binding.github_person.id);
        by_login.insert(binding.github_person.username.as_str(), binding.github_person.id);
    }

    let mut buckets: BTreeMap<(Uuid, NaiveDate), Bucket> = BTreeMap::new();

    for entry in input.commits {
        let commit = &entry.commit;
        if !window.permits(commit.commit_date) {
            continue;
        }
        let Some(&person) = by_email.get(&input.merges.resolve(&commit.author_email)) else {
            continue;
        };
        let bucket = buckets
            .entry((person, commit.commit_date.date_naive()))
            .or_default();
        bucket.commits += 1;
        for file in entry.files.iter().filter(|f| !paths.excludes(&f.path)) {
            bucket.additions += i64::from(file.additions);
            bucket.deletions += i64::from(file.deletions);
        }
    }

    for pr in input.pull_requests {
        if pr.user_login == GHOST_LOGIN {
            continue;
        }
        if let Some(&person) = by_login.get(pr.user_login.as_str()) {
            buckets
                .entry((person, pr.github_created_at.date_naive()))
                .or_default()
                .prs_authored += 1;
        }
    }

    for review in input.reviews {
        if review.reviewer_login == GHOST_LOGIN {
            continue;
        }
        let Some(&person) = by_login.get(review.reviewer_login.as_str()) else {
            continue;
        };
        let bucket = buckets
            .entry((person, review.github_created_at.date_naive()))
            .or_default();
        bucket.reviewed.insert(review.pr_id);
        let commented = review.review_state().ok() == Some(ReviewState::Commented);
        if commented || review.has_body {
            bucket.comments += 1;
        }
    }

    buckets
        .into_iter()
        .map(|((github_person_id, stat_date), bucket)| {
            let mut row = PersonDayStats {
                github_person_id,
                stat_date,
                additions: bucket.additions,
                deletions: bucket.deletions,
                commits: bucket.commits,
                prs_authored: bucket.prs_authored,
                prs_reviewed: i32::try_from(bucket.reviewed.len()).unwrap_or(i32::MAX),
                comments: bucket.comments,
                score: 0.0,
            };
            row.score = score(&input.filters.score, &row);
            row
        })
        .collect()
}

pub fn score(weights: &ScoreSettings, row: &PersonDayStats) -> f64 {
    row.additions as f64 * weights.additions
        + row.deletions as f64 * weights.deletions
        + f64::from(row.commits) * weights.commits
        + f64::from(row.prs_authored) * weights.pull_requests
        + f64::from(row.comments) * weights.comments
}

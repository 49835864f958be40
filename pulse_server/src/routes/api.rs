//! Request and response bodies for the JSON API.

use serde::{Deserialize, Serialize};

use crate::models::job::Job;

/// Largest suggestion list a caller may ask for.
const MAX_SUGGESTIONS: usize = 50;
const DEFAULT_SUGGESTIONS: usize = 10;

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    /// `all`, `day`, `week`, `month` or `year`.
    pub grain: Option<String>,
    /// Period key for the grain, e.g. `2024-W11`.
    pub key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MergeRequest {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Deserialize)]
pub struct MergeDeleteQuery {
    pub source: String,
}

#[derive(Debug, Deserialize)]
pub struct AssociationRequest {
    pub login: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct SuggestionQuery {
    pub username: String,
    pub limit: Option<usize>,
}

impl SuggestionQuery {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_SUGGESTIONS).clamp(1, MAX_SUGGESTIONS)
    }
}

/// Jobs created by one enqueue or retry call, in chain order.
#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub jobs: Vec<Job>,
}

impl From<Vec<Job>> for EnqueueResponse {
    fn from(jobs: Vec<Job>) -> Self {
        Self { jobs }
    }
}

impl From<Job> for EnqueueResponse {
    fn from(job: Job) -> Self {
        Self { jobs: vec![job] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggestion_limit_is_bounded() {
        let query = |limit| SuggestionQuery {
            username: "ada".to_string(),
            limit,
        };
        assert_eq!(query(None).limit(), 10);
        assert_eq!(query(Some(0)).limit(), 1);
        assert_eq!(query(Some(500)).limit(), 50);
    }
}

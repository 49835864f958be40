//! Per-(project, repository, person, day) aggregates written by the stats worker.

use chrono::NaiveDate;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::people_statistics;

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = people_statistics)]
pub struct PeopleStatistics {
    pub id: Uuid,
    pub project_id: Uuid,
    pub repository_id: Uuid,
    pub github_person_id: Uuid,
    pub stat_date: NaiveDate,
    pub additions: i64,
    pub deletions: i64,
    pub commits: i32,
    pub prs_authored: i32,
    pub prs_reviewed: i32,
    pub comments: i32,
    pub score: f64,
}

/// Computed values for one (person, day) of a repository, before they are
/// stored under a project and repository.
#[derive(Debug, Clone, PartialEq)]
pub struct PersonDayStats {
    pub github_person_id: Uuid,
    pub stat_date: NaiveDate,
    pub additions: i64,
    pub deletions: i64,
    pub commits: i32,
    pub prs_authored: i32,
    pub prs_reviewed: i32,
    pub comments: i32,
    pub score: f64,
}

impl PersonDayStats {
    /// Row for `(project_id, repository_id)`, reusing `id` when the natural
    /// key already has one.
    pub fn into_row(self, id: Uuid, project_id: Uuid, repository_id: Uuid) -> PeopleStatistics {
        PeopleStatistics {
            id,
            project_id,
            repository_id,
            github_person_id: self.github_person_id,
            stat_date: self.stat_date,
            additions: self.additions,
            deletions: self.deletions,
            commits: self.commits,
            prs_authored: self.prs_authored,
            prs_reviewed: self.prs_reviewed,
            comments: self.comments,
            score: self.score,
        }
    }
}

//! Canonical people, platform accounts, and the bindings and merges between them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::schema::{email_merges, github_people, github_person_emails, people};

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = people)]
pub struct Person {
    pub id: Uuid,
    pub name: String,
    pub primary_email: String,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = github_people)]
pub struct GithubPerson {
    pub id: Uuid,
    pub github_user_id: i64,
    pub username: String,
    pub person_type: String,
}

impl GithubPerson {
    pub fn account_type(&self) -> Result<AccountType, CoreError> {
        self.person_type.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    User,
    Bot,
    Organization,
}

impl AccountType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Bot => "Bot",
            Self::Organization => "Organization",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "User" => Ok(Self::User),
            "Bot" => Ok(Self::Bot),
            "Organization" => Ok(Self::Organization),
            other => Err(CoreError::internal(format!("unknown account type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = github_person_emails)]
pub struct GithubPersonEmail {
    pub id: Uuid,
    pub project_id: Uuid,
    pub github_person_id: Uuid,
    pub person_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = email_merges)]
pub struct EmailMerge {
    pub id: Uuid,
    pub project_id: Uuid,
    pub source_email: String,
    pub target_email: String,
    pub created_at: DateTime<Utc>,
}

/// A project binding joined with both of its ends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentityBinding {
    pub binding: GithubPersonEmail,
    pub person: Person,
    pub github_person: GithubPerson,
}

/// Normalised form used for every email comparison.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

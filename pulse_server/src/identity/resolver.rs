//! Project-scoped identity operations over the identity store.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use super::merge_graph::MergeGraph;
use super::similarity::{self, EmailSuggestion};
use crate::error::{CoreError, CoreResult};
use crate::github::GithubApi;
use crate::models::identity::{normalize_email, EmailMerge, GithubPerson, IdentityBinding};
use crate::store::Store;

/// Emails and accounts an operator can pair up.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Candidates {
    /// Canonical commit emails, merges applied.
    pub emails: Vec<String>,
    /// Pull request authors and reviewers.
    pub logins: Vec<String>,
}

#[derive(Clone)]
pub struct Resolver {
    store: Arc<dyn Store>,
    github: Option<Arc<dyn GithubApi>>,
}

impl Resolver {
    /// With `github`, associations may name accounts not yet seen in pull requests.
    pub fn new(store: Arc<dyn Store>, github: Option<Arc<dyn GithubApi>>) -> Self {
        Self { store, github }
    }

    pub async fn graph(&self, project_id: Uuid) -> CoreResult<MergeGraph> {
        Ok(MergeGraph::from_merges(&self.store.merges(project_id).await?))
    }

    pub async fn create_merge(&self, project_id: Uuid, source: &str, target: &str) -> CoreResult<EmailMerge> {
        let merge = self.store.create_merge(project_id, source, target).await?;
        tracing::info!(
            project_id = %project_id,
            source = %merge.source_email,
            target = %merge.target_email,
            "Emails merged"
        );
        Ok(merge)
    }

    pub async fn delete_merge(&self, project_id: Uuid, source: &str) -> CoreResult<()> {
        self.store.delete_merge(project_id, source).await?;
        tracing::info!(project_id = %project_id, source, "Email merge removed");
        Ok(())
    }

    pub async fn resolve_email(&self, project_id: Uuid, email: &str) -> CoreResult<String> {
        Ok(self.graph(project_id).await?.resolve(email))
    }

    /// Every merged source mapped to its ultimate target.
    pub async fn merged_emails_for_project(&self, project_id: Uuid) -> CoreResult<BTreeMap<String, String>> {
        Ok(self.graph(project_id).await?.closure())
    }

    /// Commit emails of the project's repositories with merges applied.
    pub async fn canonical_emails(&self, project_id: Uuid) -> CoreResult<Vec<String>> {
        let graph = self.graph(project_id).await?;
        let emails = self.store.author_emails(&self.upstream_ids(project_id).await?).await?;
        let canonical: BTreeSet<String> = emails.iter().map(|e| graph.resolve(e)).collect();
        Ok(canonical.into_iter().collect())
    }

    pub async fn candidate_emails(&self, project_id: Uuid) -> CoreResult<Candidates> {
        let upstream = self.upstream_ids(project_id).await?;
        Ok(Candidates {
            emails: self.canonical_emails(project_id).await?,
            logins: self.store.logins(&upstream).await?,
        })
    }

    /// Canonical emails ranked by similarity to `username`, leaving out
    /// emails already bound in the project.
    pub async fn suggest_emails(
        &self,
        project_id: Uuid,
        username: &str,
        limit: usize,
    ) -> CoreResult<Vec<EmailSuggestion>> {
        let graph = self.graph(project_id).await?;
        let bound: BTreeSet<String> = self
            .store
            .bindings(project_id)
            .await?
            .iter()
            .map(|b| graph.resolve(&b.person.primary_email))
            .collect();
        let emails = self.canonical_emails(project_id).await?;
        let mut ranked = similarity::rank(
            username,
            emails
                .iter()
                .filter(|e| !bound.contains(e.as_str()))
                .map(String::as_str),
        );
        ranked.truncate(limit);
        Ok(ranked)
    }

    /// Bind the account `login` to the person owning `email` (after merges).
    pub async fn associate(&self, project_id: Uuid, login: &str, email: &str) -> CoreResult<IdentityBinding> {
        self.store.get_project(project_id).await?;
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(CoreError::InvalidInput("email must not be empty".to_string()));
        }
        let canonical = self.resolve_email(project_id, &email).await?;
        let github_person = self.github_person(login).await?;
        let person = self.store.get_or_create_person(&canonical, login).await?;
        let binding = self
            .store
            .bind(project_id, github_person.id, person.id)
            .await?;
        tracing::info!(
            project_id = %project_id,
            login,
            email = %canonical,
            "Account associated"
        );
        Ok(IdentityBinding {
            binding,
            person,
            github_person,
        })
    }

    pub async fn dissociate(&self, project_id: Uuid, login: &str) -> CoreResult<()> {
        let github_person = self
            .store
            .github_person_by_login(login)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("unknown account {login}")))?;
        self.store.unbind(project_id, github_person.id).await?;
        tracing::info!(project_id = %project_id, login, "Account dissociated");
        Ok(())
    }

    pub async fn bindings(&self, project_id: Uuid) -> CoreResult<Vec<IdentityBinding>> {
        self.store.bindings(project_id).await
    }

    async fn github_person(&self, login: &str) -> CoreResult<GithubPerson> {
        if let Some(person) = self.store.github_person_by_login(login).await? {
            return Ok(person);
        }
        let Some(github) = &self.github else {
            return Err(CoreError::not_found(format!("unknown account {login}")));
        };
        let account = github.get_user(login).await?;
        self.store.upsert_github_person(&account).await
    }

    async fn upstream_ids(&self, project_id: Uuid) -> CoreResult<Vec<Uuid>> {
        Ok(self
            .store
            .project_targets(project_id)
            .await?
            .into_iter()
            .map(|t| t.github_repository.id)
            .collect())
    }
}

//! In-memory store for tests. Mirrors the constraints the PostgreSQL schema
//! enforces (uniqueness, cascades are not modelled).

use std::collections::{BTreeSet, HashMap};
use std::ops::RangeInclusive;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use super::{
    CommitStore, IdentityStore, ProjectStore, PullRequestStore, RepositoryStore, StatsStore,
    GHOST_LOGIN,
};
use crate::error::{CoreError, CoreResult};
use crate::git::WalkedCommit;
use crate::github::{GithubAccount, RemotePullRequest, RemoteReview};
use crate::identity::merge_graph::MergeGraph;
use crate::models::commit::{Commit, CommitFile, CommitWithFiles};
use crate::models::identity::{
    normalize_email, EmailMerge, GithubPerson, GithubPersonEmail, IdentityBinding, Person,
};
use crate::models::project::{GithubRepository, Project, ProjectRepository, RepositoryTarget};
use crate::models::pull_request::{PrReview, PullRequest};
use crate::models::settings::{
    ExcludedExtension, ExcludedFolder, ProjectFilters, ProjectUpdateSettings, ScoreSettings,
    WorkingHoursSettings,
};
use crate::models::statistics::{PeopleStatistics, PersonDayStats};

#[derive(Default)]
struct State {
    projects: Vec<Project>,
    github_repositories: Vec<GithubRepository>,
    project_repositories: Vec<ProjectRepository>,
    commits: Vec<Commit>,
    commit_files: Vec<CommitFile>,
    pull_requests: Vec<PullRequest>,
    reviews: Vec<PrReview>,
    people: Vec<Person>,
    github_people: Vec<GithubPerson>,
    bindings: Vec<GithubPersonEmail>,
    merges: Vec<EmailMerge>,
    extensions: Vec<ExcludedExtension>,
    folders: Vec<ExcludedFolder>,
    scores: HashMap<Uuid, ScoreSettings>,
    working_hours: HashMap<Uuid, WorkingHoursSettings>,
    updates: HashMap<Uuid, ProjectUpdateSettings>,
    stats: Vec<PeopleStatistics>,
    /// Fails the next stats replacement, to exercise rollback.
    fail_next_stats_write: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self.state.lock().expect("memory store poisoned");
        f(&mut state)
    }

    pub fn fail_next_stats_write(&self) {
        self.with(|s| s.fail_next_stats_write = true);
    }

    pub fn commit_count(&self, github_repository_id: Uuid) -> usize {
        self.with(|s| {
            s.commits
                .iter()
                .filter(|c| c.github_repository_id == github_repository_id)
                .count()
        })
    }

    pub fn commit_file_count(&self) -> usize {
        self.with(|s| s.commit_files.len())
    }

    pub fn github_repository(&self, id: Uuid) -> Option<GithubRepository> {
        self.with(|s| s.github_repositories.iter().find(|r| r.id == id).cloned())
    }

    pub fn reset_ingested_sha(&self, github_repository_id: Uuid) {
        self.with(|s| {
            for repo in s.github_repositories.iter_mut().filter(|r| r.id == github_repository_id) {
                repo.ingested_sha = None;
            }
        });
    }

    pub fn update_settings(&self, project_id: Uuid) -> Option<ProjectUpdateSettings> {
        self.with(|s| s.updates.get(&project_id).cloned())
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn create_project(&self, project: Project) -> CoreResult<Project> {
        self.with(|s| {
            s.projects.push(project.clone());
            Ok(project)
        })
    }

    async fn get_project(&self, project_id: Uuid) -> CoreResult<Project> {
        self.with(|s| {
            s.projects
                .iter()
                .find(|p| p.id == project_id)
                .cloned()
                .ok_or_else(|| CoreError::not_found(format!("project {project_id} not found")))
        })
    }

    async fn project_filters(&self, project_id: Uuid) -> CoreResult<ProjectFilters> {
        self.with(|s| {
            let mut excluded_extensions: Vec<String> = s
                .extensions
                .iter()
                .filter(|e| e.project_id == project_id)
                .map(|e| e.value.clone())
                .collect();
            excluded_extensions.sort();
            let mut excluded_folders: Vec<String> = s
                .folders
                .iter()
                .filter(|f| f.project_id == project_id)
                .map(|f| f.value.clone())
                .collect();
            excluded_folders.sort();
            Ok(ProjectFilters {
                excluded_extensions,
                excluded_folders,
                score: s
                    .scores
                    .get(&project_id)
                    .copied()
                    .unwrap_or_else(|| ScoreSettings::defaults(project_id)),
                working_hours: s.working_hours.get(&project_id).copied(),
            })
        })
    }

    async fn set_score_settings(&self, settings: ScoreSettings) -> CoreResult<()> {
        settings.validate()?;
        self.with(|s| s.scores.insert(settings.project_id, settings));
        Ok(())
    }

    async fn set_working_hours(
        &self,
        project_id: Uuid,
        settings: Option<WorkingHoursSettings>,
    ) -> CoreResult<()> {
        match settings {
            Some(settings) => {
                settings.validate()?;
                self.with(|s| {
                    s.working_hours.insert(
                        project_id,
                        WorkingHoursSettings {
                            project_id,
                            ..settings
                        },
                    )
                });
            }
            None => {
                self.with(|s| s.working_hours.remove(&project_id));
            }
        }
        Ok(())
    }

    async fn add_excluded_extension(
        &self,
        project_id: Uuid,
        value: &str,
    ) -> CoreResult<ExcludedExtension> {
        let value = value.trim().to_string();
        self.with(|s| {
            if s.extensions.iter().any(|e| e.project_id == project_id && e.value == value) {
                return Err(CoreError::conflict(format!("{value} is already excluded")));
            }
            let row = ExcludedExtension {
                id: Uuid::new_v4(),
                project_id,
                value,
            };
            s.extensions.push(row.clone());
            Ok(row)
        })
    }

    async fn add_excluded_folder(&self, project_id: Uuid, value: &str) -> CoreResult<ExcludedFolder> {
        let value = value.trim().to_string();
        self.with(|s| {
            if s.folders.iter().any(|f| f.project_id == project_id && f.value == value) {
                return Err(CoreError::conflict(format!("{value} is already excluded")));
            }
            let row = ExcludedFolder {
                id: Uuid::new_v4(),
                project_id,
                value,
            };
            s.folders.push(row.clone());
            Ok(row)
        })
    }

    async fn set_update_settings(&self, settings: ProjectUpdateSettings) -> CoreResult<()> {
        settings.validate()?;
        self.with(|s| {
            let last_triggered_at = s
                .updates
                .get(&settings.project_id)
                .and_then(|u| u.last_triggered_at);
            s.updates.insert(
                settings.project_id,
                ProjectUpdateSettings {
                    last_triggered_at,
                    ..settings
                },
            );
        });
        Ok(())
    }

    async fn due_projects(&self, hour: i32) -> CoreResult<Vec<ProjectUpdateSettings>> {
        self.with(|s| {
            let mut due: Vec<_> = s
                .updates
                .values()
                .filter(|u| u.auto_update_enabled && u.auto_update_hour == hour)
                .cloned()
                .collect();
            due.sort_by_key(|u| u.project_id);
            Ok(due)
        })
    }

    async fn claim_update_slot(
        &self,
        project_id: Uuid,
        hour_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> CoreResult<bool> {
        self.with(|s| {
            let Some(settings) = s.updates.get_mut(&project_id) else {
                return Ok(false);
            };
            if settings.last_triggered_at.is_some_and(|at| at >= hour_start) {
                return Ok(false);
            }
            settings.last_triggered_at = Some(now);
            Ok(true)
        })
    }
}

#[async_trait]
impl RepositoryStore for MemoryStore {
    async fn upsert_github_repository(&self, repo: GithubRepository) -> CoreResult<GithubRepository> {
        self.with(|s| {
            if let Some(existing) = s
                .github_repositories
                .iter_mut()
                .find(|r| r.github_repo_id == repo.github_repo_id)
            {
                existing.full_name = repo.full_name;
                existing.clone_url = repo.clone_url;
                existing.default_branch = repo.default_branch;
                return Ok(existing.clone());
            }
            s.github_repositories.push(repo.clone());
            Ok(repo)
        })
    }

    async fn add_project_repository(
        &self,
        project_id: Uuid,
        github_repository_id: Uuid,
    ) -> CoreResult<ProjectRepository> {
        self.with(|s| {
            if s.project_repositories
                .iter()
                .any(|r| r.project_id == project_id && r.github_repository_id == github_repository_id)
            {
                return Err(CoreError::conflict("repository is already part of the project"));
            }
            let row = ProjectRepository::new(project_id, github_repository_id);
            s.project_repositories.push(row.clone());
            Ok(row)
        })
    }

    async fn set_tracked(&self, project_repository_id: Uuid, tracked: bool) -> CoreResult<()> {
        self.with(|s| {
            let row = s
                .project_repositories
                .iter_mut()
                .find(|r| r.id == project_repository_id)
                .ok_or_else(|| {
                    CoreError::not_found(format!("project repository {project_repository_id} not found"))
                })?;
            row.is_tracked = tracked;
            Ok(())
        })
    }

    async fn repository_target(&self, project_repository_id: Uuid) -> CoreResult<RepositoryTarget> {
        self.with(|s| {
            let project_repository = s
                .project_repositories
                .iter()
                .find(|r| r.id == project_repository_id)
                .cloned()
                .ok_or_else(|| {
                    CoreError::not_found(format!("project repository {project_repository_id} not found"))
                })?;
            let github_repository = s
                .github_repositories
                .iter()
                .find(|r| r.id == project_repository.github_repository_id)
                .cloned()
                .ok_or_else(|| CoreError::not_found("upstream repository not found"))?;
            Ok(RepositoryTarget {
                project_repository,
                github_repository,
            })
        })
    }

    async fn project_targets(&self, project_id: Uuid) -> CoreResult<Vec<RepositoryTarget>> {
        let ids: Vec<Uuid> = self.with(|s| {
            let mut rows: Vec<&ProjectRepository> = s
                .project_repositories
                .iter()
                .filter(|r| r.project_id == project_id)
                .collect();
            rows.sort_by_key(|r| (r.created_at, r.id));
            rows.into_iter().map(|r| r.id).collect()
        });
        let mut targets = Vec::with_capacity(ids.len());
        for id in ids {
            targets.push(self.repository_target(id).await?);
        }
        Ok(targets)
    }

    async fn mark_cloned(&self, github_repository_id: Uuid, head_sha: Option<&str>) -> CoreResult<()> {
        self.with(|s| {
            for repo in s.github_repositories.iter_mut().filter(|r| r.id == github_repository_id) {
                repo.is_cloned = true;
                repo.head_sha = head_sha.map(str::to_string);
            }
            for row in s
                .project_repositories
                .iter_mut()
                .filter(|r| r.github_repository_id == github_repository_id)
            {
                row.is_cloned = true;
            }
        });
        Ok(())
    }

    async fn set_ingested_sha(&self, github_repository_id: Uuid, sha: &str) -> CoreResult<()> {
        self.with(|s| {
            for repo in s.github_repositories.iter_mut().filter(|r| r.id == github_repository_id) {
                repo.ingested_sha = Some(sha.to_string());
            }
        });
        Ok(())
    }
}

#[async_trait]
impl CommitStore for MemoryStore {
    async fn insert_commits(
        &self,
        github_repository_id: Uuid,
        walked: &[WalkedCommit],
    ) -> CoreResult<usize> {
        self.with(|s| {
            let mut inserted = 0;
            for commit in walked {
                if s.commits
                    .iter()
                    .any(|c| c.github_repository_id == github_repository_id && c.sha == commit.sha)
                {
                    continue;
                }
                let commit_id = Uuid::new_v4();
                s.commits.push(Commit {
                    id: commit_id,
                    github_repository_id,
                    sha: commit.sha.clone(),
                    author_email: commit.author_email.clone(),
                    author_name: commit.author_name.clone(),
                    commit_date: commit.commit_date,
                    message: commit.message.clone(),
                });
                s.commit_files.extend(commit.files.iter().map(|f| CommitFile {
                    id: Uuid::new_v4(),
                    commit_id,
                    path: f.path.clone(),
                    additions: f.additions,
                    deletions: f.deletions,
                    status: f.status.as_str().to_string(),
                }));
                inserted += 1;
            }
            Ok(inserted)
        })
    }

    async fn commits_with_files(&self, github_repository_id: Uuid) -> CoreResult<Vec<CommitWithFiles>> {
        self.with(|s| {
            let mut commits: Vec<CommitWithFiles> = s
                .commits
                .iter()
                .filter(|c| c.github_repository_id == github_repository_id)
                .map(|c| {
                    let mut files: Vec<CommitFile> = s
                        .commit_files
                        .iter()
                        .filter(|f| f.commit_id == c.id)
                        .cloned()
                        .collect();
                    files.sort_by(|a, b| a.path.cmp(&b.path));
                    CommitWithFiles {
                        commit: c.clone(),
                        files,
                    }
                })
                .collect();
            commits.sort_by(|a, b| {
                (a.commit.commit_date, &a.commit.sha).cmp(&(b.commit.commit_date, &b.commit.sha))
            });
            Ok(commits)
        })
    }

    async fn author_emails(&self, github_repository_ids: &[Uuid]) -> CoreResult<Vec<String>> {
        self.with(|s| {
            let emails: BTreeSet<String> = s
                .commits
                .iter()
                .filter(|c| github_repository_ids.contains(&c.github_repository_id))
                .map(|c| normalize_email(&c.author_email))
                .filter(|e| !e.is_empty())
                .collect();
            Ok(emails.into_iter().collect())
        })
    }
}

fn login_of(account: Option<&GithubAccount>) -> String {
    account.map_or_else(|| GHOST_LOGIN.to_string(), |a| a.login.clone())
}

#[async_trait]
impl PullRequestStore for MemoryStore {
    async fn upsert_pull_request(
        &self,
        repository_id: Uuid,
        pr: &RemotePullRequest,
        review_comments: i32,
    ) -> CoreResult<PullRequest> {
        self.with(|s| {
            let user_login = login_of(pr.author.as_ref());
            if let Some(existing) = s
                .pull_requests
                .iter_mut()
                .find(|p| p.repository_id == repository_id && p.number == pr.number)
            {
                existing.title = pr.title.clone();
                existing.user_login = user_login;
                existing.state = pr.state.as_str().to_string();
                existing.review_comments = review_comments;
                existing.merged_at = pr.merged_at;
                existing.closed_at = pr.closed_at;
                return Ok(existing.clone());
            }
            let row = PullRequest {
                id: Uuid::new_v4(),
                repository_id,
                number: pr.number,
                title: pr.title.clone(),
                user_login,
                state: pr.state.as_str().to_string(),
                review_comments,
                github_created_at: pr.created_at,
                merged_at: pr.merged_at,
                closed_at: pr.closed_at,
            };
            s.pull_requests.push(row.clone());
            Ok(row)
        })
    }

    async fn upsert_review(
        &self,
        pr: &PullRequest,
        review: &RemoteReview,
        comment_count: i32,
    ) -> CoreResult<PrReview> {
        self.with(|s| {
            let reviewer_login = login_of(review.reviewer.as_ref());
            if let Some(existing) = s
                .reviews
                .iter_mut()
                .find(|r| r.github_review_id == review.id)
            {
                existing.reviewer_login = reviewer_login;
                existing.state = review.state.as_str().to_string();
                existing.has_body = review.has_body;
                existing.comment_count = comment_count;
                return Ok(existing.clone());
            }
            let row = PrReview {
                id: Uuid::new_v4(),
                repository_id: pr.repository_id,
                pr_id: pr.id,
                github_review_id: review.id,
                reviewer_login,
                state: review.state.as_str().to_string(),
                has_body: review.has_body,
                comment_count,
                github_created_at: review.submitted_at,
            };
            s.reviews.push(row.clone());
            Ok(row)
        })
    }

    async fn pull_requests(&self, repository_id: Uuid) -> CoreResult<Vec<PullRequest>> {
        self.with(|s| {
            let mut prs: Vec<_> = s
                .pull_requests
                .iter()
                .filter(|p| p.repository_id == repository_id)
                .cloned()
                .collect();
            prs.sort_by_key(|p| p.number);
            Ok(prs)
        })
    }

    async fn reviews(&self, repository_id: Uuid) -> CoreResult<Vec<PrReview>> {
        self.with(|s| {
            let mut reviews: Vec<_> = s
                .reviews
                .iter()
                .filter(|r| r.repository_id == repository_id)
                .cloned()
                .collect();
            reviews.sort_by_key(|r| (r.github_created_at, r.github_review_id));
            Ok(reviews)
        })
    }

    async fn logins(&self, github_repository_ids: &[Uuid]) -> CoreResult<Vec<String>> {
        self.with(|s| {
            let logins: BTreeSet<String> = s
                .pull_requests
                .iter()
                .filter(|p| github_repository_ids.contains(&p.repository_id))
                .map(|p| p.user_login.clone())
                .chain(
                    s.reviews
                        .iter()
                        .filter(|r| github_repository_ids.contains(&r.repository_id))
                        .map(|r| r.reviewer_login.clone()),
                )
                .filter(|login| login != GHOST_LOGIN)
                .collect();
            Ok(logins.into_iter().collect())
        })
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn merges(&self, project_id: Uuid) -> CoreResult<Vec<EmailMerge>> {
        self.with(|s| {
            let mut merges: Vec<_> = s
                .merges
                .iter()
                .filter(|m| m.project_id == project_id)
                .cloned()
                .collect();
            merges.sort_by(|a, b| a.source_email.cmp(&b.source_email));
            Ok(merges)
        })
    }

    async fn create_merge(&self, project_id: Uuid, source: &str, target: &str) -> CoreResult<EmailMerge> {
        let source = normalize_email(source);
        let target = normalize_email(target);
        self.with(|s| {
            if !s.projects.iter().any(|p| p.id == project_id) {
                return Err(CoreError::not_found(format!("project {project_id} not found")));
            }
            let existing: Vec<EmailMerge> = s
                .merges
                .iter()
                .filter(|m| m.project_id == project_id)
                .cloned()
                .collect();
            MergeGraph::from_merges(&existing).check_new_edge(&source, &target)?;
            let merge = EmailMerge {
                id: Uuid::new_v4(),
                project_id,
                source_email: source,
                target_email: target,
                created_at: Utc::now(),
            };
            s.merges.push(merge.clone());
            Ok(merge)
        })
    }

    async fn delete_merge(&self, project_id: Uuid, source: &str) -> CoreResult<()> {
        let source = normalize_email(source);
        self.with(|s| {
            let before = s.merges.len();
            s.merges
                .retain(|m| !(m.project_id == project_id && m.source_email == source));
            if s.merges.len() == before {
                return Err(CoreError::not_found(format!("no merge from {source}")));
            }
            Ok(())
        })
    }

    async fn bindings(&self, project_id: Uuid) -> CoreResult<Vec<IdentityBinding>> {
        self.with(|s| {
            let mut bindings: Vec<IdentityBinding> = s
                .bindings
                .iter()
                .filter(|b| b.project_id == project_id)
                .filter_map(|b| {
                    let person = s.people.iter().find(|p| p.id == b.person_id)?;
                    let github_person = s.github_people.iter().find(|g| g.id == b.github_person_id)?;
                    Some(IdentityBinding {
                        binding: b.clone(),
                        person: person.clone(),
                        github_person: github_person.clone(),
                    })
                })
                .collect();
            bindings.sort_by(|a, b| a.github_person.username.cmp(&b.github_person.username));
            Ok(bindings)
        })
    }

    async fn has_bindings(&self, project_id: Uuid) -> CoreResult<bool> {
        self.with(|s| Ok(s.bindings.iter().any(|b| b.project_id == project_id)))
    }

    async fn get_or_create_person(&self, email: &str, name: &str) -> CoreResult<Person> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(CoreError::InvalidInput("email must not be empty".to_string()));
        }
        self.with(|s| {
            if let Some(person) = s.people.iter().find(|p| p.primary_email == email) {
                return Ok(person.clone());
            }
            let person = Person {
                id: Uuid::new_v4(),
                name: name.to_string(),
                primary_email: email,
            };
            s.people.push(person.clone());
            Ok(person)
        })
    }

    async fn upsert_github_person(&self, account: &GithubAccount) -> CoreResult<GithubPerson> {
        self.with(|s| {
            if let Some(existing) = s
                .github_people
                .iter_mut()
                .find(|g| g.github_user_id == account.id)
            {
                existing.username = account.login.clone();
                existing.person_type = account.account_type.as_str().to_string();
                return Ok(existing.clone());
            }
            let row = GithubPerson {
                id: Uuid::new_v4(),
                github_user_id: account.id,
                username: account.login.clone(),
                person_type: account.account_type.as_str().to_string(),
            };
            s.github_people.push(row.clone());
            Ok(row)
        })
    }

    async fn github_person_by_login(&self, login: &str) -> CoreResult<Option<GithubPerson>> {
        self.with(|s| {
            Ok(s.github_people
                .iter()
                .filter(|g| g.username == login)
                .min_by_key(|g| g.github_user_id)
                .cloned())
        })
    }

    async fn bind(
        &self,
        project_id: Uuid,
        github_person_id: Uuid,
        person_id: Uuid,
    ) -> CoreResult<GithubPersonEmail> {
        self.with(|s| {
            if s.bindings
                .iter()
                .any(|b| b.project_id == project_id && b.github_person_id == github_person_id)
            {
                return Err(CoreError::conflict("account is already associated in this project"));
            }
            let row = GithubPersonEmail {
                id: Uuid::new_v4(),
                project_id,
                github_person_id,
                person_id,
            };
            s.bindings.push(row.clone());
            Ok(row)
        })
    }

    async fn unbind(&self, project_id: Uuid, github_person_id: Uuid) -> CoreResult<()> {
        self.with(|s| {
            let before = s.bindings.len();
            s.bindings
                .retain(|b| !(b.project_id == project_id && b.github_person_id == github_person_id));
            if s.bindings.len() == before {
                return Err(CoreError::not_found("association not found"));
            }
            Ok(())
        })
    }
}

#[async_trait]
impl StatsStore for MemoryStore {
    async fn replace_repository_stats(
        &self,
        project_id: Uuid,
        repository_id: Uuid,
        rows: Vec<PersonDayStats>,
    ) -> CoreResult<()> {
        self.with(|s| {
            if std::mem::take(&mut s.fail_next_stats_write) {
                return Err(CoreError::TransientIo("injected stats write failure".to_string()));
            }
            let existing: HashMap<(Uuid, NaiveDate), Uuid> = s
                .stats
                .iter()
                .filter(|r| r.project_id == project_id && r.repository_id == repository_id)
                .map(|r| ((r.github_person_id, r.stat_date), r.id))
                .collect();
            s.stats
                .retain(|r| !(r.project_id == project_id && r.repository_id == repository_id));
            s.stats.extend(rows.into_iter().map(|r| {
                let id = existing
                    .get(&(r.github_person_id, r.stat_date))
                    .copied()
                    .unwrap_or_else(Uuid::new_v4);
                r.into_row(id, project_id, repository_id)
            }));
            Ok(())
        })
    }

    async fn project_stats(
        &self,
        project_id: Uuid,
        dates: Option<RangeInclusive<NaiveDate>>,
    ) -> CoreResult<Vec<PeopleStatistics>> {
        self.with(|s| {
            let mut rows: Vec<_> = s
                .stats
                .iter()
                .filter(|r| r.project_id == project_id)
                .filter(|r| dates.as_ref().is_none_or(|d| d.contains(&r.stat_date)))
                .cloned()
                .collect();
            rows.sort_by_key(|r| (r.stat_date, r.repository_id, r.github_person_id));
            Ok(rows)
        })
    }
}

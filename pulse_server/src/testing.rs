//! Shared fixtures and scripted facades for unit tests.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::git::{Git, GitError, WalkedCommit, WalkedFile};
use crate::github::{
    GithubAccount, GithubApi, GithubError, Page, RateLimit, RemotePullRequest, RemoteRepository,
    RemoteReview, RemoteReviewComment,
};
use crate::models::commit::FileStatus;
use crate::models::identity::{AccountType, GithubPerson};
use crate::models::job::Job;
use crate::models::project::{GithubRepository, Project, RepositoryTarget};
use crate::models::pull_request::{PrState, PullRequest, ReviewState};
use crate::retry::RetryConfig;
use crate::store::memory::MemoryStore;
use crate::store::{IdentityStore, ProjectStore, PullRequestStore, RepositoryStore, CommitStore};
use crate::workers::{units, RepoLocks, WorkerContext};

/// A project with one tracked repository, `octo/widgets`.
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub project_id: Uuid,
    pub repo: RepositoryTarget,
}

impl Fixture {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let project = store
            .create_project(Project::new("pulse", Uuid::new_v4()))
            .await
            .unwrap();
        let repo = add_repository(&store, project.id, 1, "octo/widgets").await;
        Self {
            store,
            project_id: project.id,
            repo,
        }
    }

    pub async fn add_repository(&self, github_repo_id: i64, full_name: &str) -> RepositoryTarget {
        add_repository(&self.store, self.project_id, github_repo_id, full_name).await
    }

    /// Another project tracking this fixture's upstream.
    pub async fn second_project_with_same_upstream(&self) -> RepositoryTarget {
        let project = self
            .store
            .create_project(Project::new("second", Uuid::new_v4()))
            .await
            .unwrap();
        let row = self
            .store
            .add_project_repository(project.id, self.repo.github_repository.id)
            .await
            .unwrap();
        self.store.repository_target(row.id).await.unwrap()
    }

    /// Record a platform account as seen.
    pub async fn sight(&self, login: &str, github_user_id: i64) -> GithubPerson {
        self.store
            .upsert_github_person(&GithubAccount {
                id: github_user_id,
                login: login.to_string(),
                account_type: AccountType::User,
            })
            .await
            .unwrap()
    }

    /// Associate `login` with `email` in the project.
    pub async fn bind(&self, login: &str, github_user_id: i64, email: &str) -> GithubPerson {
        let github_person = self.sight(login, github_user_id).await;
        let person = self.store.get_or_create_person(email, login).await.unwrap();
        self.store
            .bind(self.project_id, github_person.id, person.id)
            .await
            .unwrap();
        github_person
    }

    pub async fn ingest(&self, commits: &[WalkedCommit]) {
        self.store
            .insert_commits(self.repo.github_repository.id, commits)
            .await
            .unwrap();
    }

    /// A pull request by `author` with one review per `(reviewer, review_id)`.
    pub async fn record_pull_request(
        &self,
        number: i32,
        author: &str,
        reviewers: &[(&str, i64)],
    ) -> PullRequest {
        let at = Utc::now();
        let pr = self
            .store
            .upsert_pull_request(self.repo.github_repository.id, &remote_pr(number, author, at), 0)
            .await
            .unwrap();
        for &(reviewer, id) in reviewers {
            self.store
                .upsert_review(&pr, &remote_review(id, reviewer, ReviewState::Approved, at), 0)
                .await
                .unwrap();
        }
        pr
    }
}

async fn add_repository(
    store: &MemoryStore,
    project_id: Uuid,
    github_repo_id: i64,
    full_name: &str,
) -> RepositoryTarget {
    let upstream = store
        .upsert_github_repository(GithubRepository::new(
            github_repo_id,
            full_name,
            format!("https://github.com/{full_name}.git"),
            "main",
        ))
        .await
        .unwrap();
    let row = store
        .add_project_repository(project_id, upstream.id)
        .await
        .unwrap();
    store.repository_target(row.id).await.unwrap()
}

/// Units wired to a fixture's store and scripted facades.
pub struct Harness {
    pub git: Arc<FakeGit>,
    pub github: Arc<FakeGithub>,
    pub ctx: Arc<WorkerContext>,
}

impl Harness {
    pub fn new(fx: &Fixture) -> Self {
        let git = Arc::new(FakeGit::default());
        let github = Arc::new(FakeGithub::default());
        let ctx = Arc::new(WorkerContext {
            store: fx.store.clone(),
            github: github.clone(),
            git: git.clone(),
            locks: RepoLocks::new(),
            workspace: PathBuf::from("/srv/devpulse-test"),
            token: "test-token".to_string(),
            retry: RetryConfig::DEFAULT,
        });
        Self { git, github, ctx }
    }

    /// Run `job` with the unit for its type.
    pub async fn run(&self, job: &Job) -> CoreResult<()> {
        let unit = units(self.ctx.clone())
            .into_iter()
            .find(|u| u.job_type() == job.job_type)
            .ok_or_else(|| CoreError::internal("no unit for job type"))?;
        unit.run(job, &CancellationToken::new()).await
    }
}

pub fn commit(sha: &str, email: &str, at: DateTime<Utc>, files: &[(&str, i32, i32)]) -> WalkedCommit {
    WalkedCommit {
        sha: sha.to_string(),
        author_email: email.to_string(),
        author_name: email.split('@').next().unwrap_or(email).to_string(),
        commit_date: at,
        message: format!("commit {sha}"),
        files: files
            .iter()
            .map(|&(path, additions, deletions)| WalkedFile {
                path: path.to_string(),
                additions,
                deletions,
                status: FileStatus::Modified,
            })
            .collect(),
    }
}

/// Stable fake platform id for a login.
pub fn account(login: &str) -> GithubAccount {
    let id = login
        .bytes()
        .fold(7i64, |h, b| h.wrapping_mul(31).wrapping_add(i64::from(b)))
        .abs();
    GithubAccount {
        id,
        login: login.to_string(),
        account_type: AccountType::User,
    }
}

pub fn remote_pr(number: i32, author: &str, at: DateTime<Utc>) -> RemotePullRequest {
    RemotePullRequest {
        number,
        title: format!("Change {number}"),
        state: PrState::Open,
        author: Some(account(author)),
        created_at: at,
        merged_at: None,
        closed_at: None,
    }
}

pub fn remote_review(id: i64, reviewer: &str, state: ReviewState, at: DateTime<Utc>) -> RemoteReview {
    RemoteReview {
        id,
        reviewer: Some(account(reviewer)),
        state,
        has_body: false,
        submitted_at: at,
    }
}

#[derive(Default)]
struct GithubState {
    users: BTreeMap<String, GithubAccount>,
    repositories: Vec<RemoteRepository>,
    pulls: HashMap<String, Vec<RemotePullRequest>>,
    reviews: HashMap<(String, i32), Vec<RemoteReview>>,
    comments: HashMap<(String, i32), Vec<RemoteReviewComment>>,
    removed: HashSet<String>,
    failures: VecDeque<GithubError>,
    pull_request_calls: usize,
    rate_limit_down: bool,
    rate_limit_calls: usize,
}

/// Scripted platform API serving two items per page.
#[derive(Default)]
pub struct FakeGithub {
    state: Mutex<GithubState>,
}

const PAGE_SIZE: usize = 2;

fn page_of<T: Clone>(items: &[T], page: u32) -> Page<T> {
    let start = page.saturating_sub(1) as usize * PAGE_SIZE;
    let chunk = items.iter().skip(start).take(PAGE_SIZE).cloned().collect();
    let next = (start + PAGE_SIZE < items.len()).then_some(page + 1);
    Page { items: chunk, next }
}

impl FakeGithub {
    fn with<T>(&self, f: impl FnOnce(&mut GithubState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn add_user(&self, id: i64, login: &str) {
        self.with(|s| {
            s.users.insert(
                login.to_string(),
                GithubAccount {
                    id,
                    login: login.to_string(),
                    account_type: AccountType::User,
                },
            )
        });
    }

    /// A repository visible to any token.
    pub fn add_remote_repository(&self, id: i64, full_name: &str) {
        self.with(|s| {
            s.repositories.push(RemoteRepository {
                id,
                full_name: full_name.to_string(),
                clone_url: format!("https://github.com/{full_name}.git"),
                default_branch: "main".to_string(),
                private: false,
            })
        });
    }

    pub fn add_pull_request(&self, repo: &str, pr: RemotePullRequest) {
        self.with(|s| s.pulls.entry(repo.to_string()).or_default().push(pr));
    }

    pub fn add_review(&self, repo: &str, number: i32, review: RemoteReview) {
        self.with(|s| s.reviews.entry((repo.to_string(), number)).or_default().push(review));
    }

    pub fn add_review_comment(&self, repo: &str, number: i32, review_id: i64) {
        self.with(|s| {
            let comments = s.comments.entry((repo.to_string(), number)).or_default();
            let id = comments.len() as i64 + 1;
            comments.push(RemoteReviewComment {
                id,
                review_id: Some(review_id),
            });
        });
    }

    /// Requests for `repo` answer 404 from now on.
    pub fn remove_repository(&self, repo: &str) {
        self.with(|s| s.removed.insert(repo.to_string()));
    }

    /// The next pull request listing fails with `err`.
    pub fn fail_next(&self, err: GithubError) {
        self.with(|s| s.failures.push_back(err));
    }

    pub fn pull_request_calls(&self) -> usize {
        self.with(|s| s.pull_request_calls)
    }

    /// Every rate limit lookup fails transiently from now on.
    pub fn rate_limit_unavailable(&self) {
        self.with(|s| s.rate_limit_down = true);
    }

    pub fn rate_limit_calls(&self) -> usize {
        self.with(|s| s.rate_limit_calls)
    }

    fn check_repo(s: &GithubState, repo: &str) -> Result<(), GithubError> {
        if s.removed.contains(repo) {
            return Err(GithubError::NotFound(format!("repository {repo}")));
        }
        Ok(())
    }
}

#[async_trait]
impl GithubApi for FakeGithub {
    async fn list_user_repositories(
        &self,
        _token: &str,
        page: u32,
    ) -> Result<Page<RemoteRepository>, GithubError> {
        Ok(self.with(|s| page_of(&s.repositories, page)))
    }

    async fn list_pull_requests(&self, repo: &str, page: u32) -> Result<Page<RemotePullRequest>, GithubError> {
        self.with(|s| {
            s.pull_request_calls += 1;
            if let Some(err) = s.failures.pop_front() {
                return Err(err);
            }
            Self::check_repo(s, repo)?;
            Ok(page_of(s.pulls.get(repo).map(Vec::as_slice).unwrap_or_default(), page))
        })
    }

    async fn list_reviews(&self, repo: &str, number: i32, page: u32) -> Result<Page<RemoteReview>, GithubError> {
        self.with(|s| {
            Self::check_repo(s, repo)?;
            let reviews = s.reviews.get(&(repo.to_string(), number));
            Ok(page_of(reviews.map(Vec::as_slice).unwrap_or_default(), page))
        })
    }

    async fn list_review_comments(
        &self,
        repo: &str,
        number: i32,
        page: u32,
    ) -> Result<Page<RemoteReviewComment>, GithubError> {
        self.with(|s| {
            Self::check_repo(s, repo)?;
            let comments = s.comments.get(&(repo.to_string(), number));
            Ok(page_of(comments.map(Vec::as_slice).unwrap_or_default(), page))
        })
    }

    async fn get_user(&self, login: &str) -> Result<GithubAccount, GithubError> {
        self.with(|s| {
            s.users
                .get(login)
                .cloned()
                .ok_or_else(|| GithubError::NotFound(format!("user {login}")))
        })
    }

    async fn get_rate_limit(&self) -> Result<RateLimit, GithubError> {
        self.with(|s| {
            s.rate_limit_calls += 1;
            if s.rate_limit_down {
                return Err(GithubError::Transient("rate limit endpoint unavailable".into()));
            }
            Ok(RateLimit {
                limit: 5000,
                remaining: 4999,
                reset_at: Utc::now(),
            })
        })
    }
}

#[derive(Default)]
struct GitState {
    remotes: HashMap<String, Vec<WalkedCommit>>,
    copies: HashMap<PathBuf, String>,
    clones: usize,
    fetches: usize,
    clone_failures: VecDeque<GitError>,
    walk_failures: VecDeque<GitError>,
    walks: Vec<Option<String>>,
}

/// In-memory remotes; a working copy always reflects its remote.
#[derive(Default)]
pub struct FakeGit {
    state: Mutex<GitState>,
}

impl FakeGit {
    fn with<T>(&self, f: impl FnOnce(&mut GitState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    /// Append commits to the remote at `clone_url`, creating it if needed.
    pub fn push_commits(&self, clone_url: &str, commits: Vec<WalkedCommit>) {
        self.with(|s| s.remotes.entry(clone_url.to_string()).or_default().extend(commits));
    }

    pub fn fail_next_clone(&self, err: GitError) {
        self.with(|s| s.clone_failures.push_back(err));
    }

    pub fn fail_next_walk(&self, err: GitError) {
        self.with(|s| s.walk_failures.push_back(err));
    }

    pub fn clone_count(&self) -> usize {
        self.with(|s| s.clones)
    }

    pub fn fetch_count(&self) -> usize {
        self.with(|s| s.fetches)
    }

    /// The `since` argument of every walk so far.
    pub fn walks(&self) -> Vec<Option<String>> {
        self.with(|s| s.walks.clone())
    }

    fn remote_of<'a>(s: &'a GitState, path: &Path) -> Result<&'a Vec<WalkedCommit>, GitError> {
        let url = s
            .copies
            .get(path)
            .ok_or_else(|| GitError::Permanent(format!("no working copy at {}", path.display())))?;
        s.remotes
            .get(url)
            .ok_or_else(|| GitError::NotFound(url.clone()))
    }
}

#[async_trait]
impl Git for FakeGit {
    async fn clone_or_open(&self, clone_url: &str, path: &Path, _token: &str) -> Result<bool, GitError> {
        self.with(|s| {
            if s.copies.contains_key(path) {
                return Ok(false);
            }
            if let Some(err) = s.clone_failures.pop_front() {
                return Err(err);
            }
            if !s.remotes.contains_key(clone_url) {
                return Err(GitError::NotFound(clone_url.to_string()));
            }
            s.copies.insert(path.to_path_buf(), clone_url.to_string());
            s.clones += 1;
            Ok(true)
        })
    }

    async fn fetch(&self, path: &Path, _clone_url: &str, _token: &str) -> Result<(), GitError> {
        self.with(|s| {
            Self::remote_of(s, path)?;
            s.fetches += 1;
            Ok(())
        })
    }

    async fn head(&self, path: &Path, _branch: &str) -> Result<Option<String>, GitError> {
        self.with(|s| Ok(Self::remote_of(s, path)?.last().map(|c| c.sha.clone())))
    }

    async fn walk_commits(
        &self,
        path: &Path,
        _branch: &str,
        since: Option<&str>,
    ) -> Result<Vec<WalkedCommit>, GitError> {
        self.with(|s| {
            s.walks.push(since.map(str::to_string));
            if let Some(err) = s.walk_failures.pop_front() {
                return Err(err);
            }
            let commits = Self::remote_of(s, path)?;
            let start = since
                .and_then(|sha| commits.iter().position(|c| c.sha == sha))
                .map_or(0, |i| i + 1);
            Ok(commits[start..].to_vec())
        })
    }
}

//! Schema migration for the analytics tables.

use diesel_async::AsyncPgConnection;
use diesel_async::SimpleAsyncConnection;

/// Idempotent migration creating every analytics table, unique constraint and
/// report index. Project-owned rows cascade on project deletion.
pub const MIGRATION_SQL: &str = r#"
-- ================================================================
-- Projects and repositories
-- ================================================================

CREATE TABLE IF NOT EXISTS projects (
    id              UUID PRIMARY KEY,
    name            VARCHAR(255) NOT NULL,
    owner_id        UUID NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_projects_owner ON projects (owner_id);

CREATE TABLE IF NOT EXISTS github_repositories (
    id              UUID PRIMARY KEY,
    github_repo_id  BIGINT NOT NULL UNIQUE,
    full_name       VARCHAR(255) NOT NULL,
    clone_url       VARCHAR(512) NOT NULL,
    default_branch  VARCHAR(255) NOT NULL DEFAULT 'main',
    is_cloned       BOOLEAN NOT NULL DEFAULT FALSE,
    head_sha        VARCHAR(40),
    ingested_sha    VARCHAR(40),
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS project_repositories (
    id                   UUID PRIMARY KEY,
    project_id           UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    github_repository_id UUID NOT NULL REFERENCES github_repositories(id),
    is_tracked           BOOLEAN NOT NULL DEFAULT TRUE,
    is_cloned            BOOLEAN NOT NULL DEFAULT FALSE,
    created_at           TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (project_id, github_repository_id)
);

-- ================================================================
-- Mined history
-- ================================================================

CREATE TABLE IF NOT EXISTS commits (
    id                   UUID PRIMARY KEY,
    github_repository_id UUID NOT NULL REFERENCES github_repositories(id) ON DELETE CASCADE,
    sha                  VARCHAR(40) NOT NULL,
    author_email         VARCHAR(320) NOT NULL,
    author_name          VARCHAR(255) NOT NULL,
    commit_date          TIMESTAMPTZ NOT NULL,
    message              TEXT NOT NULL,
    UNIQUE (github_repository_id, sha)
);

CREATE INDEX IF NOT EXISTS idx_commits_repo_date ON commits (github_repository_id, commit_date);
CREATE INDEX IF NOT EXISTS idx_commits_author_email ON commits (author_email);

CREATE TABLE IF NOT EXISTS commit_files (
    id              UUID PRIMARY KEY,
    commit_id       UUID NOT NULL REFERENCES commits(id) ON DELETE CASCADE,
    path            TEXT NOT NULL,
    additions       INTEGER NOT NULL DEFAULT 0,
    deletions       INTEGER NOT NULL DEFAULT 0,
    status          VARCHAR(16) NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_commit_files_commit ON commit_files (commit_id);

CREATE TABLE IF NOT EXISTS pull_requests (
    id                UUID PRIMARY KEY,
    repository_id     UUID NOT NULL REFERENCES github_repositories(id) ON DELETE CASCADE,
    number            INTEGER NOT NULL,
    title             TEXT NOT NULL DEFAULT '',
    user_login        VARCHAR(255) NOT NULL,
    state             VARCHAR(16) NOT NULL,
    review_comments   INTEGER NOT NULL DEFAULT 0,
    github_created_at TIMESTAMPTZ NOT NULL,
    merged_at         TIMESTAMPTZ,
    closed_at         TIMESTAMPTZ,
    UNIQUE (repository_id, number)
);

CREATE INDEX IF NOT EXISTS idx_pull_requests_repo_created ON pull_requests (repository_id, github_created_at);

CREATE TABLE IF NOT EXISTS pr_reviews (
    id                UUID PRIMARY KEY,
    repository_id     UUID NOT NULL REFERENCES github_repositories(id) ON DELETE CASCADE,
    pr_id             UUID NOT NULL REFERENCES pull_requests(id) ON DELETE CASCADE,
    github_review_id  BIGINT NOT NULL UNIQUE,
    reviewer_login    VARCHAR(255) NOT NULL,
    state             VARCHAR(32) NOT NULL,
    has_body          BOOLEAN NOT NULL DEFAULT FALSE,
    comment_count     INTEGER NOT NULL DEFAULT 0,
    github_created_at TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pr_reviews_repo_created ON pr_reviews (repository_id, github_created_at);

-- ================================================================
-- Identities
-- ================================================================

CREATE TABLE IF NOT EXISTS people (
    id              UUID PRIMARY KEY,
    name            VARCHAR(255) NOT NULL,
    primary_email   VARCHAR(320) NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS github_people (
    id              UUID PRIMARY KEY,
    github_user_id  BIGINT NOT NULL UNIQUE,
    username        VARCHAR(255) NOT NULL,
    person_type     VARCHAR(16) NOT NULL DEFAULT 'User'
);

CREATE INDEX IF NOT EXISTS idx_github_people_username ON github_people (username);

CREATE TABLE IF NOT EXISTS github_person_emails (
    id               UUID PRIMARY KEY,
    project_id       UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    github_person_id UUID NOT NULL REFERENCES github_people(id) ON DELETE CASCADE,
    person_id        UUID NOT NULL REFERENCES people(id) ON DELETE CASCADE,
    UNIQUE (project_id, github_person_id)
);

CREATE TABLE IF NOT EXISTS email_merges (
    id              UUID PRIMARY KEY,
    project_id      UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    source_email    VARCHAR(320) NOT NULL,
    target_email    VARCHAR(320) NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (project_id, source_email)
);

-- ================================================================
-- Project settings
-- ================================================================

CREATE TABLE IF NOT EXISTS excluded_extensions (
    id              UUID PRIMARY KEY,
    project_id      UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    value           VARCHAR(64) NOT NULL,
    UNIQUE (project_id, value)
);

CREATE TABLE IF NOT EXISTS excluded_folders (
    id              UUID PRIMARY KEY,
    project_id      UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    value           VARCHAR(512) NOT NULL,
    UNIQUE (project_id, value)
);

CREATE TABLE IF NOT EXISTS score_settings (
    project_id      UUID PRIMARY KEY REFERENCES projects(id) ON DELETE CASCADE,
    additions       DOUBLE PRECISION NOT NULL,
    deletions       DOUBLE PRECISION NOT NULL,
    commits         DOUBLE PRECISION NOT NULL,
    pull_requests   DOUBLE PRECISION NOT NULL,
    comments        DOUBLE PRECISION NOT NULL
);

CREATE TABLE IF NOT EXISTS working_hours_settings (
    project_id      UUID PRIMARY KEY REFERENCES projects(id) ON DELETE CASCADE,
    start_hour      INTEGER NOT NULL CHECK (start_hour BETWEEN 0 AND 23),
    end_hour        INTEGER NOT NULL CHECK (end_hour BETWEEN 0 AND 23),
    monday          BOOLEAN NOT NULL DEFAULT TRUE,
    tuesday         BOOLEAN NOT NULL DEFAULT TRUE,
    wednesday       BOOLEAN NOT NULL DEFAULT TRUE,
    thursday        BOOLEAN NOT NULL DEFAULT TRUE,
    friday          BOOLEAN NOT NULL DEFAULT TRUE,
    saturday        BOOLEAN NOT NULL DEFAULT FALSE,
    sunday          BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE TABLE IF NOT EXISTS project_update_settings (
    project_id          UUID PRIMARY KEY REFERENCES projects(id) ON DELETE CASCADE,
    auto_update_enabled BOOLEAN NOT NULL DEFAULT FALSE,
    auto_update_hour    INTEGER NOT NULL DEFAULT 0 CHECK (auto_update_hour BETWEEN 0 AND 23),
    last_triggered_at   TIMESTAMPTZ
);

-- ================================================================
-- Job engine
-- ================================================================

CREATE TABLE IF NOT EXISTS jobs (
    id                    UUID PRIMARY KEY,
    project_id            UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    project_repository_id UUID REFERENCES project_repositories(id) ON DELETE CASCADE,
    job_type              VARCHAR(16) NOT NULL,
    status                VARCHAR(16) NOT NULL DEFAULT 'pending',
    depends_on            UUID REFERENCES jobs(id) ON DELETE SET NULL,
    error_message         TEXT,
    attempt               INTEGER NOT NULL DEFAULT 1,
    retry_of              UUID REFERENCES jobs(id) ON DELETE SET NULL,
    created_at            TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    started_at            TIMESTAMPTZ,
    finished_at           TIMESTAMPTZ
);

CREATE INDEX IF NOT EXISTS idx_jobs_claim ON jobs (job_type, status, created_at);
CREATE INDEX IF NOT EXISTS idx_jobs_project ON jobs (project_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_jobs_repository ON jobs (project_repository_id);
CREATE INDEX IF NOT EXISTS idx_jobs_depends_on ON jobs (depends_on);
CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_retry_of ON jobs (retry_of) WHERE retry_of IS NOT NULL;

-- ================================================================
-- Statistics
-- ================================================================

CREATE TABLE IF NOT EXISTS people_statistics (
    id               UUID PRIMARY KEY,
    project_id       UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    repository_id    UUID NOT NULL REFERENCES project_repositories(id) ON DELETE CASCADE,
    github_person_id UUID NOT NULL REFERENCES github_people(id) ON DELETE CASCADE,
    stat_date        DATE NOT NULL,
    additions        BIGINT NOT NULL DEFAULT 0,
    deletions        BIGINT NOT NULL DEFAULT 0,
    commits          INTEGER NOT NULL DEFAULT 0,
    prs_authored     INTEGER NOT NULL DEFAULT 0,
    prs_reviewed     INTEGER NOT NULL DEFAULT 0,
    comments         INTEGER NOT NULL DEFAULT 0,
    score            DOUBLE PRECISION NOT NULL DEFAULT 0,
    UNIQUE (project_id, repository_id, github_person_id, stat_date)
);

CREATE INDEX IF NOT EXISTS idx_people_statistics_project_date ON people_statistics (project_id, stat_date);
CREATE INDEX IF NOT EXISTS idx_people_statistics_repo_date ON people_statistics (repository_id, stat_date);
"#;

/// Run the analytics schema migration.
pub async fn run_migration(conn: &mut AsyncPgConnection) -> anyhow::Result<()> {
    conn.batch_execute(MIGRATION_SQL)
        .await
        .map_err(|e| anyhow::anyhow!("analytics migration failed: {e}"))?;
    Ok(())
}

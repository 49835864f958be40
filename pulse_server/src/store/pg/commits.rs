use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use super::PgStore;
use crate::error::{CoreError, CoreResult};
use crate::git::WalkedCommit;
use crate::models::commit::{Commit, CommitFile, CommitWithFiles};
use crate::models::identity::normalize_email;
use crate::schema::{commit_files, commits};
use crate::store::CommitStore;

#[async_trait]
impl CommitStore for PgStore {
    async fn insert_commits(
        &self,
        github_repository_id: Uuid,
        walked: &[WalkedCommit],
    ) -> CoreResult<usize> {
        let mut conn = self.conn().await?;
        conn.transaction::<_, CoreError, _>(|conn| {
            async move {
                let mut inserted = 0;
                for commit in walked {
                    let row = Commit {
                        id: Uuid::new_v4(),
                        github_repository_id,
                        sha: commit.sha.clone(),
                        author_email: commit.author_email.clone(),
                        author_name: commit.author_name.clone(),
                        commit_date: commit.commit_date,
                        message: commit.message.clone(),
                    };
                    let created = diesel::insert_into(commits::table)
                        .values(&row)
                        .on_conflict((commits::github_repository_id, commits::sha))
                        .do_nothing()
                        .returning(commits::id)
                        .get_result::<Uuid>(conn)
                        .await
                        .optional()?;
                    let Some(commit_id) = created else {
                        continue;
                    };

                    let files: Vec<CommitFile> = commit
                        .files
                        .iter()
                        .map(|f| CommitFile {
                            id: Uuid::new_v4(),
                            commit_id,
                            path: f.path.clone(),
                            additions: f.additions,
                            deletions: f.deletions,
                            status: f.status.as_str().to_string(),
                        })
                        .collect();
                    if !files.is_empty() {
                        diesel::insert_into(commit_files::table)
                            .values(&files)
                            .execute(conn)
                            .await?;
                    }
                    inserted += 1;
                }
                Ok(inserted)
            }
            .scope_boxed()
        })
        .await
    }

    async fn commits_with_files(&self, github_repository_id: Uuid) -> CoreResult<Vec<CommitWithFiles>> {
        let mut conn = self.conn().await?;
        let rows = commits::table
            .filter(commits::github_repository_id.eq(github_repository_id))
            .order((commits::commit_date.asc(), commits::sha.asc()))
            .select(Commit::as_select())
            .load::<Commit>(&mut conn)
            .await?;

        let files = commit_files::table
            .inner_join(commits::table)
            .filter(commits::github_repository_id.eq(github_repository_id))
            .order((commit_files::commit_id.asc(), commit_files::path.asc()))
            .select(CommitFile::as_select())
            .load::<CommitFile>(&mut conn)
            .await?;

        let mut by_commit: HashMap<Uuid, Vec<CommitFile>> = HashMap::new();
        for file in files {
            by_commit.entry(file.commit_id).or_default().push(file);
        }

        Ok(rows
            .into_iter()
            .map(|commit| {
                let files = by_commit.remove(&commit.id).unwrap_or_default();
                CommitWithFiles { commit, files }
            })
            .collect())
    }

    async fn author_emails(&self, github_repository_ids: &[Uuid]) -> CoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let emails = commits::table
            .filter(commits::github_repository_id.eq_any(github_repository_ids))
            .select(commits::author_email)
            .distinct()
            .load::<String>(&mut conn)
            .await?;
        let unique: BTreeSet<String> = emails
            .iter()
            .map(|e| normalize_email(e))
            .filter(|e| !e.is_empty())
            .collect();
        Ok(unique.into_iter().collect())
    }
}

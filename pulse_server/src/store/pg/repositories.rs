use async_trait::async_trait;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use super::PgStore;
use crate::error::{CoreError, CoreResult};
use crate::models::project::{GithubRepository, ProjectRepository, RepositoryTarget};
use crate::schema::{github_repositories, project_repositories};
use crate::store::RepositoryStore;

fn into_target((project_repository, github_repository): (ProjectRepository, GithubRepository)) -> RepositoryTarget {
    RepositoryTarget {
        project_repository,
        github_repository,
    }
}

#[async_trait]
impl RepositoryStore for PgStore {
    async fn upsert_github_repository(&self, repo: GithubRepository) -> CoreResult<GithubRepository> {
        let mut conn = self.conn().await?;
        use github_repositories::dsl as g;
        Ok(diesel::insert_into(g::github_repositories)
            .values(&repo)
            .on_conflict(g::github_repo_id)
            .do_update()
            .set((
                g::full_name.eq(excluded(g::full_name)),
                g::clone_url.eq(excluded(g::clone_url)),
                g::default_branch.eq(excluded(g::default_branch)),
            ))
            .get_result::<GithubRepository>(&mut conn)
            .await?)
    }

    async fn add_project_repository(
        &self,
        project_id: Uuid,
        github_repository_id: Uuid,
    ) -> CoreResult<ProjectRepository> {
        let mut conn = self.conn().await?;
        let row = ProjectRepository::new(project_id, github_repository_id);
        let row = diesel::insert_into(project_repositories::table)
            .values(&row)
            .get_result::<ProjectRepository>(&mut conn)
            .await
            .map_err(|e| match CoreError::from(e) {
                CoreError::Conflict { .. } => {
                    CoreError::conflict("repository is already part of the project")
                }
                other => other,
            })?;
        tracing::info!(
            project_id = %project_id,
            project_repository_id = %row.id,
            "Repository added to project"
        );
        Ok(row)
    }

    async fn set_tracked(&self, project_repository_id: Uuid, tracked: bool) -> CoreResult<()> {
        let mut conn = self.conn().await?;
        let updated = diesel::update(project_repositories::table.find(project_repository_id))
            .set(project_repositories::is_tracked.eq(tracked))
            .execute(&mut conn)
            .await?;
        if updated == 0 {
            return Err(CoreError::not_found(format!(
                "project repository {project_repository_id} not found"
            )));
        }
        Ok(())
    }

    async fn repository_target(&self, project_repository_id: Uuid) -> CoreResult<RepositoryTarget> {
        let mut conn = self.conn().await?;
        project_repositories::table
            .inner_join(github_repositories::table)
            .filter(project_repositories::id.eq(project_repository_id))
            .select((ProjectRepository::as_select(), GithubRepository::as_select()))
            .first::<(ProjectRepository, GithubRepository)>(&mut conn)
            .await
            .optional()?
            .map(into_target)
            .ok_or_else(|| {
                CoreError::not_found(format!("project repository {project_repository_id} not found"))
            })
    }

    async fn project_targets(&self, project_id: Uuid) -> CoreResult<Vec<RepositoryTarget>> {
        let mut conn = self.conn().await?;
        let rows = project_repositories::table
            .inner_join(github_repositories::table)
            .filter(project_repositories::project_id.eq(project_id))
            .order((project_repositories::created_at.asc(), project_repositories::id.asc()))
            .select((ProjectRepository::as_select(), GithubRepository::as_select()))
            .load::<(ProjectRepository, GithubRepository)>(&mut conn)
            .await?;
        Ok(rows.into_iter().map(into_target).collect())
    }

    async fn mark_cloned(&self, github_repository_id: Uuid, head_sha: Option<&str>) -> CoreResult<()> {
        let mut conn = self.conn().await?;
        let head_sha = head_sha.map(str::to_string);
        conn.transaction::<_, CoreError, _>(|conn| {
            async move {
                diesel::update(github_repositories::table.find(github_repository_id))
                    .set((
                        github_repositories::is_cloned.eq(true),
                        github_repositories::head_sha.eq(head_sha),
                    ))
                    .execute(conn)
                    .await?;
                diesel::update(
                    project_repositories::table
                        .filter(project_repositories::github_repository_id.eq(github_repository_id)),
                )
                .set(project_repositories::is_cloned.eq(true))
                .execute(conn)
                .await?;
                Ok(())
            }
            .scope_boxed()
        })
        .await
    }

    async fn set_ingested_sha(&self, github_repository_id: Uuid, sha: &str) -> CoreResult<()> {
        let mut conn = self.conn().await?;
        diesel::update(github_repositories::table.find(github_repository_id))
            .set(github_repositories::ingested_sha.eq(sha))
            .execute(&mut conn)
            .await?;
        Ok(())
    }
}

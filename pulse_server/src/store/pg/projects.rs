use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use super::PgStore;
use crate::error::{CoreError, CoreResult};
use crate::models::project::Project;
use crate::models::settings::{
    ExcludedExtension, ExcludedFolder, ProjectFilters, ProjectUpdateSettings, ScoreSettings,
    WorkingHoursSettings,
};
use crate::schema::{
    excluded_extensions, excluded_folders, project_update_settings, projects, score_settings,
    working_hours_settings,
};
use crate::store::ProjectStore;

#[async_trait]
impl ProjectStore for PgStore {
    async fn create_project(&self, project: Project) -> CoreResult<Project> {
        let mut conn = self.conn().await?;
        let project = diesel::insert_into(projects::table)
            .values(&project)
            .get_result::<Project>(&mut conn)
            .await?;
        tracing::info!(project_id = %project.id, name = %project.name, "Project created");
        Ok(project)
    }

    async fn get_project(&self, project_id: Uuid) -> CoreResult<Project> {
        let mut conn = self.conn().await?;
        projects::table
            .find(project_id)
            .first::<Project>(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| CoreError::not_found(format!("project {project_id} not found")))
    }

    async fn project_filters(&self, project_id: Uuid) -> CoreResult<ProjectFilters> {
        let mut conn = self.conn().await?;

        let excluded_extensions = excluded_extensions::table
            .filter(excluded_extensions::project_id.eq(project_id))
            .select(excluded_extensions::value)
            .order(excluded_extensions::value.asc())
            .load::<String>(&mut conn)
            .await?;

        let excluded_folders = excluded_folders::table
            .filter(excluded_folders::project_id.eq(project_id))
            .select(excluded_folders::value)
            .order(excluded_folders::value.asc())
            .load::<String>(&mut conn)
            .await?;

        let score = score_settings::table
            .find(project_id)
            .first::<ScoreSettings>(&mut conn)
            .await
            .optional()?
            .unwrap_or_else(|| ScoreSettings::defaults(project_id));

        let working_hours = working_hours_settings::table
            .find(project_id)
            .first::<WorkingHoursSettings>(&mut conn)
            .await
            .optional()?;

        Ok(ProjectFilters {
            excluded_extensions,
            excluded_folders,
            score,
            working_hours,
        })
    }

    async fn set_score_settings(&self, settings: ScoreSettings) -> CoreResult<()> {
        settings.validate()?;
        let mut conn = self.conn().await?;
        diesel::insert_into(score_settings::table)
            .values(&settings)
            .on_conflict(score_settings::project_id)
            .do_update()
            .set((
                score_settings::additions.eq(excluded(score_settings::additions)),
                score_settings::deletions.eq(excluded(score_settings::deletions)),
                score_settings::commits.eq(excluded(score_settings::commits)),
                score_settings::pull_requests.eq(excluded(score_settings::pull_requests)),
                score_settings::comments.eq(excluded(score_settings::comments)),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_working_hours(
        &self,
        project_id: Uuid,
        settings: Option<WorkingHoursSettings>,
    ) -> CoreResult<()> {
        let mut conn = self.conn().await?;
        let Some(settings) = settings else {
            diesel::delete(working_hours_settings::table.find(project_id))
                .execute(&mut conn)
                .await?;
            return Ok(());
        };

        settings.validate()?;
        use working_hours_settings::dsl as w;
        diesel::insert_into(w::working_hours_settings)
            .values(&WorkingHoursSettings {
                project_id,
                ..settings
            })
            .on_conflict(w::project_id)
            .do_update()
            .set((
                w::start_hour.eq(excluded(w::start_hour)),
                w::end_hour.eq(excluded(w::end_hour)),
                w::monday.eq(excluded(w::monday)),
                w::tuesday.eq(excluded(w::tuesday)),
                w::wednesday.eq(excluded(w::wednesday)),
                w::thursday.eq(excluded(w::thursday)),
                w::friday.eq(excluded(w::friday)),
                w::saturday.eq(excluded(w::saturday)),
                w::sunday.eq(excluded(w::sunday)),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn add_excluded_extension(
        &self,
        project_id: Uuid,
        value: &str,
    ) -> CoreResult<ExcludedExtension> {
        let mut conn = self.conn().await?;
        let row = ExcludedExtension {
            id: Uuid::new_v4(),
            project_id,
            value: value.trim().to_string(),
        };
        Ok(diesel::insert_into(excluded_extensions::table)
            .values(&row)
            .get_result(&mut conn)
            .await?)
    }

    async fn add_excluded_folder(&self, project_id: Uuid, value: &str) -> CoreResult<ExcludedFolder> {
        let mut conn = self.conn().await?;
        let row = ExcludedFolder {
            id: Uuid::new_v4(),
            project_id,
            value: value.trim().to_string(),
        };
        Ok(diesel::insert_into(excluded_folders::table)
            .values(&row)
            .get_result(&mut conn)
            .await?)
    }

    async fn set_update_settings(&self, settings: ProjectUpdateSettings) -> CoreResult<()> {
        settings.validate()?;
        let mut conn = self.conn().await?;
        use project_update_settings::dsl as u;
        diesel::insert_into(u::project_update_settings)
            .values(&settings)
            .on_conflict(u::project_id)
            .do_update()
            .set((
                u::auto_update_enabled.eq(excluded(u::auto_update_enabled)),
                u::auto_update_hour.eq(excluded(u::auto_update_hour)),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn due_projects(&self, hour: i32) -> CoreResult<Vec<ProjectUpdateSettings>> {
        let mut conn = self.conn().await?;
        Ok(project_update_settings::table
            .filter(project_update_settings::auto_update_enabled.eq(true))
            .filter(project_update_settings::auto_update_hour.eq(hour))
            .order(project_update_settings::project_id.asc())
            .load::<ProjectUpdateSettings>(&mut conn)
            .await?)
    }

    async fn claim_update_slot(
        &self,
        project_id: Uuid,
        hour_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> CoreResult<bool> {
        let mut conn = self.conn().await?;
        use project_update_settings::dsl as u;
        let updated = diesel::update(
            u::project_update_settings
                .find(project_id)
                .filter(u::last_triggered_at.is_null().or(u::last_triggered_at.lt(hour_start))),
        )
        .set(u::last_triggered_at.eq(now))
        .execute(&mut conn)
        .await?;
        Ok(updated == 1)
    }
}

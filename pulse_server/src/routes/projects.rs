//! Project setup: repositories to track and analysis settings.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post, put};
use axum::Router;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::AppState;
use crate::error::{CoreError, CoreResult};
use crate::github::{list_all_user_repositories, RemoteRepository};
use crate::models::project::{GithubRepository, Project, ProjectRepository, RepositoryTarget};
use crate::models::settings::{
    ExcludedExtension, ExcludedFolder, ProjectFilters, ProjectUpdateSettings, ScoreSettings,
    WorkingHoursSettings,
};
use crate::retry::RetryConfig;
use crate::store::{ProjectStore, RepositoryStore};

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub owner_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct AddRepositoryRequest {
    pub github_repo_id: i64,
    pub full_name: String,
    pub clone_url: String,
    pub default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TrackedRequest {
    pub tracked: bool,
}

#[derive(Debug, Deserialize)]
pub struct ScoreRequest {
    pub additions: f64,
    pub deletions: f64,
    pub commits: f64,
    pub pull_requests: f64,
    pub comments: f64,
}

#[derive(Debug, Deserialize)]
pub struct WorkingHoursRequest {
    pub start_hour: i32,
    pub end_hour: i32,
    pub days: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct FilterRequest {
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateScheduleRequest {
    pub enabled: bool,
    pub hour: i32,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/projects", post(create_project))
        .route("/projects/{project_id}", get(get_project))
        .route(
            "/projects/{project_id}/repositories",
            get(list_repositories).post(add_repository),
        )
        .route(
            "/projects/{project_id}/repositories/{repository_id}/tracked",
            put(set_tracked),
        )
        .route("/projects/{project_id}/available-repositories", get(available_repositories))
        .route("/projects/{project_id}/settings", get(get_settings))
        .route("/projects/{project_id}/settings/score", put(set_score))
        .route(
            "/projects/{project_id}/settings/working-hours",
            put(set_working_hours).delete(clear_working_hours),
        )
        .route(
            "/projects/{project_id}/settings/excluded-extensions",
            post(add_excluded_extension),
        )
        .route(
            "/projects/{project_id}/settings/excluded-folders",
            post(add_excluded_folder),
        )
        .route("/projects/{project_id}/settings/update", put(set_update_schedule))
}

async fn create_project(
    State(state): State<AppState>,
    Json(req): Json<CreateProjectRequest>,
) -> CoreResult<(StatusCode, Json<Project>)> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(CoreError::InvalidInput("project name must not be empty".to_string()));
    }
    let project = state.store.create_project(Project::new(name, req.owner_id)).await?;
    tracing::info!(project_id = %project.id, name, "Project created");
    Ok((StatusCode::CREATED, Json(project)))
}

async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> CoreResult<Json<Project>> {
    state.store.get_project(project_id).await.map(Json)
}

async fn list_repositories(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> CoreResult<Json<Vec<RepositoryTarget>>> {
    state.store.get_project(project_id).await?;
    state.store.project_targets(project_id).await.map(Json)
}

async fn add_repository(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<AddRepositoryRequest>,
) -> CoreResult<(StatusCode, Json<ProjectRepository>)> {
    state.store.get_project(project_id).await?;
    let upstream = GithubRepository::new(
        req.github_repo_id,
        req.full_name.trim(),
        req.clone_url.trim(),
        req.default_branch.as_deref().unwrap_or("main"),
    );
    if upstream.owner_and_name().is_none() {
        return Err(CoreError::InvalidInput(format!(
            "repository name must be owner/name, got {}",
            req.full_name
        )));
    }
    let upstream = state.store.upsert_github_repository(upstream).await?;
    let row = state.store.add_project_repository(project_id, upstream.id).await?;
    tracing::info!(
        project_id = %project_id,
        repository = %upstream.full_name,
        "Repository added"
    );
    Ok((StatusCode::CREATED, Json(row)))
}

async fn set_tracked(
    State(state): State<AppState>,
    Path((project_id, repository_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<TrackedRequest>,
) -> CoreResult<StatusCode> {
    let target = state.store.repository_target(repository_id).await?;
    if target.project_repository.project_id != project_id {
        return Err(CoreError::not_found(format!(
            "repository {repository_id} is not part of project {project_id}"
        )));
    }
    state.store.set_tracked(repository_id, req.tracked).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Repositories the service token can see, for picking what to add.
async fn available_repositories(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> CoreResult<Json<Vec<RemoteRepository>>> {
    state.store.get_project(project_id).await?;
    let repos = list_all_user_repositories(
        state.github.as_ref(),
        &state.token,
        RetryConfig::DEFAULT,
        &CancellationToken::new(),
    )
    .await?;
    Ok(Json(repos))
}

async fn get_settings(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> CoreResult<Json<ProjectFilters>> {
    state.store.get_project(project_id).await?;
    state.store.project_filters(project_id).await.map(Json)
}

async fn set_score(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<ScoreRequest>,
) -> CoreResult<StatusCode> {
    state.store.get_project(project_id).await?;
    state
        .store
        .set_score_settings(ScoreSettings {
            project_id,
            additions: req.additions,
            deletions: req.deletions,
            commits: req.commits,
            pull_requests: req.pull_requests,
            comments: req.comments,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_working_hours(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<WorkingHoursRequest>,
) -> CoreResult<StatusCode> {
    state.store.get_project(project_id).await?;
    let settings = working_hours(project_id, &req)?;
    state.store.set_working_hours(project_id, Some(settings)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_working_hours(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> CoreResult<StatusCode> {
    state.store.get_project(project_id).await?;
    state.store.set_working_hours(project_id, None).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_excluded_extension(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<FilterRequest>,
) -> CoreResult<(StatusCode, Json<ExcludedExtension>)> {
    state.store.get_project(project_id).await?;
    let row = state.store.add_excluded_extension(project_id, &req.value).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

async fn add_excluded_folder(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<FilterRequest>,
) -> CoreResult<(StatusCode, Json<ExcludedFolder>)> {
    state.store.get_project(project_id).await?;
    let row = state.store.add_excluded_folder(project_id, &req.value).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

async fn set_update_schedule(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<UpdateScheduleRequest>,
) -> CoreResult<StatusCode> {
    state.store.get_project(project_id).await?;
    state
        .store
        .set_update_settings(ProjectUpdateSettings {
            project_id,
            auto_update_enabled: req.enabled,
            auto_update_hour: req.hour,
            last_triggered_at: None,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Days are English weekday names or their three-letter forms.
fn working_hours(project_id: Uuid, req: &WorkingHoursRequest) -> CoreResult<WorkingHoursSettings> {
    let mut settings = WorkingHoursSettings {
        project_id,
        start_hour: req.start_hour,
        end_hour: req.end_hour,
        monday: false,
        tuesday: false,
        wednesday: false,
        thursday: false,
        friday: false,
        saturday: false,
        sunday: false,
    };
    for day in &req.days {
        let flag = match day.trim().to_ascii_lowercase().as_str() {
            "mon" | "monday" => &mut settings.monday,
            "tue" | "tuesday" => &mut settings.tuesday,
            "wed" | "wednesday" => &mut settings.wednesday,
            "thu" | "thursday" => &mut settings.thursday,
            "fri" | "friday" => &mut settings.friday,
            "sat" | "saturday" => &mut settings.saturday,
            "sun" | "sunday" => &mut settings.sunday,
            other => return Err(CoreError::InvalidInput(format!("unknown weekday {other}"))),
        };
        *flag = true;
    }
    settings.validate()?;
    Ok(settings)
}

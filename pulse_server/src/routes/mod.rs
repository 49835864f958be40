//! JSON API over the job service, identity resolver and stored statistics.

pub mod api;
pub mod projects;

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{delete, get, post};
use axum::Router;
use uuid::Uuid;

use crate::error::CoreResult;
use crate::github::GithubApi;
use crate::identity::resolver::Candidates;
use crate::identity::similarity::EmailSuggestion;
use crate::identity::Resolver;
use crate::jobs::JobService;
use crate::models::identity::{EmailMerge, IdentityBinding};
use crate::models::job::Job;
use crate::stats::grain::{read_stats, StatsReport};
use crate::stats::Grain;
use crate::store::{IdentityStore, ProjectStore, Store};

use api::{
    AssociationRequest, EnqueueResponse, MergeDeleteQuery, MergeRequest, StatsQuery,
    SuggestionQuery,
};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct AppState {
    pub jobs: JobService,
    pub resolver: Resolver,
    pub store: Arc<dyn Store>,
    pub github: Arc<dyn GithubApi>,
    /// Service token used to list repositories for project setup.
    pub token: String,
}

/// Build the API router (nested at `/api`).
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Jobs
        .route(
            "/projects/{project_id}/repositories/{repository_id}/clone",
            post(enqueue_clone),
        )
        .route(
            "/projects/{project_id}/repositories/{repository_id}/fetch",
            post(enqueue_fetch),
        )
        .route(
            "/projects/{project_id}/repositories/{repository_id}/analyze",
            post(enqueue_analyze),
        )
        .route("/projects/{project_id}/update", post(enqueue_update_all))
        .route("/projects/{project_id}/jobs", get(project_jobs))
        .route("/repositories/{repository_id}/jobs", get(repository_jobs))
        .route("/jobs/{job_id}/retry", post(retry_job))
        // Statistics
        .route("/projects/{project_id}/stats", get(project_stats))
        // Identities
        .route(
            "/projects/{project_id}/merges",
            get(list_merges).post(create_merge).delete(delete_merge),
        )
        .route("/projects/{project_id}/merges/resolved", get(resolved_emails))
        .route(
            "/projects/{project_id}/associations",
            get(list_associations).post(associate),
        )
        .route(
            "/projects/{project_id}/associations/{login}",
            delete(dissociate),
        )
        .route("/projects/{project_id}/suggestions", get(suggestions))
        .route("/projects/{project_id}/candidates", get(candidates))
        .merge(projects::routes())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

// ── Jobs ──

async fn enqueue_clone(
    State(state): State<AppState>,
    Path((project_id, repository_id)): Path<(Uuid, Uuid)>,
) -> CoreResult<(StatusCode, Json<EnqueueResponse>)> {
    let jobs = state.jobs.enqueue_clone(project_id, repository_id).await?;
    Ok((StatusCode::CREATED, Json(jobs.into())))
}

async fn enqueue_fetch(
    State(state): State<AppState>,
    Path((project_id, repository_id)): Path<(Uuid, Uuid)>,
) -> CoreResult<(StatusCode, Json<EnqueueResponse>)> {
    let job = state.jobs.enqueue_fetch_github(project_id, repository_id).await?;
    Ok((StatusCode::CREATED, Json(job.into())))
}

async fn enqueue_analyze(
    State(state): State<AppState>,
    Path((project_id, repository_id)): Path<(Uuid, Uuid)>,
) -> CoreResult<(StatusCode, Json<EnqueueResponse>)> {
    let job = state.jobs.enqueue_analyze(project_id, repository_id).await?;
    Ok((StatusCode::CREATED, Json(job.into())))
}

async fn enqueue_update_all(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> CoreResult<(StatusCode, Json<EnqueueResponse>)> {
    let jobs = state.jobs.enqueue_update_all(project_id).await?;
    Ok((StatusCode::CREATED, Json(jobs.into())))
}

async fn retry_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> CoreResult<(StatusCode, Json<EnqueueResponse>)> {
    let jobs = state.jobs.retry_job(job_id).await?;
    Ok((StatusCode::CREATED, Json(jobs.into())))
}

async fn project_jobs(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> CoreResult<Json<Vec<Job>>> {
    state.jobs.jobs_for_project(project_id).await.map(Json)
}

async fn repository_jobs(
    State(state): State<AppState>,
    Path(repository_id): Path<Uuid>,
) -> CoreResult<Json<Vec<Job>>> {
    state.jobs.jobs_for_repository(repository_id).await.map(Json)
}

// ── Statistics ──

async fn project_stats(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<StatsQuery>,
) -> CoreResult<Json<StatsReport>> {
    let grain = Grain::parse(query.grain.as_deref().unwrap_or("all"), query.key.as_deref())?;
    state.store.get_project(project_id).await?;
    read_stats(state.store.as_ref(), project_id, grain).await.map(Json)
}

// ── Identities ──

async fn list_merges(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> CoreResult<Json<Vec<EmailMerge>>> {
    state.store.merges(project_id).await.map(Json)
}

async fn create_merge(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<MergeRequest>,
) -> CoreResult<(StatusCode, Json<EmailMerge>)> {
    let merge = state
        .resolver
        .create_merge(project_id, &req.source, &req.target)
        .await?;
    Ok((StatusCode::CREATED, Json(merge)))
}

async fn delete_merge(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<MergeDeleteQuery>,
) -> CoreResult<StatusCode> {
    state.resolver.delete_merge(project_id, &query.source).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn resolved_emails(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> CoreResult<Json<BTreeMap<String, String>>> {
    state
        .resolver
        .merged_emails_for_project(project_id)
        .await
        .map(Json)
}

async fn list_associations(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> CoreResult<Json<Vec<IdentityBinding>>> {
    state.resolver.bindings(project_id).await.map(Json)
}

async fn associate(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<AssociationRequest>,
) -> CoreResult<(StatusCode, Json<IdentityBinding>)> {
    let binding = state
        .resolver
        .associate(project_id, &req.login, &req.email)
        .await?;
    Ok((StatusCode::CREATED, Json(binding)))
}

async fn dissociate(
    State(state): State<AppState>,
    Path((project_id, login)): Path<(Uuid, String)>,
) -> CoreResult<StatusCode> {
    state.resolver.dissociate(project_id, &login).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn suggestions(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<SuggestionQuery>,
) -> CoreResult<Json<Vec<EmailSuggestion>>> {
    state
        .resolver
        .suggest_emails(project_id, &query.username, query.limit())
        .await
        .map(Json)
}

async fn candidates(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> CoreResult<Json<Candidates>> {
    state.resolver.candidate_emails(project_id).await.map(Json)
}

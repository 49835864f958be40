//! DevPulse server: repository analytics for engineering teams.
//!
//! Clones tracked repositories, ingests commits and pull requests, resolves
//! commit emails to platform accounts, and stores per-person daily statistics.
//! Work runs as a persistent chain of jobs drained by a worker pool; an hourly
//! scheduler enqueues update chains for projects that asked for them.

mod config;
mod db;
mod error;
mod git;
mod github;
mod identity;
mod jobs;
mod metrics;
mod migration;
mod models;
mod retry;
mod routes;
mod scheduler;
mod schema;
mod stats;
mod store;
mod supervisor;
#[cfg(test)]
mod testing;
mod workers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use clap::Parser;
use tokio::sync::Notify;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use crate::git::cli::GitCli;
use crate::github::client::GithubClient;
use crate::github::GithubApi;
use crate::identity::Resolver;
use crate::jobs::{JobService, JobStore, PgJobStore};
use crate::retry::RetryConfig;
use crate::scheduler::Scheduler;
use crate::store::pg::PgStore;
use crate::store::Store;
use crate::supervisor::Supervisor;
use crate::workers::{RepoLocks, WorkerContext, WorkerPool};

#[derive(Parser)]
#[command(name = "devpulse", about = "Repository analytics server")]
struct Cli {
    /// Server port
    #[arg(short, long, env = "PULSE_PORT", default_value = "9090")]
    port: u16,

    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, env = "PULSE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Database pool size
    #[arg(long, env = "PULSE_DB_POOL_SIZE", default_value = "16")]
    db_pool_size: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.as_str().into());
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!("Starting DevPulse server...");
    let config = config::PulseConfig::from_env();
    metrics::init_metrics();

    // Database
    let pool = db::build_pool(&cli.database_url, cli.db_pool_size)?;
    {
        let mut conn = pool
            .get()
            .await
            .map_err(|e| anyhow::anyhow!("database pool: {e}"))?;
        tracing::info!("Running database migration...");
        migration::run_migration(&mut conn).await?;
        tracing::info!("Database migration completed.");
    }

    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool.clone()));
    let job_store: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool));
    let github: Arc<dyn GithubApi> = Arc::new(GithubClient::new(
        &config.github_api_url,
        &config.github_token,
        config.http_timeout,
    )?);

    tokio::fs::create_dir_all(&config.workspace)
        .await
        .map_err(|e| anyhow::anyhow!("workspace {}: {e}", config.workspace.display()))?;

    // Background workers
    let wake = Arc::new(Notify::new());
    let jobs = JobService::new(job_store.clone(), store.clone(), wake.clone());
    let ctx = Arc::new(WorkerContext {
        store: store.clone(),
        github: github.clone(),
        git: Arc::new(GitCli::new()),
        locks: RepoLocks::default(),
        workspace: config.workspace.clone(),
        token: config.github_token.clone(),
        retry: RetryConfig::DEFAULT,
    });
    let pool = WorkerPool::new(job_store.clone(), workers::units(ctx), config.pool(), wake);
    let scheduler = Scheduler::new(store.clone(), jobs.clone(), config.scheduler_tick);
    let supervisor = Supervisor::start(job_store, pool, scheduler).await?;

    // HTTP
    let state = routes::AppState {
        jobs,
        resolver: Resolver::new(store.clone(), Some(github.clone())),
        store,
        github,
        token: config.github_token.clone(),
    };
    let app = Router::new()
        .nest("/api", routes::api_router(state))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new()),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    tracing::info!("DevPulse server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if !supervisor.shutdown(config.shutdown_deadline).await {
        tracing::warn!("Some jobs were cancelled at shutdown and are marked failed");
    }
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}

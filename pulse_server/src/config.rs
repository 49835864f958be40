//! Runtime configuration, loaded from `PULSE_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::workers::{PoolConfig, WorkerLimits};

#[derive(Clone, Debug)]
pub struct PulseConfig {
    /// OAuth application credentials for operator sign-in.
    pub github_client_id: String,
    pub github_client_secret: String,
    pub session_secret: String,
    /// Service token workers use for clones and API calls.
    pub github_token: String,
    pub github_api_url: String,
    /// Root directory for working copies.
    pub workspace: PathBuf,
    pub limits: WorkerLimits,
    pub worker_tick: Duration,
    pub scheduler_tick: Duration,
    pub job_timeout: Duration,
    pub shutdown_deadline: Duration,
    pub http_timeout: Duration,
}

impl PulseConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let string = |key: &str| lookup(key).unwrap_or_default();
        let number = |key: &str, default: u64| {
            lookup(key)
                .and_then(|s| s.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };
        // Zero workers would starve a job type forever.
        let workers = |key: &str, default: usize| {
            lookup(key)
                .and_then(|s| s.trim().parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(default)
        };

        let github_client_id = string("PULSE_GITHUB_CLIENT_ID");
        let github_client_secret = string("PULSE_GITHUB_CLIENT_SECRET");
        let session_secret = string("PULSE_SESSION_SECRET");
        let github_token = string("PULSE_GITHUB_TOKEN");
        let github_api_url = lookup("PULSE_GITHUB_API_URL")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "https://api.github.com".to_string());
        let workspace = lookup("PULSE_WORKSPACE")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./workspace"));

        let limits = WorkerLimits {
            clone: workers("PULSE_CLONE_WORKERS", 2),
            commit: workers("PULSE_COMMIT_WORKERS", 4),
            pull_request: workers("PULSE_PR_WORKERS", 2),
            stats: workers("PULSE_STATS_WORKERS", 4),
        };

        if github_client_id.is_empty() || github_client_secret.is_empty() {
            tracing::warn!("PULSE_GITHUB_CLIENT_ID/SECRET not set -- operator sign-in disabled");
        }
        if session_secret.is_empty() {
            tracing::warn!("PULSE_SESSION_SECRET not set -- sessions will not survive restarts");
        }
        if github_token.is_empty() {
            tracing::warn!("PULSE_GITHUB_TOKEN not set -- private repositories cannot be analyzed");
        }

        Self {
            github_client_id,
            github_client_secret,
            session_secret,
            github_token,
            github_api_url,
            workspace,
            limits,
            worker_tick: Duration::from_secs(number("PULSE_WORKER_TICK_SECS", 2).max(1)),
            scheduler_tick: Duration::from_secs(number("PULSE_SCHEDULER_TICK_SECS", 60).max(1)),
            job_timeout: Duration::from_secs(number("PULSE_JOB_TIMEOUT_SECS", 1800).max(1)),
            shutdown_deadline: Duration::from_secs(number("PULSE_SHUTDOWN_DEADLINE_SECS", 2)),
            http_timeout: Duration::from_secs(number("PULSE_HTTP_TIMEOUT_SECS", 30).max(1)),
        }
    }

    pub fn pool(&self) -> PoolConfig {
        PoolConfig {
            limits: self.limits,
            tick: self.worker_tick,
            job_timeout: self.job_timeout,
        }
    }
}

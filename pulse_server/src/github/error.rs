//! Platform API error classification.

use std::time::Duration;

use thiserror::Error;

use crate::error::CoreError;
use crate::retry::{RetryHint, Retryable};

#[derive(Debug, Error)]
pub enum GithubError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited{}", wait_suffix(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("permanent failure: {0}")]
    Permanent(String),
}

fn wait_suffix(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(" for {}s", d.as_secs()))
        .unwrap_or_default()
}

impl GithubError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::NotFound(_) => "not_found",
            Self::RateLimited { .. } => "rate_limited",
            Self::Transient(_) => "transient",
            Self::Permanent(_) => "permanent",
        }
    }
}

impl Retryable for GithubError {
    fn retry_hint(&self) -> RetryHint {
        match self {
            Self::RateLimited {
                retry_after: Some(delay),
            } => RetryHint::After(*delay),
            Self::RateLimited { retry_after: None } | Self::Transient(_) => RetryHint::Backoff,
            Self::Auth(_) | Self::NotFound(_) | Self::Permanent(_) => RetryHint::Stop,
        }
    }
}

impl From<CoreError> for GithubError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::RateLimited { retry_after } => Self::RateLimited { retry_after },
            CoreError::NotFound(msg) => Self::NotFound(msg),
            CoreError::Forbidden(msg) => Self::Auth(msg),
            CoreError::TransientIo(msg) => Self::Transient(msg),
            other => Self::Permanent(other.to_string()),
        }
    }
}

impl From<GithubError> for CoreError {
    fn from(err: GithubError) -> Self {
        match err {
            GithubError::Auth(msg) => CoreError::Forbidden(format!("github authentication failed: {msg}")),
            GithubError::NotFound(msg) => CoreError::NotFound(msg),
            GithubError::RateLimited { retry_after } => CoreError::RateLimited { retry_after },
            GithubError::Transient(msg) => CoreError::TransientIo(format!("github: {msg}")),
            GithubError::Permanent(msg) => CoreError::PermanentIo(format!("github: {msg}")),
        }
    }
}

impl From<reqwest::Error> for GithubError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            Self::Transient(err.to_string())
        } else if err.is_decode() {
            Self::Permanent(format!("unexpected response body: {err}"))
        } else {
            Self::Transient(err.to_string())
        }
    }
}

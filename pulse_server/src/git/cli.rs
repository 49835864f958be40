//! `git` CLI implementation of [`Git`].

use std::path::Path;
use std::process::Output;

use async_trait::async_trait;
use reqwest::Url;
use tokio::process::Command;

use super::log::{parse_log, LOG_FORMAT};
use super::{Git, GitError, WalkedCommit};

pub struct GitCli {
    binary: String,
}

impl GitCli {
    pub fn new() -> Self {
        Self {
            binary: "git".to_string(),
        }
    }

    async fn run(&self, dir: Option<&Path>, args: &[&str], token: &str) -> Result<Output, GitError> {
        let mut cmd = Command::new(&self.binary);
        if let Some(dir) = dir {
            cmd.arg("-C").arg(dir);
        }
        cmd.args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("LC_ALL", "C")
            .kill_on_drop(true);

        let output = cmd.output().await?;
        if output.status.success() {
            return Ok(output);
        }
        let stderr = redact(&String::from_utf8_lossy(&output.stderr), token);
        let command = redact(&args.join(" "), token);
        Err(classify_failure(&command, stderr.trim()))
    }

    /// Exit status only; used for predicates such as `merge-base --is-ancestor`.
    async fn succeeds(&self, dir: &Path, args: &[&str]) -> Result<bool, GitError> {
        let status = Command::new(&self.binary)
            .arg("-C")
            .arg(dir)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true)
            .status()
            .await?;
        Ok(status.success())
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Git for GitCli {
    async fn clone_or_open(
        &self,
        clone_url: &str,
        path: &Path,
        token: &str,
    ) -> Result<bool, GitError> {
        if path.join("HEAD").is_file() {
            tracing::debug!(path = %path.display(), "Reusing existing working copy");
            return Ok(false);
        }
        if path.exists() {
            tracing::warn!(path = %path.display(), "Removing incomplete working copy");
            tokio::fs::remove_dir_all(path).await?;
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let authed = authenticated_url(clone_url, token)?;
        let dest = path.to_string_lossy();
        self.run(None, &["clone", "--bare", "--quiet", &authed, &dest], token)
            .await?;
        // Keep the token out of the on-disk config.
        self.run(Some(path), &["remote", "set-url", "origin", clone_url], token)
            .await?;

        tracing::info!(path = %path.display(), "Cloned repository");
        Ok(true)
    }

    async fn fetch(&self, path: &Path, clone_url: &str, token: &str) -> Result<(), GitError> {
        let authed = authenticated_url(clone_url, token)?;
        self.run(
            Some(path),
            &[
                "fetch",
                "--quiet",
                "--prune",
                &authed,
                "+refs/heads/*:refs/heads/*",
            ],
            token,
        )
        .await?;
        Ok(())
    }

    async fn head(&self, path: &Path, branch: &str) -> Result<Option<String>, GitError> {
        let reference = format!("refs/heads/{branch}^{{commit}}");
        match self
            .run(Some(path), &["rev-parse", "--verify", "--quiet", &reference], "")
            .await
        {
            Ok(output) => {
                let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
                Ok((!sha.is_empty()).then_some(sha))
            }
            Err(GitError::Permanent(_)) => Ok(None),
            Err(other) => Err(other),
        }
    }

    async fn walk_commits(
        &self,
        path: &Path,
        branch: &str,
        since: Option<&str>,
    ) -> Result<Vec<WalkedCommit>, GitError> {
        let tip = format!("refs/heads/{branch}");
        let range = match since {
            Some(since) => {
                if self
                    .succeeds(path, &["merge-base", "--is-ancestor", since, &tip])
                    .await?
                {
                    format!("{since}..{tip}")
                } else {
                    tracing::warn!(
                        path = %path.display(),
                        since,
                        "Last ingested commit is no longer in history, walking everything"
                    );
                    tip.clone()
                }
            }
            None => tip.clone(),
        };

        let output = self
            .run(
                Some(path),
                &[
                    "log",
                    "--reverse",
                    "--raw",
                    "--numstat",
                    "-M",
                    "--no-color",
                    "--no-abbrev",
                    LOG_FORMAT,
                    &range,
                    "--",
                ],
                "",
            )
            .await?;
        parse_log(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Embed `token` as basic-auth credentials for HTTPS remotes.
fn authenticated_url(clone_url: &str, token: &str) -> Result<String, GitError> {
    if token.is_empty() {
        return Ok(clone_url.to_string());
    }
    let mut url = Url::parse(clone_url)
        .map_err(|e| GitError::Permanent(format!("invalid clone url {clone_url}: {e}")))?;
    if url.scheme() != "https" {
        return Ok(clone_url.to_string());
    }
    url.set_username("x-access-token")
        .and_then(|_| url.set_password(Some(token)))
        .map_err(|_| GitError::Permanent(format!("cannot embed credentials in {clone_url}")))?;
    Ok(url.to_string())
}

fn redact(text: &str, token: &str) -> String {
    if token.is_empty() {
        text.to_string()
    } else {
        text.replace(token, "***")
    }
}

fn classify_failure(command: &str, stderr: &str) -> GitError {
    let lower = stderr.to_lowercase();
    let detail = format!("git {command}: {stderr}");
    if lower.contains("authentication failed")
        || lower.contains("could not read username")
        || lower.contains("permission denied")
    {
        GitError::Auth(detail)
    } else if lower.contains("repository not found") || lower.contains("does not appear to be a git repository") {
        GitError::NotFound(detail)
    } else if lower.contains("could not resolve host")
        || lower.contains("connection")
        || lower.contains("timed out")
        || lower.contains("early eof")
        || lower.contains("the remote end hung up")
        || lower.contains("http 5")
    {
        GitError::Transient(detail)
    } else {
        GitError::Permanent(detail)
    }
}

//! Parser for `git log --raw --numstat` output.
//!
//! Each commit is emitted as a record starting with `\x1e` whose header fields
//! are separated by `\x1f`. The raw section (`:old new sha sha STATUS\tpath`)
//! and the numstat section (`adds\tdels\tpath`) list the same file pairs in
//! the same order, so they are zipped by position: status and path come from
//! the raw line, counts from the numstat line.

use chrono::{DateTime, Utc};

use super::{GitError, WalkedCommit, WalkedFile};
use crate::models::commit::FileStatus;

/// `--format` argument matching [`parse_log`].
pub const LOG_FORMAT: &str = "--format=%x1e%H%x1f%ae%x1f%an%x1f%aI%x1f%B%x1f";

const RECORD: char = '\x1e';
const FIELD: char = '\x1f';

pub fn parse_log(output: &str) -> Result<Vec<WalkedCommit>, GitError> {
    output
        .split(RECORD)
        .filter(|record| !record.trim().is_empty())
        .map(parse_record)
        .collect()
}

fn parse_record(record: &str) -> Result<WalkedCommit, GitError> {
    let mut fields = record.splitn(6, FIELD);
    let mut next = |name: &str| {
        fields
            .next()
            .ok_or_else(|| GitError::Permanent(format!("malformed log record: missing {name}")))
    };
    let sha = next("sha")?.trim().to_string();
    let author_email = next("author email")?.to_string();
    let author_name = next("author name")?.to_string();
    let date = next("date")?;
    let message = next("message")?.trim_end().to_string();
    let changes = next("changes")?;

    let commit_date = DateTime::parse_from_rfc3339(date.trim())
        .map_err(|e| GitError::Permanent(format!("bad commit date {date:?}: {e}")))?
        .with_timezone(&Utc);

    Ok(WalkedCommit {
        sha,
        author_email,
        author_name,
        commit_date,
        message,
        files: parse_changes(changes)?,
    })
}

fn parse_changes(section: &str) -> Result<Vec<WalkedFile>, GitError> {
    let mut raw = Vec::new();
    let mut numstat = Vec::new();
    for line in section.lines().filter(|l| !l.is_empty()) {
        if let Some(rest) = line.strip_prefix(':') {
            raw.push(parse_raw_line(rest)?);
        } else {
            numstat.push(parse_numstat_line(line)?);
        }
    }

    if raw.len() != numstat.len() {
        return Err(GitError::Permanent(format!(
            "raw and numstat sections disagree: {} vs {} entries",
            raw.len(),
            numstat.len()
        )));
    }

    Ok(raw
        .into_iter()
        .zip(numstat)
        .map(|((status, path), (additions, deletions))| WalkedFile {
            path,
            additions,
            deletions,
            status,
        })
        .collect())
}

/// `100644 100644 abc123 def456 R087\told\tnew` without the leading colon.
fn parse_raw_line(line: &str) -> Result<(FileStatus, String), GitError> {
    let malformed = || GitError::Permanent(format!("malformed raw line: {line}"));
    let (meta, paths) = line.split_once('\t').ok_or_else(malformed)?;
    let code = meta.split_whitespace().nth(4).ok_or_else(malformed)?;
    let status = match code.chars().next() {
        Some('A') | Some('C') => FileStatus::Added,
        Some('D') => FileStatus::Removed,
        Some('R') => FileStatus::Renamed,
        Some('M') | Some('T') | Some('U') | Some('X') => FileStatus::Modified,
        _ => return Err(malformed()),
    };
    // Renames and copies list the old path first.
    let path = paths.rsplit('\t').next().ok_or_else(malformed)?;
    Ok((status, path.to_string()))
}

/// `12\t3\tpath`; binary files report `-\t-\tpath`.
fn parse_numstat_line(line: &str) -> Result<(i32, i32), GitError> {
    let malformed = || GitError::Permanent(format!("malformed numstat line: {line}"));
    let mut parts = line.splitn(3, '\t');
    let mut count = || -> Result<i32, GitError> {
        match parts.next().ok_or_else(malformed)? {
            "-" => Ok(0),
            n => n.parse().map_err(|_| malformed()),
        }
    };
    let additions = count()?;
    let deletions = count()?;
    Ok((additions, deletions))
}

//! Failure messages persisted on failed jobs.
//!
//! Messages carry a short fingerprint of the normalised text so repeated
//! failures of the same kind are recognisable across jobs.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::error::CoreError;

static NUMERIC_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d+\b").unwrap());
static PATH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/[a-zA-Z0-9_./-]+").unwrap());
static HEX_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[0-9a-f]{7,40}\b").unwrap());

const MAX_MESSAGE_CHARS: usize = 2000;

/// Normalize error text for fingerprinting: remove numbers, hashes, paths, whitespace.
pub fn normalize(text: &str) -> String {
    let text = HEX_REGEX.replace_all(text, "H");
    let text = NUMERIC_REGEX.replace_all(&text, "N");
    let text = PATH_REGEX.replace_all(&text, "PATH");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Hex SHA-256 of normalized error text.
pub fn fingerprint(normalized: &str) -> String {
    let hash = Sha256::digest(normalized.as_bytes());
    hex::encode(&hash[..16])
}

/// `"<code>: <message> [tag <8 hex>]"`.
pub fn failure_message(err: &CoreError) -> String {
    format_failure(err.code(), &err.to_string())
}

pub fn format_failure(code: &str, message: &str) -> String {
    let message: String = message.chars().take(MAX_MESSAGE_CHARS).collect();
    let tag = fingerprint(&normalize(&format!("{code}: {message}")));
    format!("{code}: {message} [tag {}]", &tag[..8])
}

/// Text of a panic payload from a crashed unit.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

//! Ranking of commit emails against a platform username.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::Serialize;
use strsim::jaro_winkler;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailSuggestion {
    pub email: String,
    pub score: f64,
}

fn tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| matches!(c, '.' | '_' | '+' | '-') || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Similarity in `[0, 1]` between a username and an email's local part.
pub fn score(username: &str, email: &str) -> f64 {
    let username = username.trim().to_lowercase();
    let email = email.trim().to_lowercase();
    let local = email.split('@').next().unwrap_or_default();

    let edit = jaro_winkler(&username, local);
    let overlap = jaccard(&tokens(&username), &tokens(local));
    (edit * 0.6) + (overlap * 0.4)
}

/// Emails ordered by descending score, ties broken by email.
pub fn rank<'a, I>(username: &str, emails: I) -> Vec<EmailSuggestion>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut ranked: Vec<EmailSuggestion> = emails
        .into_iter()
        .map(|email| EmailSuggestion {
            email: email.to_string(),
            score: score(username, email),
        })
        .collect();
    ranked.sort_by(|a, b| match b.score.total_cmp(&a.score) {
        Ordering::Equal => a.email.cmp(&b.email),
        other => other,
    });
    ranked
}

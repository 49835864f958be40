//! Email merge graph of a single project.
//!
//! Edges run `source -> target`. The graph is kept acyclic at insertion and
//! every source has at most one outgoing edge, so resolution follows a simple
//! path to a fixed point.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{CoreError, CoreResult};
use crate::models::identity::{normalize_email, EmailMerge};

#[derive(Debug, Clone, Default)]
pub struct MergeGraph {
    edges: BTreeMap<String, String>,
}

impl MergeGraph {
    pub fn new<I, S>(edges: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: AsRef<str>,
    {
        Self {
            edges: edges
                .into_iter()
                .map(|(s, t)| (normalize_email(s.as_ref()), normalize_email(t.as_ref())))
                .collect(),
        }
    }

    pub fn from_merges(merges: &[EmailMerge]) -> Self {
        Self::new(
            merges
                .iter()
                .map(|m| (m.source_email.as_str(), m.target_email.as_str())),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Follow merges from `email` to its fixed point.
    ///
    /// Stops at the first repeated address, so rows written before cycle
    /// checks existed cannot hang the caller.
    pub fn resolve(&self, email: &str) -> String {
        let mut current = normalize_email(email);
        let mut seen = BTreeSet::new();
        while let Some(next) = self.edges.get(&current) {
            if !seen.insert(current.clone()) {
                break;
            }
            current = next.clone();
        }
        current
    }

    /// Every merged source mapped to its ultimate target.
    pub fn closure(&self) -> BTreeMap<String, String> {
        self.edges
            .keys()
            .map(|source| (source.clone(), self.resolve(source)))
            .collect()
    }

    /// Reject a new `source -> target` edge that would duplicate a source or
    /// close a cycle.
    pub fn check_new_edge(&self, source: &str, target: &str) -> CoreResult<()> {
        let source = normalize_email(source);
        let target = normalize_email(target);
        if source.is_empty() || target.is_empty() {
            return Err(CoreError::InvalidInput("merge emails must not be empty".to_string()));
        }
        if source == target {
            return Err(CoreError::InvalidInput(format!(
                "cannot merge {source} into itself"
            )));
        }
        if let Some(existing) = self.edges.get(&source) {
            return Err(CoreError::conflict(format!(
                "{source} is already merged into {existing}"
            )));
        }
        if self.resolve(&target) == source {
            return Err(CoreError::conflict(format!(
                "merging {source} into {target} would create a cycle"
            )));
        }
        Ok(())
    }
}

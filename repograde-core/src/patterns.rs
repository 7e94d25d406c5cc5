//! Whole-path pattern matching for artifact classification.
//!
//! Pattern lists are plain `&[&str]` data. A [`PatternSet`] anchors every
//! pattern at both ends, so `Cargo\.toml` only matches a root `Cargo.toml`
//! and never `vendor/Cargo.toml.orig`.

use regex::RegexSet;

use crate::domain::TreeEntry;
use crate::error::Result;

/// A compiled, anchored set of path patterns.
#[derive(Debug, Clone)]
pub struct PatternSet {
    set: RegexSet,
}

impl PatternSet {
    /// Compile a list of patterns for whole-path matching.
    pub fn new(patterns: &[&str]) -> Result<Self> {
        let anchored = patterns.iter().map(|pattern| format!("^(?:{pattern})$"));
        Ok(Self {
            set: RegexSet::new(anchored)?,
        })
    }

    /// Whether the entire path matches any pattern.
    pub fn matches(&self, path: &str) -> bool {
        self.set.is_match(path)
    }

    /// Number of patterns in the set.
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// Whether the set holds no patterns.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Paths of file entries matching the set, in input order.
    pub fn matching_files(&self, entries: &[TreeEntry]) -> Vec<String> {
        entries
            .iter()
            .filter(|entry| entry.is_file() && self.matches(&entry.path))
            .map(|entry| entry.path.clone())
            .collect()
    }
}

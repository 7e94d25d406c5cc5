//! Sensitive-file detection with a safe-list override.

use crate::cicd::BUILD_PATTERNS;
use crate::domain::{SecurityStats, TreeEntry};
use crate::error::Result;
use crate::patterns::PatternSet;

/// Credential, key, and environment files that should not be committed.
pub const SENSITIVE_PATTERNS: &[&str] = &[
    r"(?:.*/)?\.env(?:\.[^/]+)?",
    r"(?:.*/)?[^/]+\.(?:pem|key|p12|pfx|jks|keystore)",
    r"(?:.*/)?id_(?:rsa|dsa|ecdsa|ed25519)",
    r"(?:.*/)?authorized_keys",
    r"(?:.*/)?(?:credentials|secrets)(?:\.[^/]+)?",
    r"(?:.*/)?[^/]+\.secret",
    r"(?:.*/)?\.(?:npmrc|pypirc|netrc)",
    r"(?:.*/)?[^/]*(?:token|secret)[^/]*\.(?:txt|json)",
];

/// Placeholder variants that are excluded even when a sensitive pattern matches.
pub const SAFE_PATTERNS: &[&str] = &[
    r"(?:.*/)?[^/]*[._-](?:example|template|sample|dummy|test|fixture|mock)s?(?:[._-][^/]*)?",
    r"(?:.*/)?(?:example|template|sample|dummy|test|fixture|mock)s?[._-][^/]*",
    r"(?:.*/)?(?:examples?|templates?|samples?|fixtures?|mocks?|tests?|testdata|__tests__|spec)/.*",
];

/// Classifies committed secrets and build manifests.
#[derive(Debug, Clone)]
pub struct SecurityClassifier {
    sensitive: PatternSet,
    safe: PatternSet,
    build: PatternSet,
}

impl SecurityClassifier {
    /// Build a classifier with the standard pattern lists.
    pub fn new() -> Result<Self> {
        Self::with_patterns(SENSITIVE_PATTERNS, SAFE_PATTERNS, BUILD_PATTERNS)
    }

    /// Build a classifier with custom pattern lists.
    pub fn with_patterns(sensitive: &[&str], safe: &[&str], build: &[&str]) -> Result<Self> {
        Ok(Self {
            sensitive: PatternSet::new(sensitive)?,
            safe: PatternSet::new(safe)?,
            build: PatternSet::new(build)?,
        })
    }

    /// Whether a single path is flagged as sensitive.
    ///
    /// The safe-list is checked first and wins.
    pub fn is_sensitive(&self, path: &str) -> bool {
        if self.safe.matches(path) {
            return false;
        }
        self.sensitive.matches(path)
    }

    /// Classify the given entries. Only file entries are considered.
    pub fn classify(&self, entries: &[TreeEntry]) -> SecurityStats {
        let sensitive_files: Vec<String> = entries
            .iter()
            .filter(|entry| entry.is_file() && self.is_sensitive(&entry.path))
            .map(|entry| entry.path.clone())
            .collect();
        let build_files = self.build.matching_files(entries);

        SecurityStats {
            has_sensitive_file: !sensitive_files.is_empty(),
            sensitive_files,
            has_build_file: !build_files.is_empty(),
            build_files,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SecurityClassifier;
    use crate::domain::{SecurityStats, TreeEntry};

    fn classifier() -> SecurityClassifier {
        SecurityClassifier::new().expect("patterns")
    }

    #[test]
    fn flags_keys_and_env_files() {
        let classifier = classifier();
        for path in [
            ".env",
            "config/.env.production",
            "deploy/server.pem",
            "id_rsa",
            "home/.ssh/authorized_keys",
            "credentials.json",
            "api_token.txt",
            ".npmrc",
        ] {
            assert!(classifier.is_sensitive(path), "expected {path} to be flagged");
        }
    }

    #[test]
    fn safe_list_wins_over_sensitive_match() {
        let classifier = classifier();
        for path in [
            ".env.example",
            ".env.sample",
            "config/.env.template",
            "credentials.example.json",
            "certs/dummy.pem",
            "tests/fixtures/server.key",
            "keys/test_id.pem",
        ] {
            assert!(!classifier.is_sensitive(path), "expected {path} to be safe");
        }
    }

    #[test]
    fn ordinary_files_are_not_flagged() {
        let classifier = classifier();
        for path in ["src/env.rs", "README.md", ".envrc", "id_rsa.pub", "keyboard.rs"] {
            assert!(!classifier.is_sensitive(path), "unexpected flag for {path}");
        }
    }

    #[test]
    fn classify_collects_matches_and_build_files() {
        let entries = vec![
            TreeEntry::file(".env"),
            TreeEntry::file(".env.example"),
            TreeEntry::file("pom.xml"),
            TreeEntry::directory("secrets"),
        ];
        let stats = classifier().classify(&entries);
        assert!(stats.has_sensitive_file);
        assert_eq!(stats.sensitive_files, vec![".env"]);
        assert!(stats.has_build_file);
        assert_eq!(stats.build_files, vec!["pom.xml"]);
    }

    #[test]
    fn empty_tree_yields_empty_result() {
        assert_eq!(classifier().classify(&[]), SecurityStats::default());
    }
}

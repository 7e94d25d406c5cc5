//! CI/CD, build manifest, and container detection.

use crate::domain::{CicdStats, TreeEntry};
use crate::error::Result;
use crate::patterns::PatternSet;

/// Workflow and continuous-integration definitions.
pub const CI_PATTERNS: &[&str] = &[
    r"\.github/workflows/[^/]+\.ya?ml",
    r"\.gitlab-ci\.ya?ml",
    r"\.circleci/config\.ya?ml",
    r"(?:.*/)?Jenkinsfile",
    r"\.travis\.ya?ml",
    r"azure-pipelines\.ya?ml",
    r"bitbucket-pipelines\.ya?ml",
    r"\.drone\.ya?ml",
    r"\.?appveyor\.ya?ml",
    r"\.buildkite/[^/]+\.ya?ml",
];

/// Build-tool manifests.
pub const BUILD_PATTERNS: &[&str] = &[
    r"(?:.*/)?pom\.xml",
    r"(?:.*/)?build\.gradle(?:\.kts)?",
    r"(?:.*/)?package\.json",
    r"(?:.*/)?Cargo\.toml",
    r"(?:.*/)?go\.mod",
    r"(?:.*/)?requirements\.txt",
    r"(?:.*/)?setup\.py",
    r"(?:.*/)?pyproject\.toml",
    r"(?:.*/)?Makefile",
    r"(?:.*/)?CMakeLists\.txt",
    r"(?:.*/)?Gemfile",
    r"(?:.*/)?composer\.json",
];

/// Container build and composition files.
pub const CONTAINER_PATTERNS: &[&str] = &[
    r"(?:.*/)?Dockerfile(?:\.[^/]+)?",
    r"(?:.*/)?[^/]+\.Dockerfile",
    r"(?:.*/)?(?:docker-)?compose\.ya?ml",
    r"(?:.*/)?Containerfile",
];

/// Classifies CI/CD configuration from a file-tree snapshot.
#[derive(Debug, Clone)]
pub struct CicdClassifier {
    ci: PatternSet,
    build: PatternSet,
    container: PatternSet,
}

impl CicdClassifier {
    /// Build a classifier with the standard pattern lists.
    pub fn new() -> Result<Self> {
        Self::with_patterns(CI_PATTERNS, BUILD_PATTERNS, CONTAINER_PATTERNS)
    }

    /// Build a classifier with custom pattern lists.
    pub fn with_patterns(ci: &[&str], build: &[&str], container: &[&str]) -> Result<Self> {
        Ok(Self {
            ci: PatternSet::new(ci)?,
            build: PatternSet::new(build)?,
            container: PatternSet::new(container)?,
        })
    }

    /// Classify the given entries. Only file entries are considered.
    pub fn classify(&self, entries: &[TreeEntry]) -> CicdStats {
        let cicd_files = self.ci.matching_files(entries);
        let build_files = self.build.matching_files(entries);
        let container_files = self.container.matching_files(entries);

        CicdStats {
            has_cicd: !cicd_files.is_empty(),
            cicd_files,
            has_build_file: !build_files.is_empty(),
            build_files,
            has_container_file: !container_files.is_empty(),
            container_files,
        }
    }

    /// Build manifests present in the entries.
    pub fn build_files(&self, entries: &[TreeEntry]) -> Vec<String> {
        self.build.matching_files(entries)
    }
}

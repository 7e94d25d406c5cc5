//! Combined artifact classification over a file-tree snapshot.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::cicd::CicdClassifier;
use crate::domain::{CicdStats, SecurityStats, TestStats, TreeEntry};
use crate::error::Result;
use crate::inspector::TestClassifier;
use crate::security::SecurityClassifier;

/// Findings from every path-based classifier.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct ArtifactFindings {
    /// Test layout.
    pub tests: TestStats,
    /// CI/CD configuration.
    pub cicd: CicdStats,
    /// Sensitive files and build manifests.
    pub security: SecurityStats,
}

/// Runs the CI/CD, security, and test classifiers together.
#[derive(Debug, Clone)]
pub struct ArtifactClassifier {
    cicd: CicdClassifier,
    security: SecurityClassifier,
    tests: TestClassifier,
}

impl ArtifactClassifier {
    /// Compile the standard pattern lists.
    pub fn new() -> Result<Self> {
        Ok(Self {
            cicd: CicdClassifier::new()?,
            security: SecurityClassifier::new()?,
            tests: TestClassifier::new()?,
        })
    }

    /// Classify a snapshot. A missing tree yields empty findings.
    pub fn classify(&self, entries: Option<&[TreeEntry]>) -> ArtifactFindings {
        let Some(entries) = entries.filter(|entries| !entries.is_empty()) else {
            return ArtifactFindings::default();
        };
        ArtifactFindings {
            tests: self.tests.classify(entries),
            cicd: self.cicd.classify(entries),
            security: self.security.classify(entries),
        }
    }
}

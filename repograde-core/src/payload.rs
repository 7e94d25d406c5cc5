//! Wire payloads returned by the GitHub REST API.
//!
//! Only the fields the pipeline reads are modelled; everything else is ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{EntryKind, RepositoryIdentity, TreeEntry};

/// `GET /repos/{owner}/{repo}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RepositoryPayload {
    /// Repository name.
    pub name: String,
    /// Canonical HTML URL.
    pub html_url: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Primary language.
    #[serde(default)]
    pub language: Option<String>,
    /// Default branch.
    #[serde(default)]
    pub default_branch: Option<String>,
    /// Size in kilobytes.
    #[serde(default)]
    pub size: Option<u64>,
}

impl RepositoryPayload {
    /// Default branch, falling back to `main`.
    pub fn branch(&self) -> &str {
        self.default_branch.as_deref().unwrap_or("main")
    }

    /// Convert into the domain identity.
    pub fn identity(&self) -> RepositoryIdentity {
        RepositoryIdentity {
            name: self.name.clone(),
            url: self.html_url.clone(),
            description: self.description.clone(),
            primary_language: self.language.clone(),
            default_branch: self.branch().to_string(),
            size_kb: self.size,
        }
    }
}

/// Author or committer signature on a commit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommitSignature {
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Signature timestamp.
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

/// Inner git commit object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommitDetail {
    /// Full commit message.
    #[serde(default)]
    pub message: Option<String>,
    /// Author signature.
    #[serde(default)]
    pub author: Option<CommitSignature>,
}

/// Element of `GET /repos/{owner}/{repo}/commits`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommitPayload {
    /// Commit SHA.
    #[serde(default)]
    pub sha: String,
    /// Git commit object.
    pub commit: CommitDetail,
}

impl CommitPayload {
    /// Authored timestamp, if present.
    pub fn authored_at(&self) -> Option<DateTime<Utc>> {
        self.commit.author.as_ref().and_then(|author| author.date)
    }
}

/// Element of a git tree listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeItem {
    /// Path relative to the repository root.
    pub path: String,
    /// Git object type (`blob`, `tree`, `commit`).
    #[serde(rename = "type")]
    pub kind: String,
}

/// `GET /repos/{owner}/{repo}/git/trees/{branch}?recursive=1`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TreePayload {
    /// Tree entries.
    #[serde(default)]
    pub tree: Vec<TreeItem>,
    /// Whether the host truncated the listing.
    #[serde(default)]
    pub truncated: bool,
}

impl TreePayload {
    /// Flatten into classifier input.
    pub fn entries(&self) -> Vec<TreeEntry> {
        self.tree
            .iter()
            .map(|item| TreeEntry {
                path: item.path.clone(),
                kind: EntryKind::from_git_type(&item.kind),
            })
            .collect()
    }
}

/// Element of `GET /repos/{owner}/{repo}/issues`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IssuePayload {
    /// Title.
    #[serde(default)]
    pub title: String,
    /// `open` or `closed`.
    #[serde(default)]
    pub state: String,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Close timestamp.
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    /// Present when the item is really a pull request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<serde_json::Value>,
}

impl IssuePayload {
    /// Whether the issue carries a pull-request back-reference.
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

/// Element of `GET /repos/{owner}/{repo}/pulls`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PullRequestPayload {
    /// Title.
    #[serde(default)]
    pub title: String,
    /// `open` or `closed`.
    #[serde(default)]
    pub state: String,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Merge timestamp.
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
}

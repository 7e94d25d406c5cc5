//! Domain entities for RepoGrade.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Maximum number of entries kept in any "recent" list.
pub const RECENT_LIMIT: usize = 10;

/// Upper bound for each rubric sub-score.
pub const MAX_SUB_SCORE: u8 = 25;

/// A mapping of language names to their percentage of total lines.
pub type LanguageDistribution = BTreeMap<String, f64>;

/// A mapping of language names to the bytes reported by the source host.
pub type LanguageBytes = BTreeMap<String, u64>;

/// Kind of an entry in a repository file-tree snapshot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// A regular file.
    File,
    /// A directory.
    Directory,
    /// Anything else (submodules, symlinks reported by the host).
    Other,
}

impl EntryKind {
    /// Map a git object type (`blob`, `tree`, `commit`) to an entry kind.
    pub fn from_git_type(value: &str) -> Self {
        match value {
            "blob" => Self::File,
            "tree" => Self::Directory,
            _ => Self::Other,
        }
    }

    /// Stable string label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Directory => "directory",
            Self::Other => "other",
        }
    }
}

/// A single path in a file-tree snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TreeEntry {
    /// Slash-separated path relative to the repository root.
    pub path: String,
    /// Entry kind.
    pub kind: EntryKind,
}

impl TreeEntry {
    /// Build a file entry.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
        }
    }

    /// Build a directory entry.
    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
        }
    }

    /// Whether the entry is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// Final path segment.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Identity of the analysed repository.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct RepositoryIdentity {
    /// Repository name.
    pub name: String,
    /// Canonical HTML URL.
    pub url: String,
    /// Free-text description.
    pub description: Option<String>,
    /// Primary language reported by the host.
    pub primary_language: Option<String>,
    /// Default branch name.
    pub default_branch: String,
    /// Repository size in kilobytes, when reported.
    pub size_kb: Option<u64>,
}

/// README statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct ReadmeStats {
    /// Whether a non-blank README exists.
    pub has_readme: bool,
    /// Length of the README in characters.
    pub length: usize,
    /// Section titles in document order.
    pub sections: Vec<String>,
    /// Number of sections.
    pub section_count: usize,
}

/// A recent commit summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RecentCommit {
    /// First line of the commit message.
    pub message: String,
    /// Commit timestamp.
    pub committed_at: Option<DateTime<Utc>>,
}

/// Commit activity statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct CommitStats {
    /// Timestamp of the most recent commit.
    pub last_commit_at: Option<DateTime<Utc>>,
    /// Whole days since the most recent commit, never negative.
    pub days_since_last_commit: i64,
    /// Commits in the trailing 90-day window.
    pub commit_count_90d: usize,
    /// Up to ten recent commits, most recent first.
    pub recent_commits: Vec<RecentCommit>,
}

/// Test layout statistics.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct TestStats {
    /// Whether any file lives under a conventional test directory.
    pub has_test_directory: bool,
    /// Number of test files.
    pub test_file_count: usize,
    /// Number of non-test source files.
    pub source_file_count: usize,
    /// Test files per source file, rounded to three decimals.
    ///
    /// This is a filename heuristic, not execution coverage.
    pub coverage_ratio: f64,
}

/// CI/CD configuration statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct CicdStats {
    /// Whether a workflow or CI definition exists.
    pub has_cicd: bool,
    /// Matched CI definition paths.
    pub cicd_files: Vec<String>,
    /// Whether a build manifest exists.
    pub has_build_file: bool,
    /// Matched build manifest paths.
    pub build_files: Vec<String>,
    /// Whether a container build file exists.
    pub has_container_file: bool,
    /// Matched container build paths.
    pub container_files: Vec<String>,
}

/// Security-relevant file statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct SecurityStats {
    /// Whether a sensitive file is committed.
    pub has_sensitive_file: bool,
    /// Matched sensitive paths.
    pub sensitive_files: Vec<String>,
    /// Whether a build manifest exists.
    pub has_build_file: bool,
    /// Matched build manifest paths.
    pub build_files: Vec<String>,
}

/// A recent issue summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RecentIssue {
    /// Issue title.
    pub title: String,
    /// Issue state (`open` or `closed`).
    pub state: String,
    /// Creation timestamp.
    pub created_at: Option<DateTime<Utc>>,
    /// Close timestamp.
    pub closed_at: Option<DateTime<Utc>>,
}

/// Issue activity statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct IssueStats {
    /// Issues opened in the trailing six months.
    pub issue_count_6m: usize,
    /// Closed issues among them.
    pub closed_issue_count: usize,
    /// Up to ten recent issues.
    pub recent_issues: Vec<RecentIssue>,
}

/// A recent pull request summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RecentPullRequest {
    /// Pull request title.
    pub title: String,
    /// Pull request state.
    pub state: String,
    /// Creation timestamp.
    pub created_at: Option<DateTime<Utc>>,
    /// Merge timestamp.
    pub merged_at: Option<DateTime<Utc>>,
}

/// Pull request activity statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct PullRequestStats {
    /// Pull requests opened in the trailing six months.
    pub pull_request_count_6m: usize,
    /// Merged pull requests among them.
    pub merged_pull_request_count: usize,
    /// Up to ten recent pull requests.
    pub recent_pull_requests: Vec<RecentPullRequest>,
}

/// Every classified signal collected for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AggregateResult {
    /// Repository identity.
    pub repository: RepositoryIdentity,
    /// README statistics.
    pub readme: ReadmeStats,
    /// Commit statistics.
    pub commits: CommitStats,
    /// Test layout statistics.
    pub tests: TestStats,
    /// CI/CD statistics.
    pub cicd: CicdStats,
    /// Security statistics.
    pub security: SecurityStats,
    /// Issue statistics.
    pub issues: IssueStats,
    /// Pull request statistics.
    pub pull_requests: PullRequestStats,
    /// Language byte counts.
    pub languages: LanguageBytes,
    /// When collection finished.
    pub collected_at: DateTime<Utc>,
}

/// Rubric sub-scores. The total is always derived.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct ScoreBreakdown {
    /// README quality, 0-25.
    pub readme: u8,
    /// Test presence, 0-25.
    pub test: u8,
    /// Commit hygiene, 0-25.
    pub commit: u8,
    /// CI/CD maturity, 0-25.
    pub cicd: u8,
}

impl ScoreBreakdown {
    /// Build a breakdown, clamping every sub-score into the rubric range.
    pub fn clamped(readme: i64, test: i64, commit: i64, cicd: i64) -> Self {
        let clamp = |value: i64| value.clamp(0, MAX_SUB_SCORE as i64) as u8;
        Self {
            readme: clamp(readme),
            test: clamp(test),
            commit: clamp(commit),
            cicd: clamp(cicd),
        }
    }

    /// Sum of the sub-scores.
    pub fn total(&self) -> u32 {
        self.readme as u32 + self.test as u32 + self.commit as u32 + self.cicd as u32
    }
}

/// Parsed output of the evaluation model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Evaluation {
    /// One-paragraph summary.
    pub summary: String,
    /// Observed strengths.
    pub strengths: Vec<String>,
    /// Suggested improvements.
    pub improvements: Vec<String>,
    /// Rubric scores.
    pub scores: ScoreBreakdown,
}

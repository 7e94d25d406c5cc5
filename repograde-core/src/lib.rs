#![deny(missing_docs)]
//! RepoGrade core library.
//!
//! Domain types, artifact classifiers, and evaluation parsing shared by the
//! analysis server and the command-line client.

pub mod activity;
pub mod checkout;
pub mod cicd;
pub mod classifier;
pub mod domain;
pub mod error;
/// Evaluation rubric and model output parsing.
pub mod evaluation;
pub mod fs;
pub mod inspector;
pub mod patterns;
pub mod payload;
pub mod readme;
pub mod report;
pub mod security;

pub use checkout::inspect_checkout;
pub use cicd::CicdClassifier;
pub use classifier::{ArtifactClassifier, ArtifactFindings};
pub use domain::{
    AggregateResult, CicdStats, CommitStats, EntryKind, Evaluation, IssueStats, LanguageBytes,
    LanguageDistribution, PullRequestStats, ReadmeStats, RepositoryIdentity, ScoreBreakdown,
    SecurityStats, TestStats, TreeEntry,
};
pub use error::{RepoGradeError, Result};
pub use evaluation::{RUBRIC_PROMPT, extract_json, parse_evaluation};
pub use fs::{FileSystem, StdFileSystem};
pub use inspector::{LanguageInspector, TestClassifier};
pub use readme::{classify_optional_readme, classify_readme};
pub use report::{
    CheckoutReport, format_language_stats, render_checkout_markdown, render_checkout_text,
    render_json,
};
pub use security::SecurityClassifier;

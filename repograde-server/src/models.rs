//! Database models for the RepoGrade server.

use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::schema::{analysis_results, repositories, repository_languages, scores};

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = repositories)]
/// Analysed repository, one per requester and URL.
pub struct Repository {
    /// Repository identifier.
    pub id: i64,
    /// Requester that asked for the analysis.
    pub requester_id: String,
    /// Repository name.
    pub name: String,
    /// Canonical HTML URL.
    pub html_url: String,
    /// Description.
    pub description: Option<String>,
    /// Default branch.
    pub main_branch: String,
    /// Primary language.
    pub primary_language: Option<String>,
    /// Whether results are published.
    pub public: bool,
    /// Creation timestamp.
    pub created_at: NaiveDateTime,
    /// Last update timestamp.
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = repositories)]
/// Insertable repository.
pub struct NewRepository {
    /// Requester that asked for the analysis.
    pub requester_id: String,
    /// Repository name.
    pub name: String,
    /// Canonical HTML URL.
    pub html_url: String,
    /// Description.
    pub description: Option<String>,
    /// Default branch.
    pub main_branch: String,
    /// Primary language.
    pub primary_language: Option<String>,
    /// Whether results are published.
    pub public: bool,
    /// Creation timestamp.
    pub created_at: NaiveDateTime,
    /// Last update timestamp.
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = repositories)]
#[diesel(treat_none_as_null = true)]
/// Fields refreshed when a repository is analysed again.
pub struct RepositoryChanges {
    /// Repository name.
    pub name: String,
    /// Description.
    pub description: Option<String>,
    /// Default branch.
    pub main_branch: String,
    /// Primary language.
    pub primary_language: Option<String>,
    /// Last update timestamp.
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = repository_languages)]
#[diesel(belongs_to(Repository, foreign_key = repository_id))]
/// Byte count of one language in a repository.
pub struct RepositoryLanguage {
    /// Row identifier.
    pub id: i64,
    /// Parent repository.
    pub repository_id: i64,
    /// Language name.
    pub language: String,
    /// Bytes of code.
    pub bytes: i64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = repository_languages)]
/// Insertable language row.
pub struct NewRepositoryLanguage {
    /// Parent repository.
    pub repository_id: i64,
    /// Language name.
    pub language: String,
    /// Bytes of code.
    pub bytes: i64,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = analysis_results)]
#[diesel(belongs_to(Repository, foreign_key = repository_id))]
/// Stored evaluation of a repository.
pub struct AnalysisResultRow {
    /// Result identifier.
    pub id: i64,
    /// Parent repository.
    pub repository_id: i64,
    /// Summary paragraph.
    pub summary: String,
    /// Newline-joined strengths.
    pub strengths: String,
    /// Newline-joined improvements.
    pub improvements: String,
    /// Creation timestamp.
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = analysis_results)]
/// Insertable evaluation.
pub struct NewAnalysisResult {
    /// Parent repository.
    pub repository_id: i64,
    /// Summary paragraph.
    pub summary: String,
    /// Newline-joined strengths.
    pub strengths: String,
    /// Newline-joined improvements.
    pub improvements: String,
    /// Creation timestamp.
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = scores)]
#[diesel(belongs_to(AnalysisResultRow, foreign_key = analysis_result_id))]
/// Rubric scores of one evaluation.
pub struct Score {
    /// Row identifier.
    pub id: i64,
    /// Owning evaluation.
    pub analysis_result_id: i64,
    /// README score.
    pub readme_score: i32,
    /// Test score.
    pub test_score: i32,
    /// Commit score.
    pub commit_score: i32,
    /// CI/CD score.
    pub cicd_score: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = scores)]
/// Insertable score row.
pub struct NewScore {
    /// Owning evaluation.
    pub analysis_result_id: i64,
    /// README score.
    pub readme_score: i32,
    /// Test score.
    pub test_score: i32,
    /// Commit score.
    pub commit_score: i32,
    /// CI/CD score.
    pub cicd_score: i32,
}

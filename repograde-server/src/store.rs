//! Persistence of analysed repositories and their evaluations.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use repograde_core::evaluation::{clean_text, join_bullets, split_bullets};
use repograde_core::{Evaluation, LanguageBytes, RepositoryIdentity, ScoreBreakdown};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::DbPool;
use crate::models::{
    AnalysisResultRow, NewAnalysisResult, NewRepository, NewRepositoryLanguage, NewScore,
    Repository, RepositoryChanges, RepositoryLanguage, Score,
};
use crate::schema::{analysis_results, repositories, repository_languages, scores};

/// Error raised by an analysis store.
#[derive(Debug, Clone)]
pub struct StoreError {
    message: String,
}

impl StoreError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for StoreError {}

impl From<diesel::result::Error> for StoreError {
    fn from(err: diesel::result::Error) -> Self {
        StoreError::new(format!("database error: {err}"))
    }
}

/// Stored repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RepositoryRecord {
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
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Stored evaluation with its score breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AnalysisResultRecord {
    /// Result identifier.
    pub id: i64,
    /// Parent repository.
    pub repository_id: i64,
    /// Summary paragraph.
    pub summary: String,
    /// Strength bullets.
    pub strengths: Vec<String>,
    /// Improvement bullets.
    pub improvements: Vec<String>,
    /// Rubric scores.
    pub scores: ScoreBreakdown,
    /// Sum of the rubric scores.
    pub total_score: u32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Latest evaluation of one repository for a requester.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HistoryEntry {
    /// Repository.
    pub repository: RepositoryRecord,
    /// Language byte counts.
    pub languages: LanguageBytes,
    /// Most recent evaluation.
    pub latest_result: AnalysisResultRecord,
}

/// Repository data collected by one analysis run.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryUpsert {
    /// Requester that asked for the analysis.
    pub requester_id: String,
    /// Canonical URL the analysis was requested for.
    pub html_url: String,
    /// Repository identity reported by the host.
    pub identity: RepositoryIdentity,
    /// Language byte counts.
    pub languages: LanguageBytes,
}

/// Result of changing a repository's visibility.
#[derive(Debug, Clone, PartialEq)]
pub enum PublishOutcome {
    /// Visibility changed.
    Updated(RepositoryRecord),
    /// No such repository.
    NotFound,
    /// Publishing requires at least one evaluation.
    NoResults,
}

/// Storage for repositories, languages, and evaluations.
pub trait AnalysisStore: Send + Sync {
    /// Insert or refresh the repository and replace its languages.
    fn upsert_repository(&self, upsert: &RepositoryUpsert) -> Result<RepositoryRecord, StoreError>;
    /// Look up a repository by URL and requester.
    fn find_repository(
        &self,
        html_url: &str,
        requester_id: &str,
    ) -> Result<Option<RepositoryRecord>, StoreError>;
    /// Persist an evaluation and its scores as one unit.
    fn save_result(
        &self,
        repository_id: i64,
        evaluation: &Evaluation,
    ) -> Result<AnalysisResultRecord, StoreError>;
    /// Latest evaluation per repository for a requester, newest first.
    fn history(&self, requester_id: &str) -> Result<Vec<HistoryEntry>, StoreError>;
    /// Every evaluation of a repository, newest first.
    fn results_for_repository(
        &self,
        repository_id: i64,
    ) -> Result<Vec<AnalysisResultRecord>, StoreError>;
    /// A single evaluation.
    fn find_result(&self, result_id: i64) -> Result<Option<AnalysisResultRecord>, StoreError>;
    /// Delete an evaluation and its scores. Returns whether it existed.
    fn delete_result(&self, result_id: i64) -> Result<bool, StoreError>;
    /// Language byte counts, `None` for an unknown repository.
    fn languages(&self, repository_id: i64) -> Result<Option<LanguageBytes>, StoreError>;
    /// Publish or unpublish a repository's results.
    fn set_public(&self, repository_id: i64, public: bool) -> Result<PublishOutcome, StoreError>;
}

fn utc(value: NaiveDateTime) -> DateTime<Utc> {
    value.and_utc()
}

fn repository_record(row: Repository) -> RepositoryRecord {
    RepositoryRecord {
        id: row.id,
        requester_id: row.requester_id,
        name: row.name,
        html_url: row.html_url,
        description: row.description,
        main_branch: row.main_branch,
        primary_language: row.primary_language,
        public: row.public,
        created_at: utc(row.created_at),
        updated_at: utc(row.updated_at),
    }
}

fn result_record(row: AnalysisResultRow, score: Option<Score>) -> AnalysisResultRecord {
    let scores = score
        .map(|score| {
            ScoreBreakdown::clamped(
                score.readme_score.into(),
                score.test_score.into(),
                score.commit_score.into(),
                score.cicd_score.into(),
            )
        })
        .unwrap_or_default();
    AnalysisResultRecord {
        id: row.id,
        repository_id: row.repository_id,
        summary: row.summary,
        strengths: split_bullets(&row.strengths),
        improvements: split_bullets(&row.improvements),
        total_score: scores.total(),
        scores,
        created_at: utc(row.created_at),
    }
}

fn newest_first(left: &AnalysisResultRecord, right: &AnalysisResultRecord) -> std::cmp::Ordering {
    right
        .created_at
        .cmp(&left.created_at)
        .then(right.id.cmp(&left.id))
}

fn clamp_bytes(bytes: u64) -> i64 {
    i64::try_from(bytes).unwrap_or(i64::MAX)
}

type PgPooled = PooledConnection<ConnectionManager<PgConnection>>;

/// PostgreSQL-backed [`AnalysisStore`].
#[derive(Clone)]
pub struct PgAnalysisStore {
    pool: DbPool,
}

impl PgAnalysisStore {
    /// Store over an initialised pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<PgPooled, StoreError> {
        self.pool
            .get()
            .map_err(|err| StoreError::new(format!("db connection failed: {err}")))
    }

    fn load_result(
        conn: &mut PgConnection,
        row: AnalysisResultRow,
    ) -> Result<AnalysisResultRecord, StoreError> {
        let score = scores::table
            .filter(scores::analysis_result_id.eq(row.id))
            .select(Score::as_select())
            .first(conn)
            .optional()?;
        Ok(result_record(row, score))
    }

    fn load_languages(
        conn: &mut PgConnection,
        repository_id: i64,
    ) -> Result<LanguageBytes, StoreError> {
        let rows: Vec<RepositoryLanguage> = repository_languages::table
            .filter(repository_languages::repository_id.eq(repository_id))
            .select(RepositoryLanguage::as_select())
            .load(conn)?;
        Ok(rows
            .into_iter()
            .map(|row| (row.language, row.bytes.max(0) as u64))
            .collect())
    }
}

impl AnalysisStore for PgAnalysisStore {
    fn upsert_repository(&self, upsert: &RepositoryUpsert) -> Result<RepositoryRecord, StoreError> {
        let mut conn = self.conn()?;
        let row = conn.transaction::<_, diesel::result::Error, _>(|conn| {
            let now = Utc::now().naive_utc();
            let identity = &upsert.identity;
            let row: Repository = diesel::insert_into(repositories::table)
                .values(&NewRepository {
                    requester_id: upsert.requester_id.clone(),
                    name: identity.name.clone(),
                    html_url: upsert.html_url.clone(),
                    description: identity.description.clone(),
                    main_branch: identity.default_branch.clone(),
                    primary_language: identity.primary_language.clone(),
                    public: false,
                    created_at: now,
                    updated_at: now,
                })
                .on_conflict((repositories::html_url, repositories::requester_id))
                .do_update()
                .set(&RepositoryChanges {
                    name: identity.name.clone(),
                    description: identity.description.clone(),
                    main_branch: identity.default_branch.clone(),
                    primary_language: identity.primary_language.clone(),
                    updated_at: now,
                })
                .get_result(conn)?;

            diesel::delete(
                repository_languages::table.filter(repository_languages::repository_id.eq(row.id)),
            )
            .execute(conn)?;
            let languages: Vec<NewRepositoryLanguage> = upsert
                .languages
                .iter()
                .map(|(language, bytes)| NewRepositoryLanguage {
                    repository_id: row.id,
                    language: language.clone(),
                    bytes: clamp_bytes(*bytes),
                })
                .collect();
            if !languages.is_empty() {
                diesel::insert_into(repository_languages::table)
                    .values(&languages)
                    .execute(conn)?;
            }
            Ok(row)
        })?;
        Ok(repository_record(row))
    }

    fn find_repository(
        &self,
        html_url: &str,
        requester_id: &str,
    ) -> Result<Option<RepositoryRecord>, StoreError> {
        let mut conn = self.conn()?;
        let row = repositories::table
            .filter(repositories::html_url.eq(html_url))
            .filter(repositories::requester_id.eq(requester_id))
            .select(Repository::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row.map(repository_record))
    }

    fn save_result(
        &self,
        repository_id: i64,
        evaluation: &Evaluation,
    ) -> Result<AnalysisResultRecord, StoreError> {
        let mut conn = self.conn()?;
        let (row, score) = conn.transaction::<_, diesel::result::Error, _>(|conn| {
            let row: AnalysisResultRow = diesel::insert_into(analysis_results::table)
                .values(&NewAnalysisResult {
                    repository_id,
                    summary: clean_text(Some(&evaluation.summary)),
                    strengths: join_bullets(&evaluation.strengths),
                    improvements: join_bullets(&evaluation.improvements),
                    created_at: Utc::now().naive_utc(),
                })
                .returning(AnalysisResultRow::as_returning())
                .get_result(conn)?;
            let score: Score = diesel::insert_into(scores::table)
                .values(&NewScore {
                    analysis_result_id: row.id,
                    readme_score: evaluation.scores.readme.into(),
                    test_score: evaluation.scores.test.into(),
                    commit_score: evaluation.scores.commit.into(),
                    cicd_score: evaluation.scores.cicd.into(),
                })
                .returning(Score::as_returning())
                .get_result(conn)?;
            Ok((row, score))
        })?;
        Ok(result_record(row, Some(score)))
    }

    fn history(&self, requester_id: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        let mut conn = self.conn()?;
        let rows: Vec<Repository> = repositories::table
            .filter(repositories::requester_id.eq(requester_id))
            .select(Repository::as_select())
            .load(&mut conn)?;

        let mut entries = Vec::new();
        for repository in rows {
            let latest = analysis_results::table
                .filter(analysis_results::repository_id.eq(repository.id))
                .order((analysis_results::created_at.desc(), analysis_results::id.desc()))
                .select(AnalysisResultRow::as_select())
                .first(&mut conn)
                .optional()?;
            let Some(latest) = latest else {
                continue;
            };
            let latest_result = Self::load_result(&mut conn, latest)?;
            let languages = Self::load_languages(&mut conn, repository.id)?;
            entries.push(HistoryEntry {
                repository: repository_record(repository),
                languages,
                latest_result,
            });
        }
        entries.sort_by(|left, right| newest_first(&left.latest_result, &right.latest_result));
        Ok(entries)
    }

    fn results_for_repository(
        &self,
        repository_id: i64,
    ) -> Result<Vec<AnalysisResultRecord>, StoreError> {
        let mut conn = self.conn()?;
        let rows: Vec<AnalysisResultRow> = analysis_results::table
            .filter(analysis_results::repository_id.eq(repository_id))
            .order((analysis_results::created_at.desc(), analysis_results::id.desc()))
            .select(AnalysisResultRow::as_select())
            .load(&mut conn)?;
        rows.into_iter()
            .map(|row| Self::load_result(&mut conn, row))
            .collect()
    }

    fn find_result(&self, result_id: i64) -> Result<Option<AnalysisResultRecord>, StoreError> {
        let mut conn = self.conn()?;
        let row = analysis_results::table
            .find(result_id)
            .select(AnalysisResultRow::as_select())
            .first(&mut conn)
            .optional()?;
        row.map(|row| Self::load_result(&mut conn, row)).transpose()
    }

    fn delete_result(&self, result_id: i64) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        let deleted = diesel::delete(analysis_results::table.find(result_id)).execute(&mut conn)?;
        Ok(deleted > 0)
    }

    fn languages(&self, repository_id: i64) -> Result<Option<LanguageBytes>, StoreError> {
        let mut conn = self.conn()?;
        let exists = repositories::table
            .find(repository_id)
            .select(repositories::id)
            .first::<i64>(&mut conn)
            .optional()?;
        if exists.is_none() {
            return Ok(None);
        }
        Self::load_languages(&mut conn, repository_id).map(Some)
    }

    fn set_public(&self, repository_id: i64, public: bool) -> Result<PublishOutcome, StoreError> {
        let mut conn = self.conn()?;
        let outcome = conn.transaction::<_, diesel::result::Error, _>(|conn| {
            let exists = repositories::table
                .find(repository_id)
                .select(repositories::id)
                .first::<i64>(conn)
                .optional()?;
            if exists.is_none() {
                return Ok(PublishOutcome::NotFound);
            }
            if public {
                let results: i64 = analysis_results::table
                    .filter(analysis_results::repository_id.eq(repository_id))
                    .count()
                    .get_result(conn)?;
                if results == 0 {
                    return Ok(PublishOutcome::NoResults);
                }
            }
            let row: Repository = diesel::update(repositories::table.find(repository_id))
                .set((
                    repositories::public.eq(public),
                    repositories::updated_at.eq(Utc::now().naive_utc()),
                ))
                .returning(Repository::as_returning())
                .get_result(conn)?;
            Ok(PublishOutcome::Updated(repository_record(row)))
        })?;
        Ok(outcome)
    }
}

#[derive(Default)]
struct MemoryState {
    repositories: Vec<RepositoryRecord>,
    languages: HashMap<i64, LanguageBytes>,
    results: Vec<AnalysisResultRecord>,
    next_repository_id: i64,
    next_result_id: i64,
}

/// In-process [`AnalysisStore`] used in mock mode and tests.
#[derive(Default)]
pub struct MemoryAnalysisStore {
    state: Mutex<MemoryState>,
}

impl MemoryAnalysisStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored repositories.
    pub fn repository_count(&self) -> usize {
        self.state().repositories.len()
    }

    /// Number of stored evaluations.
    pub fn result_count(&self) -> usize {
        self.state().results.len()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AnalysisStore for MemoryAnalysisStore {
    fn upsert_repository(&self, upsert: &RepositoryUpsert) -> Result<RepositoryRecord, StoreError> {
        let mut state = self.state();
        let now = Utc::now();
        let identity = &upsert.identity;
        let existing = state.repositories.iter_mut().find(|repository| {
            repository.html_url == upsert.html_url && repository.requester_id == upsert.requester_id
        });
        let record = match existing {
            Some(repository) => {
                repository.name = identity.name.clone();
                repository.description = identity.description.clone();
                repository.main_branch = identity.default_branch.clone();
                repository.primary_language = identity.primary_language.clone();
                repository.updated_at = now;
                repository.clone()
            }
            None => {
                state.next_repository_id += 1;
                let record = RepositoryRecord {
                    id: state.next_repository_id,
                    requester_id: upsert.requester_id.clone(),
                    name: identity.name.clone(),
                    html_url: upsert.html_url.clone(),
                    description: identity.description.clone(),
                    main_branch: identity.default_branch.clone(),
                    primary_language: identity.primary_language.clone(),
                    public: false,
                    created_at: now,
                    updated_at: now,
                };
                state.repositories.push(record.clone());
                record
            }
        };
        state.languages.insert(record.id, upsert.languages.clone());
        Ok(record)
    }

    fn find_repository(
        &self,
        html_url: &str,
        requester_id: &str,
    ) -> Result<Option<RepositoryRecord>, StoreError> {
        Ok(self
            .state()
            .repositories
            .iter()
            .find(|repository| {
                repository.html_url == html_url && repository.requester_id == requester_id
            })
            .cloned())
    }

    fn save_result(
        &self,
        repository_id: i64,
        evaluation: &Evaluation,
    ) -> Result<AnalysisResultRecord, StoreError> {
        let mut state = self.state();
        if !state
            .repositories
            .iter()
            .any(|repository| repository.id == repository_id)
        {
            return Err(StoreError::new(format!(
                "repository {repository_id} does not exist"
            )));
        }
        state.next_result_id += 1;
        let record = AnalysisResultRecord {
            id: state.next_result_id,
            repository_id,
            summary: clean_text(Some(&evaluation.summary)),
            strengths: split_bullets(&join_bullets(&evaluation.strengths)),
            improvements: split_bullets(&join_bullets(&evaluation.improvements)),
            scores: evaluation.scores,
            total_score: evaluation.scores.total(),
            created_at: Utc::now(),
        };
        state.results.push(record.clone());
        Ok(record)
    }

    fn history(&self, requester_id: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        let state = self.state();
        let mut entries: Vec<HistoryEntry> = state
            .repositories
            .iter()
            .filter(|repository| repository.requester_id == requester_id)
            .filter_map(|repository| {
                let latest = state
                    .results
                    .iter()
                    .filter(|result| result.repository_id == repository.id)
                    .min_by(|left, right| newest_first(left, right))?;
                Some(HistoryEntry {
                    repository: repository.clone(),
                    languages: state
                        .languages
                        .get(&repository.id)
                        .cloned()
                        .unwrap_or_default(),
                    latest_result: latest.clone(),
                })
            })
            .collect();
        entries.sort_by(|left, right| newest_first(&left.latest_result, &right.latest_result));
        Ok(entries)
    }

    fn results_for_repository(
        &self,
        repository_id: i64,
    ) -> Result<Vec<AnalysisResultRecord>, StoreError> {
        let mut results: Vec<AnalysisResultRecord> = self
            .state()
            .results
            .iter()
            .filter(|result| result.repository_id == repository_id)
            .cloned()
            .collect();
        results.sort_by(newest_first);
        Ok(results)
    }

    fn find_result(&self, result_id: i64) -> Result<Option<AnalysisResultRecord>, StoreError> {
        Ok(self
            .state()
            .results
            .iter()
            .find(|result| result.id == result_id)
            .cloned())
    }

    fn delete_result(&self, result_id: i64) -> Result<bool, StoreError> {
        let mut state = self.state();
        let before = state.results.len();
        state.results.retain(|result| result.id != result_id);
        Ok(state.results.len() != before)
    }

    fn languages(&self, repository_id: i64) -> Result<Option<LanguageBytes>, StoreError> {
        let state = self.state();
        if !state
            .repositories
            .iter()
            .any(|repository| repository.id == repository_id)
        {
            return Ok(None);
        }
        Ok(Some(
            state
                .languages
                .get(&repository_id)
                .cloned()
                .unwrap_or_default(),
        ))
    }

    fn set_public(&self, repository_id: i64, public: bool) -> Result<PublishOutcome, StoreError> {
        let mut state = self.state();
        let has_results = state
            .results
            .iter()
            .any(|result| result.repository_id == repository_id);
        let Some(repository) = state
            .repositories
            .iter_mut()
            .find(|repository| repository.id == repository_id)
        else {
            return Ok(PublishOutcome::NotFound);
        };
        if public && !has_results {
            return Ok(PublishOutcome::NoResults);
        }
        repository.public = public;
        repository.updated_at = Utc::now();
        Ok(PublishOutcome::Updated(repository.clone()))
    }
}

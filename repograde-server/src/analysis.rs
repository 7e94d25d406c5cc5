//! Analysis orchestration: lock, collect, evaluate, persist.

use std::fmt;
use std::io;
use std::sync::Arc;

use actix_web::http::StatusCode;
use repograde_core::{AggregateResult, ArtifactClassifier, Evaluation, RUBRIC_PROMPT, parse_evaluation};

use crate::aggregator::{Aggregator, DEFAULT_MAX_REPOSITORY_SIZE_KB, max_repository_size_from_env};
use crate::db::{DbPool, init_pool, run_migrations};
use crate::gateway::{EvaluationGateway, NoopGateway, gateway_from_env};
use crate::github::{CannedFetcher, FetchError, GitHubFetcher, RepositoryRef, SourceFetcher};
use crate::lock::{AnalysisLock, acquire_guard, lock_key};
use crate::progress::{ProgressHub, ProgressStage};
use crate::store::{AnalysisStore, MemoryAnalysisStore, PgAnalysisStore, StoreError};

const GITHUB_PREFIX: &str = "https://github.com/";

/// Classified failure of an analysis request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// The repository URL is malformed.
    Validation(String),
    /// The same requester is already analysing this repository.
    Conflict,
    /// The repository does not exist or is not visible.
    NotFound(String),
    /// The GitHub rate limit is exhausted.
    RateLimited(String),
    /// The repository exceeds the configured size ceiling.
    TooLarge {
        /// Reported size.
        size_kb: u64,
        /// Configured ceiling.
        limit_kb: u64,
    },
    /// GitHub failed after retries.
    Upstream(String),
    /// Anything else.
    Internal(String),
}

impl AnalysisError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AnalysisError::Validation(_) => "INVALID_GITHUB_URL",
            AnalysisError::Conflict => "ANALYSIS_IN_PROGRESS",
            AnalysisError::NotFound(_) => "GITHUB_REPO_NOT_FOUND",
            AnalysisError::RateLimited(_) => "GITHUB_RATE_LIMIT_EXCEEDED",
            AnalysisError::TooLarge { .. } => "GITHUB_REPO_TOO_LARGE",
            AnalysisError::Upstream(_) => "GITHUB_API_SERVER_ERROR",
            AnalysisError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status reported for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AnalysisError::Validation(_) => StatusCode::BAD_REQUEST,
            AnalysisError::Conflict => StatusCode::CONFLICT,
            AnalysisError::NotFound(_) => StatusCode::NOT_FOUND,
            AnalysisError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AnalysisError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AnalysisError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AnalysisError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Collapse failures a client cannot act on into [`AnalysisError::Internal`].
    fn surfaced(self) -> Self {
        match self {
            AnalysisError::Upstream(message) => AnalysisError::Internal(message),
            other => other,
        }
    }
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::Validation(message) => write!(f, "invalid GitHub URL: {message}"),
            AnalysisError::Conflict => {
                write!(f, "an analysis of this repository is already in progress")
            }
            AnalysisError::NotFound(repo) => write!(f, "repository not found: {repo}"),
            AnalysisError::RateLimited(message) => {
                write!(f, "GitHub rate limit exceeded: {message}")
            }
            AnalysisError::TooLarge { size_kb, limit_kb } => write!(
                f,
                "repository is too large to analyse ({size_kb} KB, limit {limit_kb} KB)"
            ),
            AnalysisError::Upstream(message) => write!(f, "GitHub API failure: {message}"),
            AnalysisError::Internal(message) => write!(f, "internal error: {message}"),
        }
    }
}

impl std::error::Error for AnalysisError {}

impl From<FetchError> for AnalysisError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::NotFound(repo) => AnalysisError::NotFound(repo),
            FetchError::RateLimited(message) => AnalysisError::RateLimited(message),
            FetchError::Server(..) | FetchError::Network(_) => {
                AnalysisError::Upstream(err.to_string())
            }
            FetchError::Unauthorized(_) | FetchError::Client(..) | FetchError::Decode(_) => {
                AnalysisError::Internal(err.to_string())
            }
        }
    }
}

impl From<StoreError> for AnalysisError {
    fn from(err: StoreError) -> Self {
        AnalysisError::Internal(err.to_string())
    }
}

/// Parse a `https://github.com/{owner}/{name}` URL.
///
/// One trailing slash and a trailing `.git` are ignored. Owner and name are
/// lowercased since GitHub resolves them case-insensitively.
pub fn parse_repository_url(url: &str) -> Result<RepositoryRef, AnalysisError> {
    let invalid = || AnalysisError::Validation(url.to_string());
    let rest = url.trim().strip_prefix(GITHUB_PREFIX).ok_or_else(invalid)?;
    let rest = rest.strip_suffix('/').unwrap_or(rest);
    let rest = rest.strip_suffix(".git").unwrap_or(rest);
    let mut segments = rest.split('/');
    match (segments.next(), segments.next(), segments.next()) {
        (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => {
            Ok(RepositoryRef::new(
                owner.to_ascii_lowercase(),
                name.to_ascii_lowercase(),
            ))
        }
        _ => Err(invalid()),
    }
}

/// Scores an aggregate result through the evaluation gateway.
pub struct Evaluator<'a> {
    gateway: &'a (dyn EvaluationGateway + Send + Sync),
}

impl<'a> Evaluator<'a> {
    /// Evaluator over `gateway`.
    pub fn new(gateway: &'a (dyn EvaluationGateway + Send + Sync)) -> Self {
        Self { gateway }
    }

    /// Serialize, send, and parse. Never retried.
    pub fn evaluate(&self, aggregate: &AggregateResult) -> Result<Evaluation, AnalysisError> {
        let content = serde_json::to_string_pretty(aggregate)
            .map_err(|err| AnalysisError::Internal(format!("serialize aggregate: {err}")))?;
        let raw = self
            .gateway
            .complete(RUBRIC_PROMPT, &content)
            .map_err(|err| AnalysisError::Internal(err.to_string()))?;
        parse_evaluation(&raw).map_err(|err| AnalysisError::Internal(err.to_string()))
    }
}

/// Shared analysis client set.
#[derive(Clone)]
pub struct AnalysisClients {
    fetcher: Arc<dyn SourceFetcher + Send + Sync>,
    gateway: Arc<dyn EvaluationGateway + Send + Sync>,
    store: Arc<dyn AnalysisStore>,
}

impl AnalysisClients {
    /// Build a client set from its parts.
    pub fn new(
        fetcher: Arc<dyn SourceFetcher + Send + Sync>,
        gateway: Arc<dyn EvaluationGateway + Send + Sync>,
        store: Arc<dyn AnalysisStore>,
    ) -> Self {
        Self {
            fetcher,
            gateway,
            store,
        }
    }

    /// Offline clients: canned repository, placeholder evaluation, memory store.
    pub fn mock() -> Self {
        Self::new(
            Arc::new(CannedFetcher),
            Arc::new(NoopGateway),
            Arc::new(MemoryAnalysisStore::new()),
        )
    }

    /// Live clients over an initialised database pool.
    pub fn live(pool: DbPool) -> Self {
        Self::new(
            Arc::new(GitHubFetcher::from_env()),
            gateway_from_env(),
            Arc::new(PgAnalysisStore::new(pool)),
        )
    }

    /// Pick mock or live clients from `REPOGRADE_ANALYSIS_MODE`.
    pub fn from_env() -> io::Result<Self> {
        let mode = std::env::var("REPOGRADE_ANALYSIS_MODE").unwrap_or_else(|_| "live".to_string());
        if mode.eq_ignore_ascii_case("mock") {
            log::info!("analysis mode: mock");
            return Ok(Self::mock());
        }
        let pool = init_pool()?;
        run_migrations(&pool)?;
        Ok(Self::live(pool))
    }
}

/// Runs analyses end to end.
#[derive(Clone)]
pub struct AnalysisService {
    clients: AnalysisClients,
    lock: Arc<dyn AnalysisLock>,
    progress: ProgressHub,
    classifier: Arc<ArtifactClassifier>,
    max_repository_size_kb: u64,
}

impl AnalysisService {
    /// Service over `clients`, sharing `lock` and `progress`.
    pub fn new(
        clients: AnalysisClients,
        lock: Arc<dyn AnalysisLock>,
        progress: ProgressHub,
    ) -> io::Result<Self> {
        let classifier = ArtifactClassifier::new().map_err(io::Error::other)?;
        Ok(Self {
            clients,
            lock,
            progress,
            classifier: Arc::new(classifier),
            max_repository_size_kb: DEFAULT_MAX_REPOSITORY_SIZE_KB,
        })
    }

    /// Service configured from the environment.
    pub fn from_env(lock: Arc<dyn AnalysisLock>, progress: ProgressHub) -> io::Result<Self> {
        Ok(Self::new(AnalysisClients::from_env()?, lock, progress)?
            .with_max_repository_size_kb(max_repository_size_from_env()))
    }

    /// Override the repository size ceiling.
    pub fn with_max_repository_size_kb(mut self, limit_kb: u64) -> Self {
        self.max_repository_size_kb = limit_kb;
        self
    }

    /// Store shared with the HTTP handlers.
    pub fn store(&self) -> Arc<dyn AnalysisStore> {
        Arc::clone(&self.clients.store)
    }

    /// Progress hub shared with the HTTP handlers.
    pub fn progress(&self) -> &ProgressHub {
        &self.progress
    }

    /// Analyse `github_url` for `requester_id`, returning the repository id.
    ///
    /// Blocking; the lock is released on every exit path.
    pub fn analyze(&self, github_url: &str, requester_id: &str) -> Result<i64, AnalysisError> {
        let repo = parse_repository_url(github_url)?;
        let html_url = repo.html_url();
        let Some(guard) = acquire_guard(&self.lock, lock_key(requester_id, &html_url)) else {
            log::info!("analysis of {repo} for {requester_id} already running");
            return Err(AnalysisError::Conflict);
        };

        log::info!("analysis of {repo} for {requester_id} started");
        self.progress
            .publish(requester_id, ProgressStage::Status, "analysis started");

        let aggregator = Aggregator::new(
            self.clients.fetcher.as_ref(),
            self.clients.store.as_ref(),
            &self.classifier,
            self.max_repository_size_kb,
        )
        .with_progress(&self.progress);
        let aggregate = match aggregator.collect(&repo, requester_id) {
            Ok(aggregate) => aggregate,
            Err(err) => return Err(self.fail(requester_id, &repo, err.surfaced())),
        };
        guard.refresh();

        let repository = match self.clients.store.find_repository(&html_url, requester_id) {
            Ok(Some(repository)) => repository,
            Ok(None) => {
                let err = AnalysisError::Internal(format!("repository record missing for {repo}"));
                return Err(self.fail(requester_id, &repo, err));
            }
            Err(err) => return Err(self.fail(requester_id, &repo, err.into())),
        };

        log::info!("evaluating {repo}");
        let saved = Evaluator::new(self.clients.gateway.as_ref())
            .evaluate(&aggregate)
            .and_then(|evaluation| {
                self.clients
                    .store
                    .save_result(repository.id, &evaluation)
                    .map_err(AnalysisError::from)
            });
        let result = match saved {
            Ok(result) => result,
            Err(err) => {
                log::error!("evaluation of {repo} failed: {err}");
                self.progress.publish(
                    requester_id,
                    ProgressStage::Error,
                    format!("AI evaluation failed: {err}"),
                );
                return Err(err);
            }
        };
        guard.refresh();

        log::info!(
            "saved result {} for {repo} (total {})",
            result.id,
            result.total_score
        );
        self.progress
            .publish(requester_id, ProgressStage::Complete, "final report generated");
        Ok(repository.id)
    }

    fn fail(&self, requester_id: &str, repo: &RepositoryRef, err: AnalysisError) -> AnalysisError {
        log::error!("analysis of {repo} failed [{}]: {err}", err.code());
        self.progress
            .publish(requester_id, ProgressStage::Error, err.to_string());
        err
    }
}

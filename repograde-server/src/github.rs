//! GitHub REST client used to collect repository signals.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use repograde_core::LanguageBytes;
use repograde_core::activity::{activity_window_start, filter_issues, filter_pull_requests};
use repograde_core::payload::{
    CommitPayload, IssuePayload, PullRequestPayload, RepositoryPayload, TreePayload,
};
use reqwest::blocking::{Client, Response};
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;

use crate::retry::RetryPolicy;

const PAGE_SIZE: &str = "100";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";
const HARD_RATE_LIMIT: u64 = 10;
const SOFT_RATE_LIMIT: u64 = 100;

/// Owner and name of a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRef {
    /// Account or organisation.
    pub owner: String,
    /// Repository name.
    pub name: String,
}

impl RepositoryRef {
    /// Build a reference from its parts.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Canonical browser URL, used as the stored repository URL.
    pub fn html_url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.name)
    }

    fn api_path(&self) -> String {
        format!(
            "/repos/{}/{}",
            urlencoding::encode(&self.owner),
            urlencoding::encode(&self.name)
        )
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Failure talking to the GitHub API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The repository or resource does not exist.
    NotFound(String),
    /// The token was rejected.
    Unauthorized(String),
    /// The rate limit is exhausted.
    RateLimited(String),
    /// Any other 4xx response.
    Client(u16, String),
    /// A 5xx response.
    Server(u16, String),
    /// Connection failure or timeout.
    Network(String),
    /// The response body could not be decoded.
    Decode(String),
}

impl FetchError {
    /// Whether a retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Server(..) | FetchError::Network(_))
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::NotFound(what) => write!(f, "github resource not found: {what}"),
            FetchError::Unauthorized(body) => write!(f, "github token rejected: {body}"),
            FetchError::RateLimited(body) => write!(f, "github rate limit exceeded: {body}"),
            FetchError::Client(status, body) | FetchError::Server(status, body) => {
                write!(f, "github api error ({status}): {body}")
            }
            FetchError::Network(err) => write!(f, "github request failed: {err}"),
            FetchError::Decode(err) => write!(f, "github response decode failed: {err}"),
        }
    }
}

impl std::error::Error for FetchError {}

/// Map a non-success status to a fetch error.
pub fn classify_status(status: u16, remaining: Option<u64>, what: &str, body: String) -> FetchError {
    match status {
        404 => FetchError::NotFound(what.to_string()),
        401 => FetchError::Unauthorized(body),
        429 => FetchError::RateLimited(body),
        403 if remaining == Some(0) => FetchError::RateLimited(body),
        400..=499 => FetchError::Client(status, body),
        _ => FetchError::Server(status, body),
    }
}

/// Severity of the remaining rate-limit budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitLevel {
    /// Plenty of budget left.
    Normal,
    /// Budget at or below the soft threshold.
    Soft,
    /// Budget at or below the hard threshold.
    Hard,
}

/// Rate-limit headers read from one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Requests left in the current window.
    pub remaining: u64,
    /// Whole minutes until the window resets, never negative.
    pub minutes_until_reset: i64,
    /// Threshold classification.
    pub level: RateLimitLevel,
}

/// Parse the rate-limit headers. Missing headers yield `Ok(None)`.
pub fn rate_limit_status(
    remaining: Option<&str>,
    reset: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Option<RateLimitStatus>, String> {
    let (Some(remaining), Some(reset)) = (remaining, reset) else {
        return Ok(None);
    };
    let remaining: u64 = remaining
        .trim()
        .parse()
        .map_err(|err| format!("invalid X-RateLimit-Remaining {remaining:?}: {err}"))?;
    let reset: i64 = reset
        .trim()
        .parse()
        .map_err(|err| format!("invalid X-RateLimit-Reset {reset:?}: {err}"))?;
    let level = if remaining <= HARD_RATE_LIMIT {
        RateLimitLevel::Hard
    } else if remaining <= SOFT_RATE_LIMIT {
        RateLimitLevel::Soft
    } else {
        RateLimitLevel::Normal
    };
    Ok(Some(RateLimitStatus {
        remaining,
        minutes_until_reset: ((reset - now.timestamp()) / 60).max(0),
        level,
    }))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn observe_rate_limit(headers: &HeaderMap) -> Option<u64> {
    let status = rate_limit_status(
        header_str(headers, "x-ratelimit-remaining"),
        header_str(headers, "x-ratelimit-reset"),
        Utc::now(),
    );
    match status {
        Ok(Some(status)) => {
            let RateLimitStatus {
                remaining,
                minutes_until_reset,
                level,
            } = status;
            match level {
                RateLimitLevel::Hard => log::error!(
                    "github rate limit nearly exhausted: {remaining} left, resets in {minutes_until_reset} min"
                ),
                RateLimitLevel::Soft => log::warn!(
                    "github rate limit low: {remaining} left, resets in {minutes_until_reset} min"
                ),
                RateLimitLevel::Normal => log::debug!(
                    "github rate limit: {remaining} left, resets in {minutes_until_reset} min"
                ),
            }
            Some(remaining)
        }
        Ok(None) => None,
        Err(err) => {
            log::warn!("ignoring rate limit headers: {err}");
            None
        }
    }
}

/// Read access to the repository signals the pipeline needs.
#[cfg_attr(test, mockall::automock)]
pub trait SourceFetcher {
    /// Repository metadata.
    fn repository(&self, repo: &RepositoryRef) -> Result<RepositoryPayload, FetchError>;
    /// Commits authored since `since`, most recent first.
    fn commits_since(
        &self,
        repo: &RepositoryRef,
        since: DateTime<Utc>,
    ) -> Result<Vec<CommitPayload>, FetchError>;
    /// Raw README text, `None` when absent.
    fn readme(&self, repo: &RepositoryRef) -> Result<Option<String>, FetchError>;
    /// Recursive tree of `branch`, `None` when absent.
    fn tree(&self, repo: &RepositoryRef, branch: &str) -> Result<Option<TreePayload>, FetchError>;
    /// Issues from the last six months, pull requests excluded.
    fn issues(&self, repo: &RepositoryRef) -> Result<Vec<IssuePayload>, FetchError>;
    /// Pull requests from the last six months.
    fn pull_requests(&self, repo: &RepositoryRef) -> Result<Vec<PullRequestPayload>, FetchError>;
    /// Language byte counts.
    fn languages(&self, repo: &RepositoryRef) -> Result<LanguageBytes, FetchError>;
}

/// Live GitHub REST client.
#[derive(Debug, Clone)]
pub struct GitHubFetcher {
    base_url: String,
    token: Option<String>,
    user_agent: String,
    client: Client,
    retry: RetryPolicy,
}

impl GitHubFetcher {
    /// Build a fetcher against `base_url`.
    pub fn new(base_url: impl Into<String>, token: Option<String>, user_agent: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            base_url: base_url.into(),
            token: token.filter(|token| !token.trim().is_empty()),
            user_agent: user_agent.into(),
            client,
            retry: RetryPolicy::default(),
        }
    }

    /// Build a fetcher from environment variables.
    pub fn from_env() -> Self {
        let base_url = std::env::var("GITHUB_API_URL")
            .unwrap_or_else(|_| "https://api.github.com".to_string());
        let token = std::env::var("GITHUB_TOKEN").ok();
        let user_agent =
            std::env::var("GITHUB_USER_AGENT").unwrap_or_else(|_| "repograde-server".to_string());
        Self::new(base_url, token, user_agent)
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn send(
        &self,
        path: &str,
        query: &[(&str, String)],
        accept: Option<&str>,
    ) -> Result<Response, FetchError> {
        self.retry.run(
            || {
                let url = format!("{}{path}", self.base_url.trim_end_matches('/'));
                log::debug!("GET {url}");
                let mut request = self
                    .client
                    .get(&url)
                    .header("User-Agent", &self.user_agent)
                    .query(query);
                if let Some(accept) = accept {
                    request = request.header("Accept", accept);
                }
                if let Some(token) = self.token.as_ref() {
                    request = request.bearer_auth(token);
                }
                let response = request
                    .send()
                    .map_err(|err| FetchError::Network(err.to_string()))?;
                let remaining = observe_rate_limit(response.headers());
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }
                let body = response.text().unwrap_or_default();
                Err(classify_status(status.as_u16(), remaining, path, body))
            },
            FetchError::is_transient,
        )
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        self.send(path, query, None)?
            .json()
            .map_err(|err| FetchError::Decode(err.to_string()))
    }
}

fn not_found_as_none<T>(result: Result<T, FetchError>) -> Result<Option<T>, FetchError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(FetchError::NotFound(_)) => Ok(None),
        Err(err) => Err(err),
    }
}

impl SourceFetcher for GitHubFetcher {
    fn repository(&self, repo: &RepositoryRef) -> Result<RepositoryPayload, FetchError> {
        self.get_json(&repo.api_path(), &[])
    }

    fn commits_since(
        &self,
        repo: &RepositoryRef,
        since: DateTime<Utc>,
    ) -> Result<Vec<CommitPayload>, FetchError> {
        let path = format!("{}/commits", repo.api_path());
        let since = since.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        self.get_json(
            &path,
            &[("since", since), ("per_page", PAGE_SIZE.to_string())],
        )
    }

    fn readme(&self, repo: &RepositoryRef) -> Result<Option<String>, FetchError> {
        let path = format!("{}/readme", repo.api_path());
        let response = not_found_as_none(self.send(&path, &[], Some(RAW_MEDIA_TYPE)))?;
        response
            .map(|response| {
                response
                    .text()
                    .map_err(|err| FetchError::Decode(err.to_string()))
            })
            .transpose()
    }

    fn tree(&self, repo: &RepositoryRef, branch: &str) -> Result<Option<TreePayload>, FetchError> {
        let path = format!(
            "{}/git/trees/{}",
            repo.api_path(),
            urlencoding::encode(branch)
        );
        not_found_as_none(self.get_json(&path, &[("recursive", "1".to_string())]))
    }

    fn issues(&self, repo: &RepositoryRef) -> Result<Vec<IssuePayload>, FetchError> {
        let path = format!("{}/issues", repo.api_path());
        let issues: Vec<IssuePayload> = self.get_json(
            &path,
            &[
                ("state", "all".to_string()),
                ("per_page", PAGE_SIZE.to_string()),
            ],
        )?;
        Ok(filter_issues(issues, activity_window_start(Utc::now())))
    }

    fn pull_requests(&self, repo: &RepositoryRef) -> Result<Vec<PullRequestPayload>, FetchError> {
        let path = format!("{}/pulls", repo.api_path());
        let pulls: Vec<PullRequestPayload> = self.get_json(
            &path,
            &[
                ("state", "all".to_string()),
                ("per_page", PAGE_SIZE.to_string()),
            ],
        )?;
        Ok(filter_pull_requests(pulls, activity_window_start(Utc::now())))
    }

    fn languages(&self, repo: &RepositoryRef) -> Result<LanguageBytes, FetchError> {
        let path = format!("{}/languages", repo.api_path());
        self.get_json(&path, &[])
    }
}

/// Offline fetcher that serves a fixed demo repository.
#[derive(Debug, Default, Clone)]
pub struct CannedFetcher;

impl CannedFetcher {
    fn check(repo: &RepositoryRef) -> Result<(), FetchError> {
        if repo.owner.eq_ignore_ascii_case("missing") {
            return Err(FetchError::NotFound(repo.to_string()));
        }
        Ok(())
    }
}

impl SourceFetcher for CannedFetcher {
    fn repository(&self, repo: &RepositoryRef) -> Result<RepositoryPayload, FetchError> {
        Self::check(repo)?;
        Ok(RepositoryPayload {
            name: repo.name.clone(),
            html_url: format!("https://github.com/{repo}"),
            description: Some("Canned repository used in mock mode".to_string()),
            language: Some("Rust".to_string()),
            default_branch: Some("main".to_string()),
            size: Some(128),
        })
    }

    fn commits_since(
        &self,
        repo: &RepositoryRef,
        since: DateTime<Utc>,
    ) -> Result<Vec<CommitPayload>, FetchError> {
        Self::check(repo)?;
        let latest = std::cmp::max(since, Utc::now() - chrono::Duration::days(1));
        Ok(vec![CommitPayload {
            sha: "0000000".to_string(),
            commit: repograde_core::payload::CommitDetail {
                message: Some("Add widget parser".to_string()),
                author: Some(repograde_core::payload::CommitSignature {
                    name: Some("repograde".to_string()),
                    date: Some(latest),
                }),
            },
        }])
    }

    fn readme(&self, repo: &RepositoryRef) -> Result<Option<String>, FetchError> {
        Self::check(repo)?;
        Ok(Some(format!(
            "# {}\n\n## Install\n\ncargo build\n\n## Usage\n\nRun it.\n",
            repo.name
        )))
    }

    fn tree(&self, repo: &RepositoryRef, _branch: &str) -> Result<Option<TreePayload>, FetchError> {
        Self::check(repo)?;
        let item = |path: &str, kind: &str| repograde_core::payload::TreeItem {
            path: path.to_string(),
            kind: kind.to_string(),
        };
        Ok(Some(TreePayload {
            tree: vec![
                item(".github", "tree"),
                item(".github/workflows/ci.yml", "blob"),
                item("Cargo.toml", "blob"),
                item("README.md", "blob"),
                item("src/lib.rs", "blob"),
                item("tests/widget.rs", "blob"),
            ],
            truncated: false,
        }))
    }

    fn issues(&self, repo: &RepositoryRef) -> Result<Vec<IssuePayload>, FetchError> {
        Self::check(repo)?;
        Ok(Vec::new())
    }

    fn pull_requests(&self, repo: &RepositoryRef) -> Result<Vec<PullRequestPayload>, FetchError> {
        Self::check(repo)?;
        Ok(Vec::new())
    }

    fn languages(&self, repo: &RepositoryRef) -> Result<LanguageBytes, FetchError> {
        Self::check(repo)?;
        Ok(LanguageBytes::from([("Rust".to_string(), 4096)]))
    }
}

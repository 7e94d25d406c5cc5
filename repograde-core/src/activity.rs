//! Commit, issue, and pull request summaries.

use chrono::{DateTime, Duration, Utc};

use crate::domain::{
    CommitStats, IssueStats, PullRequestStats, RECENT_LIMIT, RecentCommit, RecentIssue,
    RecentPullRequest,
};
use crate::payload::{CommitPayload, IssuePayload, PullRequestPayload};

/// Trailing window for commit history, in days.
pub const COMMIT_WINDOW_DAYS: i64 = 90;

/// Trailing window for issues and pull requests, in days (six months).
pub const ACTIVITY_WINDOW_DAYS: i64 = 183;

const HEADLINE_LIMIT: usize = 100;
const EMPTY_MESSAGE: &str = "No commit message";

/// Start of the commit window relative to `now`.
pub fn commit_window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(COMMIT_WINDOW_DAYS)
}

/// Start of the issue and pull request window relative to `now`.
pub fn activity_window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(ACTIVITY_WINDOW_DAYS)
}

/// Summarize commits fetched for the trailing window, most recent first.
pub fn summarize_commits(commits: &[CommitPayload], now: DateTime<Utc>) -> CommitStats {
    let Some(latest) = commits.first() else {
        return CommitStats::default();
    };
    let last_commit_at = latest.authored_at();
    let days_since_last_commit = last_commit_at
        .map(|at| (now - at).num_days().max(0))
        .unwrap_or(0);

    CommitStats {
        last_commit_at,
        days_since_last_commit,
        commit_count_90d: commits.len(),
        recent_commits: commits
            .iter()
            .take(RECENT_LIMIT)
            .map(|commit| RecentCommit {
                message: commit_headline(commit.commit.message.as_deref()),
                committed_at: commit.authored_at(),
            })
            .collect(),
    }
}

/// First line of a commit message, trimmed and shortened to 100 characters.
pub fn commit_headline(message: Option<&str>) -> String {
    let headline = message
        .and_then(|message| message.lines().next())
        .map(str::trim)
        .unwrap_or_default();
    if headline.is_empty() {
        return EMPTY_MESSAGE.to_string();
    }
    if headline.chars().count() > HEADLINE_LIMIT {
        let shortened: String = headline.chars().take(HEADLINE_LIMIT - 3).collect();
        return format!("{shortened}...");
    }
    headline.to_string()
}

/// Drop pull-request back-references and anything created before `since`.
pub fn filter_issues(issues: Vec<IssuePayload>, since: DateTime<Utc>) -> Vec<IssuePayload> {
    issues
        .into_iter()
        .filter(|issue| !issue.is_pull_request())
        .filter(|issue| issue.created_at.is_some_and(|at| at > since))
        .collect()
}

/// Drop pull requests created before `since`.
pub fn filter_pull_requests(
    pulls: Vec<PullRequestPayload>,
    since: DateTime<Utc>,
) -> Vec<PullRequestPayload> {
    pulls
        .into_iter()
        .filter(|pull| pull.created_at.is_some_and(|at| at > since))
        .collect()
}

/// Summarize already-filtered issues.
pub fn summarize_issues(issues: &[IssuePayload]) -> IssueStats {
    IssueStats {
        issue_count_6m: issues.len(),
        closed_issue_count: issues
            .iter()
            .filter(|issue| issue.state.eq_ignore_ascii_case("closed"))
            .count(),
        recent_issues: issues
            .iter()
            .take(RECENT_LIMIT)
            .map(|issue| RecentIssue {
                title: issue.title.clone(),
                state: issue.state.clone(),
                created_at: issue.created_at,
                closed_at: issue.closed_at,
            })
            .collect(),
    }
}

/// Summarize already-filtered pull requests.
pub fn summarize_pull_requests(pulls: &[PullRequestPayload]) -> PullRequestStats {
    PullRequestStats {
        pull_request_count_6m: pulls.len(),
        merged_pull_request_count: pulls.iter().filter(|pull| pull.merged_at.is_some()).count(),
        recent_pull_requests: pulls
            .iter()
            .take(RECENT_LIMIT)
            .map(|pull| RecentPullRequest {
                title: pull.title.clone(),
                state: pull.state.clone(),
                created_at: pull.created_at,
                merged_at: pull.merged_at,
            })
            .collect(),
    }
}

//! Collects every repository signal into one [`AggregateResult`].

use chrono::Utc;
use repograde_core::activity::{
    commit_window_start, summarize_commits, summarize_issues, summarize_pull_requests,
};
use repograde_core::{AggregateResult, ArtifactClassifier, classify_optional_readme};

use crate::analysis::AnalysisError;
use crate::github::{RepositoryRef, SourceFetcher};
use crate::progress::{ProgressHub, ProgressStage};
use crate::store::{AnalysisStore, RepositoryUpsert};

/// Default repository size ceiling in kilobytes.
pub const DEFAULT_MAX_REPOSITORY_SIZE_KB: u64 = 1_000_000;

/// Size ceiling configured from `REPOGRADE_MAX_REPO_SIZE_KB`.
pub fn max_repository_size_from_env() -> u64 {
    match std::env::var("REPOGRADE_MAX_REPO_SIZE_KB") {
        Ok(value) => value.trim().parse().unwrap_or_else(|err| {
            log::warn!("ignoring REPOGRADE_MAX_REPO_SIZE_KB={value:?}: {err}");
            DEFAULT_MAX_REPOSITORY_SIZE_KB
        }),
        Err(_) => DEFAULT_MAX_REPOSITORY_SIZE_KB,
    }
}

/// Fetches, classifies, and records one repository.
pub struct Aggregator<'a> {
    fetcher: &'a (dyn SourceFetcher + Send + Sync),
    store: &'a dyn AnalysisStore,
    classifier: &'a ArtifactClassifier,
    max_repository_size_kb: u64,
    progress: Option<&'a ProgressHub>,
}

impl<'a> Aggregator<'a> {
    /// Aggregator over borrowed collaborators.
    pub fn new(
        fetcher: &'a (dyn SourceFetcher + Send + Sync),
        store: &'a dyn AnalysisStore,
        classifier: &'a ArtifactClassifier,
        max_repository_size_kb: u64,
    ) -> Self {
        Self {
            fetcher,
            store,
            classifier,
            max_repository_size_kb,
            progress: None,
        }
    }

    /// Publish a status event to the requester before each collection stage.
    pub fn with_progress(mut self, progress: &'a ProgressHub) -> Self {
        self.progress = Some(progress);
        self
    }

    fn stage(&self, requester_id: &str, message: &str) {
        if let Some(progress) = self.progress {
            progress.publish(requester_id, ProgressStage::Status, message);
        }
    }

    /// Collect the aggregate result and upsert the repository record.
    ///
    /// Oversized repositories are rejected before anything else is fetched
    /// or stored.
    pub fn collect(
        &self,
        repo: &RepositoryRef,
        requester_id: &str,
    ) -> Result<AggregateResult, AnalysisError> {
        self.stage(requester_id, "connecting to GitHub");
        let payload = self.fetcher.repository(repo)?;
        if let Some(size_kb) = payload.size {
            if size_kb > self.max_repository_size_kb {
                return Err(AnalysisError::TooLarge {
                    size_kb,
                    limit_kb: self.max_repository_size_kb,
                });
            }
        }
        let identity = payload.identity();

        let now = Utc::now();
        self.stage(requester_id, "analysing commit history");
        let commits = self.fetcher.commits_since(repo, commit_window_start(now))?;
        self.stage(requester_id, "analysing documentation");
        let readme = self.fetcher.readme(repo)?;
        self.stage(requester_id, "analysing security configuration");
        let tree = self.fetcher.tree(repo, &identity.default_branch)?;
        if tree.as_ref().is_some_and(|tree| tree.truncated) {
            log::warn!("tree listing for {repo} was truncated; classification is partial");
        }
        let entries = tree.map(|tree| tree.entries());
        let findings = self.classifier.classify(entries.as_deref());
        self.stage(requester_id, "analysing test layout");
        self.stage(requester_id, "analysing CI/CD configuration");
        self.stage(requester_id, "analysing community activity");
        let issues = self.fetcher.issues(repo)?;
        let pulls = self.fetcher.pull_requests(repo)?;
        let languages = self.fetcher.languages(repo)?;
        log::info!(
            "collected {repo}: {} commits, {} issues, {} pull requests",
            commits.len(),
            issues.len(),
            pulls.len()
        );

        self.store.upsert_repository(&RepositoryUpsert {
            requester_id: requester_id.to_string(),
            html_url: repo.html_url(),
            identity: identity.clone(),
            languages: languages.clone(),
        })?;

        Ok(AggregateResult {
            repository: identity,
            readme: classify_optional_readme(readme.as_deref()),
            commits: summarize_commits(&commits, now),
            tests: findings.tests,
            cicd: findings.cicd,
            security: findings.security,
            issues: summarize_issues(&issues),
            pull_requests: summarize_pull_requests(&pulls),
            languages,
            collected_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::{FetchError, MockSourceFetcher};
    use crate::progress::DEFAULT_PROGRESS_TIMEOUT;
    use crate::store::MemoryAnalysisStore;
    use crate::test_support::{env_lock, remove_env, set_env};
    use repograde_core::LanguageBytes;
    use repograde_core::payload::{RepositoryPayload, TreeItem, TreePayload};

    fn payload(size: Option<u64>) -> RepositoryPayload {
        RepositoryPayload {
            name: "widgets".to_string(),
            html_url: "https://github.com/octo/widgets".to_string(),
            description: None,
            language: Some("Java".to_string()),
            default_branch: Some("trunk".to_string()),
            size,
        }
    }

    fn item(path: &str, kind: &str) -> TreeItem {
        TreeItem {
            path: path.to_string(),
            kind: kind.to_string(),
        }
    }

    fn happy_fetcher() -> MockSourceFetcher {
        let mut fetcher = MockSourceFetcher::new();
        fetcher
            .expect_repository()
            .returning(|_| Ok(payload(Some(10))));
        fetcher.expect_commits_since().returning(|_, _| Ok(Vec::new()));
        fetcher
            .expect_readme()
            .returning(|_| Ok(Some("# Widgets\n## Usage\n".to_string())));
        fetcher
            .expect_tree()
            .withf(|_, branch| branch == "trunk")
            .returning(|_, _| {
                Ok(Some(TreePayload {
                    tree: vec![
                        item(".github", "tree"),
                        item(".github/workflows/ci.yml", "blob"),
                        item("src/WidgetTest.java", "blob"),
                        item("src/Widget.java", "blob"),
                    ],
                    truncated: false,
                }))
            });
        fetcher.expect_issues().returning(|_| Ok(Vec::new()));
        fetcher.expect_pull_requests().returning(|_| Ok(Vec::new()));
        fetcher
            .expect_languages()
            .returning(|_| Ok(LanguageBytes::from([("Java".to_string(), 2048)])));
        fetcher
    }

    #[test]
    fn collects_and_classifies_sample_tree() {
        let fetcher = happy_fetcher();
        let store = MemoryAnalysisStore::new();
        let classifier = ArtifactClassifier::new().expect("patterns");
        let aggregator = Aggregator::new(&fetcher, &store, &classifier, 1_000);

        let result = aggregator
            .collect(&RepositoryRef::new("octo", "widgets"), "u1")
            .expect("collect");

        assert!(result.cicd.has_cicd);
        assert_eq!(result.tests.test_file_count, 1);
        assert_eq!(result.tests.source_file_count, 1);
        assert_eq!(result.tests.coverage_ratio, 1.0);
        assert!(!result.security.has_sensitive_file);
        assert_eq!(result.readme.sections, vec!["Widgets", "Usage"]);
        assert_eq!(result.commits.commit_count_90d, 0);
        assert_eq!(result.repository.default_branch, "trunk");

        let stored = store
            .find_repository("https://github.com/octo/widgets", "u1")
            .expect("find")
            .expect("stored");
        assert_eq!(
            store.languages(stored.id).expect("languages"),
            Some(LanguageBytes::from([("Java".to_string(), 2048)]))
        );
    }

    #[test]
    fn oversized_repository_stops_before_other_fetches() {
        let mut fetcher = MockSourceFetcher::new();
        fetcher
            .expect_repository()
            .returning(|_| Ok(payload(Some(2_000_000))));
        fetcher.expect_commits_since().never();
        fetcher.expect_tree().never();
        fetcher.expect_languages().never();
        let store = MemoryAnalysisStore::new();
        let classifier = ArtifactClassifier::new().expect("patterns");
        let aggregator = Aggregator::new(&fetcher, &store, &classifier, 1_000_000);

        let err = aggregator
            .collect(&RepositoryRef::new("octo", "widgets"), "u1")
            .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::TooLarge {
                size_kb: 2_000_000,
                limit_kb: 1_000_000
            }
        ));
        assert_eq!(store.repository_count(), 0);
    }

    #[test]
    fn missing_size_skips_the_guard_and_missing_tree_is_empty() {
        let mut fetcher = MockSourceFetcher::new();
        fetcher.expect_repository().returning(|_| Ok(payload(None)));
        fetcher.expect_commits_since().returning(|_, _| Ok(Vec::new()));
        fetcher.expect_readme().returning(|_| Ok(None));
        fetcher.expect_tree().returning(|_, _| Ok(None));
        fetcher.expect_issues().returning(|_| Ok(Vec::new()));
        fetcher.expect_pull_requests().returning(|_| Ok(Vec::new()));
        fetcher
            .expect_languages()
            .returning(|_| Ok(LanguageBytes::new()));
        let store = MemoryAnalysisStore::new();
        let classifier = ArtifactClassifier::new().expect("patterns");
        let aggregator = Aggregator::new(&fetcher, &store, &classifier, 1);

        let result = aggregator
            .collect(&RepositoryRef::new("octo", "widgets"), "u1")
            .expect("collect");
        assert!(!result.readme.has_readme);
        assert!(!result.cicd.has_cicd);
        assert_eq!(result.tests.coverage_ratio, 0.0);
    }

    #[test]
    fn publishes_each_collection_stage() {
        let fetcher = happy_fetcher();
        let store = MemoryAnalysisStore::new();
        let classifier = ArtifactClassifier::new().expect("patterns");
        let progress = ProgressHub::new(DEFAULT_PROGRESS_TIMEOUT);
        let mut stream = progress.connect("u1");
        let aggregator =
            Aggregator::new(&fetcher, &store, &classifier, 1_000).with_progress(&progress);

        aggregator
            .collect(&RepositoryRef::new("octo", "widgets"), "u1")
            .expect("collect");

        let messages: Vec<String> = std::iter::from_fn(|| stream.try_next())
            .filter(|event| event.stage == ProgressStage::Status)
            .map(|event| event.message)
            .collect();
        assert_eq!(
            messages,
            vec![
                "connecting to GitHub",
                "analysing commit history",
                "analysing documentation",
                "analysing security configuration",
                "analysing test layout",
                "analysing CI/CD configuration",
                "analysing community activity",
            ]
        );
    }

    #[test]
    fn oversized_repository_reports_only_the_connect_stage() {
        let mut fetcher = MockSourceFetcher::new();
        fetcher
            .expect_repository()
            .returning(|_| Ok(payload(Some(5_000))));
        let store = MemoryAnalysisStore::new();
        let classifier = ArtifactClassifier::new().expect("patterns");
        let progress = ProgressHub::new(DEFAULT_PROGRESS_TIMEOUT);
        let mut stream = progress.connect("u1");
        let aggregator =
            Aggregator::new(&fetcher, &store, &classifier, 1_000).with_progress(&progress);

        aggregator
            .collect(&RepositoryRef::new("octo", "widgets"), "u1")
            .unwrap_err();

        let statuses: Vec<String> = std::iter::from_fn(|| stream.try_next())
            .filter(|event| event.stage == ProgressStage::Status)
            .map(|event| event.message)
            .collect();
        assert_eq!(statuses, vec!["connecting to GitHub"]);
    }

    #[test]
    fn fetch_failures_are_classified() {
        let mut fetcher = MockSourceFetcher::new();
        fetcher
            .expect_repository()
            .returning(|repo| Err(FetchError::NotFound(repo.to_string())));
        let store = MemoryAnalysisStore::new();
        let classifier = ArtifactClassifier::new().expect("patterns");
        let aggregator = Aggregator::new(&fetcher, &store, &classifier, 1_000);

        let err = aggregator
            .collect(&RepositoryRef::new("octo", "gone"), "u1")
            .unwrap_err();
        assert_eq!(err.code(), "GITHUB_REPO_NOT_FOUND");
    }

    #[test]
    fn size_limit_reads_from_env() {
        let _guard = env_lock();
        remove_env("REPOGRADE_MAX_REPO_SIZE_KB");
        assert_eq!(max_repository_size_from_env(), DEFAULT_MAX_REPOSITORY_SIZE_KB);
        set_env("REPOGRADE_MAX_REPO_SIZE_KB", "2048");
        assert_eq!(max_repository_size_from_env(), 2048);
        set_env("REPOGRADE_MAX_REPO_SIZE_KB", "big");
        assert_eq!(max_repository_size_from_env(), DEFAULT_MAX_REPOSITORY_SIZE_KB);
        remove_env("REPOGRADE_MAX_REPO_SIZE_KB");
    }
}

//! Offline inspection of a local repository checkout.

use std::path::Path;

use crate::classifier::ArtifactClassifier;
use crate::fs::{FileSystem, read_readme, tree_entries};
use crate::inspector::LanguageInspector;
use crate::readme::classify_optional_readme;
use crate::report::CheckoutReport;

/// Inspect a checkout with the same classifiers the analysis pipeline uses.
///
/// Failures are recorded on the report rather than aborting it.
pub fn inspect_checkout<F: FileSystem + Clone>(
    fs: &F,
    classifier: &ArtifactClassifier,
    source: &str,
    root: &Path,
) -> CheckoutReport {
    let mut report = CheckoutReport::new(source.to_string(), root.to_path_buf());

    let entries = match tree_entries(fs, root) {
        Ok(entries) => entries,
        Err(err) => {
            report.errors.push(format!("listing failed: {err}"));
            return report;
        }
    };
    report.file_count = entries.len();

    let findings = classifier.classify(Some(entries.as_slice()));
    report.tests = findings.tests;
    report.cicd = findings.cicd;
    report.security = findings.security;
    report.readme = classify_optional_readme(read_readme(fs, root, &entries).as_deref());

    match LanguageInspector::new(fs.clone()).inspect(root) {
        Ok(languages) => report.languages = Some(languages),
        Err(err) => report.errors.push(format!("language scan failed: {err}")),
    }

    report
}

#[cfg(test)]
mod tests {
    use super::inspect_checkout;
    use crate::classifier::ArtifactClassifier;
    use crate::error::{RepoGradeError, Result};
    use crate::fs::FileSystem;
    use std::path::{Path, PathBuf};

    #[derive(Clone)]
    struct FixedFileSystem {
        files: Vec<(&'static str, &'static str)>,
    }

    impl FileSystem for FixedFileSystem {
        fn list_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
            Ok(self.files.iter().map(|(path, _)| root.join(path)).collect())
        }

        fn read_to_string(&self, path: &Path) -> Result<String> {
            self.files
                .iter()
                .find(|(name, _)| path.ends_with(name))
                .map(|(_, contents)| contents.to_string())
                .ok_or_else(|| RepoGradeError::Other(format!("missing {}", path.display())))
        }
    }

    #[derive(Clone)]
    struct BrokenFileSystem;

    impl FileSystem for BrokenFileSystem {
        fn list_files(&self, _root: &Path) -> Result<Vec<PathBuf>> {
            Err(RepoGradeError::Other("permission denied".to_string()))
        }

        fn read_to_string(&self, _path: &Path) -> Result<String> {
            Err(RepoGradeError::Other("permission denied".to_string()))
        }
    }

    #[test]
    fn inspects_checkout_end_to_end() {
        let fs = FixedFileSystem {
            files: vec![
                ("README.md", "# Widgets\n## Install\n"),
                (".github/workflows/ci.yml", "on: push\n"),
                ("src/lib.rs", "pub fn widget() {}\n"),
                ("tests/widget.rs", "#[test]\nfn works() {}\n"),
                (".env", "TOKEN=abc\n"),
            ],
        };
        let classifier = ArtifactClassifier::new().expect("patterns");
        let report = inspect_checkout(&fs, &classifier, "local", Path::new("/repo"));

        assert!(report.errors.is_empty(), "{:?}", report.errors);
        assert_eq!(report.file_count, 5);
        assert_eq!(report.readme.sections, vec!["Widgets", "Install"]);
        assert!(report.cicd.has_cicd);
        assert_eq!(report.tests.coverage_ratio, 1.0);
        assert_eq!(report.security.sensitive_files, vec![".env"]);
        assert!(report.languages.is_some());
    }

    #[test]
    fn listing_failure_is_recorded() {
        let classifier = ArtifactClassifier::new().expect("patterns");
        let report = inspect_checkout(&BrokenFileSystem, &classifier, "local", Path::new("/repo"));
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("permission denied"));
    }
}

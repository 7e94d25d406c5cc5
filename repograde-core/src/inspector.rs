//! Test-layout heuristics and local language inspection.

use std::collections::BTreeMap;
use std::path::Path;

use tokei::{Config, LanguageType};

use crate::domain::{LanguageDistribution, TestStats, TreeEntry};
use crate::error::Result;
use crate::fs::FileSystem;
use crate::patterns::PatternSet;

/// Conventional test directories, at any depth.
pub const TEST_DIRECTORY_PATTERNS: &[&str] =
    &[r"(?:.*/)?(?:test|tests|__tests__|spec|specs|testing)/.*"];

/// Language-specific test file naming conventions.
pub const TEST_FILE_PATTERNS: &[&str] = &[
    r"(?:.*/)?[^/]*Test\.(?:java|kt|js|ts|py|rb|go|rs|cs|scala|swift)",
    r"(?:.*/)?[^/]*Tests\.(?:java|kt|cs|swift)",
    r"(?:.*/)?[^/]+\.test\.(?:js|ts|jsx|tsx|mjs|cjs)",
    r"(?:.*/)?[^/]+\.spec\.(?:js|ts|jsx|tsx|mjs|cjs)",
    r"(?:.*/)?[^/]+_test\.(?:py|go|rs|rb|c|cpp)",
    r"(?:.*/)?test_[^/]+\.py",
    r"(?:.*/)?[^/]+_spec\.rb",
];

/// Extensions counted as source code.
pub const SOURCE_EXTENSIONS: &[&str] = &[
    "java", "kt", "kts", "js", "ts", "jsx", "tsx", "mjs", "cjs", "py", "rb", "go", "rs", "cpp",
    "cc", "cxx", "c", "h", "hpp", "cs", "php", "swift", "scala",
];

/// Classifies test files against source files.
#[derive(Debug, Clone)]
pub struct TestClassifier {
    directories: PatternSet,
    files: PatternSet,
}

impl TestClassifier {
    /// Build a classifier with the standard conventions.
    pub fn new() -> Result<Self> {
        Self::with_patterns(TEST_DIRECTORY_PATTERNS, TEST_FILE_PATTERNS)
    }

    /// Build a classifier with custom directory and file conventions.
    pub fn with_patterns(directories: &[&str], files: &[&str]) -> Result<Self> {
        Ok(Self {
            directories: PatternSet::new(directories)?,
            files: PatternSet::new(files)?,
        })
    }

    /// Whether the path lies under a test directory or follows a test naming convention.
    pub fn is_test_path(&self, path: &str) -> bool {
        self.directories.matches(path) || self.files.matches(path)
    }

    /// Partition source files into tests and non-tests.
    ///
    /// Test and source counts are disjoint. The ratio is a filename
    /// heuristic and says nothing about executed coverage.
    pub fn classify(&self, entries: &[TreeEntry]) -> TestStats {
        let mut has_test_directory = false;
        let mut test_file_count = 0usize;
        let mut source_file_count = 0usize;

        for entry in entries.iter().filter(|entry| entry.is_file()) {
            let in_test_dir = self.directories.matches(&entry.path);
            has_test_directory |= in_test_dir;
            if !is_source_file(&entry.path) {
                continue;
            }
            if in_test_dir || self.files.matches(&entry.path) {
                test_file_count += 1;
            } else {
                source_file_count += 1;
            }
        }

        TestStats {
            has_test_directory,
            test_file_count,
            source_file_count,
            coverage_ratio: coverage_ratio(test_file_count, source_file_count),
        }
    }
}

/// Test files per source file, rounded to three decimals; 0.0 without sources.
pub fn coverage_ratio(test_files: usize, source_files: usize) -> f64 {
    if source_files == 0 {
        return 0.0;
    }
    let ratio = test_files as f64 / source_files as f64;
    (ratio * 1000.0).round() / 1000.0
}

fn is_source_file(path: &str) -> bool {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let Some((stem, ext)) = file_name.rsplit_once('.') else {
        return false;
    };
    if stem.is_empty() {
        return false;
    }
    let ext = ext.to_lowercase();
    SOURCE_EXTENSIONS.contains(&ext.as_str())
}

/// Computes the language mix of a local checkout using `tokei`.
pub struct LanguageInspector<F: FileSystem> {
    fs: F,
    config: Config,
}

impl<F: FileSystem> LanguageInspector<F> {
    /// Create a new inspector with default `tokei` configuration.
    pub fn new(fs: F) -> Self {
        Self {
            fs,
            config: Config::default(),
        }
    }

    /// Percentage of non-empty lines per language under `root`.
    pub fn inspect(&self, root: &Path) -> Result<LanguageDistribution> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut total = 0usize;

        for path in self.fs.list_files(root)? {
            let Some(language) = LanguageType::from_path(&path, &self.config) else {
                continue;
            };
            let contents = self.fs.read_to_string(&path)?;
            let lines = contents.lines().filter(|line| !line.trim().is_empty()).count();
            if lines == 0 {
                continue;
            }
            total += lines;
            *counts.entry(language.to_string()).or_insert(0) += lines;
        }

        if total == 0 {
            return Ok(BTreeMap::new());
        }

        Ok(counts
            .into_iter()
            .map(|(language, count)| (language, (count as f64 / total as f64) * 100.0))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{LanguageInspector, TestClassifier, coverage_ratio};
    use crate::domain::{TestStats, TreeEntry};
    use crate::fs::MockFileSystem;
    use std::path::{Path, PathBuf};

    fn classify(paths: &[&str]) -> TestStats {
        let entries: Vec<TreeEntry> = paths.iter().map(|path| TreeEntry::file(*path)).collect();
        TestClassifier::new().expect("patterns").classify(&entries)
    }

    #[test]
    fn widget_layout_yields_full_ratio() {
        let stats = classify(&[
            ".github/workflows/ci.yml",
            "src/WidgetTest.java",
            "src/Widget.java",
        ]);
        assert_eq!(stats.test_file_count, 1);
        assert_eq!(stats.source_file_count, 1);
        assert_eq!(stats.coverage_ratio, 1.0);
        assert!(!stats.has_test_directory);
    }

    #[test]
    fn no_sources_yields_zero_ratio() {
        let stats = classify(&["README.md", "tests/fixture.json"]);
        assert_eq!(stats.source_file_count, 0);
        assert_eq!(stats.coverage_ratio, 0.0);
        assert!(stats.has_test_directory);
    }

    #[test]
    fn equal_tests_and_sources_yield_one() {
        let stats = classify(&[
            "src/a.rs",
            "src/b.go",
            "src/c.py",
            "tests/a.rs",
            "pkg/b_test.go",
            "app/test_c.py",
        ]);
        assert_eq!(stats.test_file_count, 3);
        assert_eq!(stats.source_file_count, 3);
        assert_eq!(stats.coverage_ratio, 1.0);
    }

    #[test]
    fn recognizes_conventions_across_languages() {
        let classifier = TestClassifier::new().expect("patterns");
        for path in [
            "web/src/button.test.tsx",
            "web/src/button.spec.ts",
            "lib/parser_spec.rb",
            "src/__tests__/app.js",
            "module/src/test/java/AppTests.java",
            "test/helpers.c",
        ] {
            assert!(classifier.is_test_path(path), "expected {path} to be a test");
        }
        assert!(!classifier.is_test_path("src/contest.rs"));
        assert!(!classifier.is_test_path("src/latest/mod.rs"));
    }

    #[test]
    fn ratio_is_rounded_to_three_decimals() {
        assert_eq!(coverage_ratio(1, 3), 0.333);
        assert_eq!(coverage_ratio(2, 3), 0.667);
        assert_eq!(coverage_ratio(5, 0), 0.0);
    }

    #[test]
    fn directories_and_non_sources_are_ignored() {
        let entries = vec![
            TreeEntry::directory("tests"),
            TreeEntry::file("tests/data.csv"),
            TreeEntry::file("src/lib.rs"),
        ];
        let stats = TestClassifier::new().expect("patterns").classify(&entries);
        assert_eq!(stats.test_file_count, 0);
        assert_eq!(stats.source_file_count, 1);
        assert!(stats.has_test_directory);
    }

    #[test]
    fn language_inspector_reports_distribution() {
        let mut fs = MockFileSystem::new();
        fs.expect_list_files().returning(|_| {
            Ok(vec![
                PathBuf::from("src/main.rs"),
                PathBuf::from("src/app.py"),
            ])
        });
        fs.expect_read_to_string()
            .withf(|path| path == Path::new("src/main.rs"))
            .returning(|_| Ok("fn main() {}\n\n".to_string()));
        fs.expect_read_to_string()
            .withf(|path| path == Path::new("src/app.py"))
            .returning(|_| Ok("print('hi')\n".to_string()));

        let distribution = LanguageInspector::new(fs)
            .inspect(Path::new("/repo"))
            .expect("inspect succeeds");

        let rust_key = tokei::LanguageType::Rust.to_string();
        let python_key = tokei::LanguageType::Python.to_string();
        assert_eq!(distribution.get(&rust_key).copied(), Some(50.0));
        assert_eq!(distribution.get(&python_key).copied(), Some(50.0));
    }

    #[test]
    fn language_inspector_handles_empty_files() {
        let mut fs = MockFileSystem::new();
        fs.expect_list_files()
            .returning(|_| Ok(vec![PathBuf::from("src/empty.rs")]));
        fs.expect_read_to_string().returning(|_| Ok(String::new()));

        let distribution = LanguageInspector::new(fs)
            .inspect(Path::new("/repo"))
            .expect("inspect succeeds");
        assert!(distribution.is_empty());
    }
}

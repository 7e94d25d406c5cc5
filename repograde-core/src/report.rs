//! Report formatting for local checkout inspections.

use std::fmt::Write;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::{CicdStats, LanguageDistribution, ReadmeStats, SecurityStats, TestStats};

/// Inspection report for one local checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutReport {
    /// Source label given by the caller.
    pub source: String,
    /// Local path inspected.
    pub path: PathBuf,
    /// Number of files considered.
    pub file_count: usize,
    /// README statistics.
    pub readme: ReadmeStats,
    /// Test layout statistics.
    pub tests: TestStats,
    /// CI/CD statistics.
    pub cicd: CicdStats,
    /// Security statistics.
    pub security: SecurityStats,
    /// Language distribution, when it could be computed.
    pub languages: Option<LanguageDistribution>,
    /// Errors encountered during inspection.
    pub errors: Vec<String>,
}

impl CheckoutReport {
    /// Create an empty report for a checkout.
    pub fn new(source: String, path: PathBuf) -> Self {
        Self {
            source,
            path,
            file_count: 0,
            readme: ReadmeStats::default(),
            tests: TestStats::default(),
            cicd: CicdStats::default(),
            security: SecurityStats::default(),
            languages: None,
            errors: Vec::new(),
        }
    }

    /// Create a report for a checkout that could not be inspected.
    pub fn failed(source: String, path: PathBuf, error: impl Into<String>) -> Self {
        let mut report = Self::new(source, path);
        report.errors.push(error.into());
        report
    }
}

/// Render checkout reports as Markdown.
pub fn render_checkout_markdown(reports: &[CheckoutReport]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# RepoGrade Inspection Report\n");
    for report in reports {
        let _ = writeln!(output, "## {}\n", report.source);
        let _ = writeln!(output, "- Path: `{}`", report.path.display());
        let _ = writeln!(output, "- Files: {}\n", report.file_count);
        append_readme(&mut output, &report.readme);
        append_tests(&mut output, &report.tests);
        append_list(
            &mut output,
            "CI/CD",
            &report.cicd.cicd_files,
            "No CI/CD configuration found.",
        );
        append_list(
            &mut output,
            "Build files",
            &report.cicd.build_files,
            "No build manifests found.",
        );
        append_list(
            &mut output,
            "Container files",
            &report.cicd.container_files,
            "No container files found.",
        );
        append_list(
            &mut output,
            "Sensitive files",
            &report.security.sensitive_files,
            "No sensitive files committed.",
        );
        append_language_stats(&mut output, report.languages.as_ref());
        append_list(&mut output, "Errors", &report.errors, "No errors reported.");
        let _ = writeln!(output);
    }
    output
}

/// Render checkout reports as compact plain text.
pub fn render_checkout_text(reports: &[CheckoutReport]) -> String {
    let mut output = String::new();
    for report in reports {
        let _ = writeln!(output, "{} ({})", report.source, report.path.display());
        let _ = writeln!(
            output,
            "  readme: {} ({} sections)",
            yes_no(report.readme.has_readme),
            report.readme.section_count
        );
        let _ = writeln!(
            output,
            "  tests: {} test / {} source (ratio {:.3})",
            report.tests.test_file_count, report.tests.source_file_count, report.tests.coverage_ratio
        );
        let _ = writeln!(
            output,
            "  ci/cd: {}  build: {}  container: {}",
            yes_no(report.cicd.has_cicd),
            yes_no(report.cicd.has_build_file),
            yes_no(report.cicd.has_container_file)
        );
        let _ = writeln!(
            output,
            "  sensitive files: {}",
            report.security.sensitive_files.len()
        );
        if let Some(languages) = &report.languages {
            let top: Vec<String> = format_language_stats(languages)
                .into_iter()
                .take(3)
                .map(|(language, percent)| format!("{language} {percent:.1}%"))
                .collect();
            if !top.is_empty() {
                let _ = writeln!(output, "  languages: {}", top.join(", "));
            }
        }
        for error in &report.errors {
            let _ = writeln!(output, "  error: {error}");
        }
    }
    output
}

/// Render any serializable report payload as JSON.
pub fn render_json<T: Serialize + ?Sized>(payload: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(payload)
}

/// Format language stats sorted by percentage.
pub fn format_language_stats(stats: &LanguageDistribution) -> Vec<(String, f64)> {
    let mut items: Vec<(String, f64)> = stats.iter().map(|(k, v)| (k.clone(), *v)).collect();
    items.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    items
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn append_readme(output: &mut String, readme: &ReadmeStats) {
    if !readme.has_readme {
        let _ = writeln!(output, "### README\nNo README found.\n");
        return;
    }
    let _ = writeln!(
        output,
        "### README\n{} characters, {} sections",
        readme.length, readme.section_count
    );
    for section in &readme.sections {
        let _ = writeln!(output, "- {section}");
    }
    let _ = writeln!(output);
}

fn append_tests(output: &mut String, tests: &TestStats) {
    let _ = writeln!(
        output,
        "### Tests\n- Test directory: {}\n- Test files: {}\n- Source files: {}\n- Ratio: {:.3}\n",
        yes_no(tests.has_test_directory),
        tests.test_file_count,
        tests.source_file_count,
        tests.coverage_ratio
    );
}

fn append_language_stats(output: &mut String, stats: Option<&LanguageDistribution>) {
    match stats {
        Some(stats) if stats.is_empty() => {
            let _ = writeln!(output, "### Languages\nNo languages detected.\n");
        }
        Some(stats) => {
            let _ = writeln!(output, "### Languages");
            for (language, percent) in format_language_stats(stats) {
                let _ = writeln!(output, "- {language}: {percent:.2}%");
            }
            let _ = writeln!(output);
        }
        None => {
            let _ = writeln!(output, "### Languages\nLanguages unavailable.\n");
        }
    }
}

fn append_list(output: &mut String, title: &str, items: &[String], empty_message: &str) {
    if items.is_empty() {
        let _ = writeln!(output, "### {title}\n{empty_message}\n");
        return;
    }
    let _ = writeln!(output, "### {title}");
    for item in items {
        let _ = writeln!(output, "- {item}");
    }
    let _ = writeln!(output);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_report() -> CheckoutReport {
        let mut report = CheckoutReport::new("widgets".to_string(), PathBuf::from("/tmp/widgets"));
        report.file_count = 4;
        report.readme = ReadmeStats {
            has_readme: true,
            length: 42,
            sections: vec!["Install".to_string()],
            section_count: 1,
        };
        report.cicd.has_cicd = true;
        report.cicd.cicd_files = vec![".github/workflows/ci.yml".to_string()];
        report.security.sensitive_files = vec![".env".to_string()];
        let mut languages = BTreeMap::new();
        languages.insert("Rust".to_string(), 75.5);
        languages.insert("Python".to_string(), 24.5);
        report.languages = Some(languages);
        report
    }

    #[test]
    fn renders_checkout_markdown() {
        let output = render_checkout_markdown(&[sample_report()]);
        assert!(output.contains("RepoGrade Inspection Report"));
        assert!(output.contains("42 characters, 1 sections"));
        assert!(output.contains("- .github/workflows/ci.yml"));
        assert!(output.contains("No build manifests found."));
        assert!(output.contains("- .env"));
        assert!(output.contains("Rust: 75.50%"));
    }

    #[test]
    fn renders_checkout_text() {
        let mut failed = CheckoutReport::failed(
            "broken".to_string(),
            PathBuf::from("/tmp/broken"),
            "listing failed",
        );
        failed.languages = Some(BTreeMap::new());
        let output = render_checkout_text(&[sample_report(), failed]);
        assert!(output.contains("ci/cd: yes"));
        assert!(output.contains("languages: Rust 75.5%, Python 24.5%"));
        assert!(output.contains("error: listing failed"));
    }

    #[test]
    fn renders_json_payload() {
        let json = render_json(&vec![sample_report()]).expect("json");
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed[0]["file_count"], 4);
        assert_eq!(parsed[0]["cicd"]["has_cicd"], true);
    }

    #[test]
    fn formats_language_stats_sorted() {
        let mut stats = BTreeMap::new();
        stats.insert("Go".to_string(), 10.0);
        stats.insert("Rust".to_string(), 30.0);
        let ordered = format_language_stats(&stats);
        assert_eq!(ordered[0].0, "Rust");
    }
}

//! README structure extraction.

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::ReadmeStats;

fn header_regex() -> Option<&'static Regex> {
    static HEADER: OnceLock<Option<Regex>> = OnceLock::new();
    HEADER
        .get_or_init(|| Regex::new(r"^(#{1,6})\s+(.+)$").ok())
        .as_ref()
}

/// Extract README statistics from raw Markdown.
///
/// Only ATX headers (`#` through `######`) outside fenced code blocks are
/// counted as sections; HTML headings are ignored.
pub fn classify_readme(content: &str) -> ReadmeStats {
    if content.trim().is_empty() {
        return ReadmeStats::default();
    }

    let sections = section_titles(content);
    ReadmeStats {
        has_readme: true,
        length: content.chars().count(),
        section_count: sections.len(),
        sections,
    }
}

/// Like [`classify_readme`] but tolerates a missing README.
pub fn classify_optional_readme(content: Option<&str>) -> ReadmeStats {
    content.map(classify_readme).unwrap_or_default()
}

fn section_titles(content: &str) -> Vec<String> {
    let Some(header) = header_regex() else {
        return Vec::new();
    };
    let mut in_fence = false;
    let mut titles = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.starts_with("```") || line.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if let Some(captures) = header.captures(line) {
            let title = captures
                .get(2)
                .map(|m| m.as_str().trim().trim_end_matches('#').trim())
                .unwrap_or_default();
            if !title.is_empty() {
                titles.push(title.to_string());
            }
        }
    }

    titles
}

#[cfg(test)]
mod tests {
    use super::{classify_optional_readme, classify_readme};
    use crate::domain::ReadmeStats;

    #[test]
    fn blank_readme_is_empty() {
        assert_eq!(classify_readme("   \n\t\n"), ReadmeStats::default());
        assert_eq!(classify_optional_readme(None), ReadmeStats::default());
    }

    #[test]
    fn collects_atx_headers() {
        let readme = "# Widgets\n\nIntro\n\n## Install ##\n### Usage\n####### too deep\n#nospace\n";
        let stats = classify_readme(readme);

        assert!(stats.has_readme);
        assert_eq!(stats.sections, vec!["Widgets", "Install", "Usage"]);
        assert_eq!(stats.section_count, 3);
        assert_eq!(stats.length, readme.chars().count());
    }

    #[test]
    fn headers_inside_fences_are_ignored() {
        let readme = "# Title\n```bash\n# not a header\n```\n~~~\n## also hidden\n~~~\n## Visible\n";
        let stats = classify_readme(readme);
        assert_eq!(stats.sections, vec!["Title", "Visible"]);
    }

    #[test]
    fn html_headers_are_not_sections() {
        let stats = classify_readme("<h1>Project</h1>\n\nbody text");
        assert!(stats.has_readme);
        assert!(stats.sections.is_empty());
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let stats = classify_readme("# 안녕");
        assert_eq!(stats.length, 4);
    }

    #[test]
    fn classification_is_idempotent() {
        let readme = "# A\n```\n# B\n```\n## C\n";
        assert_eq!(classify_readme(readme), classify_readme(readme));
    }
}

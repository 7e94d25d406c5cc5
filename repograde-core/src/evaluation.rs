//! Scoring rubric and tolerant parsing of evaluation model output.

use serde::Deserialize;

use crate::domain::{Evaluation, ScoreBreakdown};
use crate::error::{RepoGradeError, Result};

/// Instructions sent alongside the serialized aggregate result.
pub const RUBRIC_PROMPT: &str = r#"You are a senior software engineering reviewer.
Analyze the given GitHub repository data and return ONLY valid JSON. No commentary.

Scoring: total 100 (README 0-25, TEST 0-25, COMMIT 0-25, CICD 0-25).
Consider test folders, CI configs (e.g. .github/workflows), commit frequency and messages,
README depth, committed secrets, and issue or pull request activity.

JSON schema:
{
  "summary": "one-paragraph summary",
  "strengths": ["...", "..."],
  "improvements": ["...", "..."],
  "scores": { "readme": 0, "test": 0, "commit": 0, "cicd": 0 }
}"#;

#[derive(Debug, Deserialize)]
struct RawScores {
    #[serde(default)]
    readme: i64,
    #[serde(default)]
    test: i64,
    #[serde(default)]
    commit: i64,
    #[serde(default)]
    cicd: i64,
}

#[derive(Debug, Deserialize)]
struct RawEvaluation {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    strengths: Vec<Option<String>>,
    #[serde(default)]
    improvements: Vec<Option<String>>,
    scores: RawScores,
}

/// Locate the JSON object inside free-form model output.
///
/// Code fences are unwrapped and the slice from the first `{` to the last
/// `}` is returned. Without braces the cleaned text itself is returned.
pub fn extract_json(raw: &str) -> &str {
    let cleaned = raw.trim();
    let start = cleaned.find('{');
    let end = cleaned.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if start < end => &cleaned[start..=end],
        _ => strip_fences(cleaned),
    }
}

fn strip_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse model output into an [`Evaluation`], clamping scores into the rubric.
pub fn parse_evaluation(raw: &str) -> Result<Evaluation> {
    if raw.trim().is_empty() {
        return Err(RepoGradeError::Parse("evaluation output is empty".to_string()));
    }
    let parsed: RawEvaluation = serde_json::from_str(extract_json(raw))?;
    Ok(Evaluation {
        summary: clean_text(parsed.summary.as_deref()),
        strengths: clean_items(parsed.strengths),
        improvements: clean_items(parsed.improvements),
        scores: ScoreBreakdown::clamped(
            parsed.scores.readme,
            parsed.scores.test,
            parsed.scores.commit,
            parsed.scores.cicd,
        ),
    })
}

/// Trimmed text, empty for a missing value.
pub fn clean_text(value: Option<&str>) -> String {
    value.map(str::trim).unwrap_or_default().to_string()
}

/// Render list items as a `- ` prefixed, newline-joined block.
pub fn join_bullets<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|item| item.as_ref().trim())
        .filter(|item| !item.is_empty())
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split a stored bullet block back into items.
pub fn split_bullets(block: &str) -> Vec<String> {
    block
        .lines()
        .map(|line| line.trim().trim_start_matches("- ").trim())
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

fn clean_items(items: Vec<Option<String>>) -> Vec<String> {
    items
        .into_iter()
        .flatten()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

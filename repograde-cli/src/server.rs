//! Client for the RepoGrade analysis server.

use crate::{CliResult, OutputFormat};
use clap::Args;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::future::Future;
use std::pin::Pin;

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8080";

/// Connection arguments shared by server-backed commands.
#[derive(Args, Clone, Debug)]
pub struct ServerArgs {
    /// Base URL of the RepoGrade server.
    #[arg(long = "server", env = "REPOGRADE_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
    pub server_url: String,
    /// Requester identifier the analyses are recorded under.
    #[arg(long = "requester", env = "REPOGRADE_REQUESTER_ID")]
    pub requester_id: String,
}

#[derive(Debug, Serialize)]
struct AnalysisRequest<'a> {
    github_url: &'a str,
    requester_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnalysisResponse {
    repository_id: i64,
}

/// Error payload returned by the server.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub(crate) struct ErrorBody {
    code: String,
    message: String,
}

/// Repository fields shown in history listings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub(crate) struct RepositorySummary {
    id: i64,
    name: String,
    html_url: String,
    #[serde(default)]
    primary_language: Option<String>,
    #[serde(default)]
    public: bool,
}

/// Evaluation fields shown in history listings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub(crate) struct ResultSummary {
    id: i64,
    summary: String,
    total_score: u32,
    created_at: String,
}

/// One row of `GET /api/analysis/user/{requester_id}`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub(crate) struct HistoryRow {
    repository: RepositorySummary,
    latest_result: ResultSummary,
}

/// Analyse a repository and print the resulting repository id.
#[cfg(not(test))]
pub async fn run_analyze(args: ServerArgs, url: String) -> CliResult<()> {
    let client = ReqwestServerClient::new()?;
    let repository_id = run_analyze_with(&args, &url, &client).await?;
    println!("Analysis complete. Repository id: {repository_id}");
    Ok(())
}

/// Print past results for the requester.
#[cfg(not(test))]
pub async fn run_history(args: ServerArgs, format: OutputFormat) -> CliResult<()> {
    let client = ReqwestServerClient::new()?;
    let rows = run_history_with(&args, &client).await?;
    print!("{}", render_history(&rows, format)?);
    Ok(())
}

async fn run_analyze_with<C: ServerApi>(
    args: &ServerArgs,
    url: &str,
    client: &C,
) -> CliResult<i64> {
    let server_url = normalize_server_url(&args.server_url)?;
    let requester_id = normalize_requester(&args.requester_id)?;
    let url = url.trim();
    if url.is_empty() {
        return Err("repository url is required".into());
    }
    client.analyze(&server_url, url, requester_id).await
}

async fn run_history_with<C: ServerApi>(
    args: &ServerArgs,
    client: &C,
) -> CliResult<Vec<HistoryRow>> {
    let server_url = normalize_server_url(&args.server_url)?;
    let requester_id = normalize_requester(&args.requester_id)?;
    client.history(&server_url, requester_id).await
}

/// Normalize the server URL by trimming whitespace and trailing slashes.
fn normalize_server_url(server_url: &str) -> CliResult<String> {
    let trimmed = server_url.trim();
    if trimmed.is_empty() {
        return Err("server url is required".into());
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

fn normalize_requester(requester_id: &str) -> CliResult<&str> {
    let trimmed = requester_id.trim();
    if trimmed.is_empty() {
        return Err("requester id is required".into());
    }
    Ok(trimmed)
}

fn render_history(rows: &[HistoryRow], format: OutputFormat) -> CliResult<String> {
    Ok(match format {
        OutputFormat::Json => {
            let mut json = repograde_core::render_json(rows)?;
            json.push('\n');
            json
        }
        OutputFormat::Text => render_history_text(rows),
        OutputFormat::Markdown => render_history_markdown(rows),
    })
}

fn render_history_text(rows: &[HistoryRow]) -> String {
    if rows.is_empty() {
        return "No analyses recorded.\n".to_string();
    }
    let mut output = String::new();
    for row in rows {
        let _ = writeln!(
            output,
            "{:>3}/100  {}  (repository {}, result {}, {})",
            row.latest_result.total_score,
            row.repository.html_url,
            row.repository.id,
            row.latest_result.id,
            row.latest_result.created_at
        );
        if !row.latest_result.summary.is_empty() {
            let _ = writeln!(output, "         {}", row.latest_result.summary);
        }
    }
    output
}

fn render_history_markdown(rows: &[HistoryRow]) -> String {
    let mut output = String::from("# RepoGrade History\n\n");
    if rows.is_empty() {
        output.push_str("_No analyses recorded._\n");
        return output;
    }
    output.push_str("| Repository | Language | Score | Public | Analysed |\n");
    output.push_str("| --- | --- | ---: | --- | --- |\n");
    for row in rows {
        let _ = writeln!(
            output,
            "| [{}]({}) | {} | {} | {} | {} |",
            row.repository.name,
            row.repository.html_url,
            row.repository.primary_language.as_deref().unwrap_or("-"),
            row.latest_result.total_score,
            if row.repository.public { "yes" } else { "no" },
            row.latest_result.created_at
        );
    }
    output
}

async fn server_error(response: Response) -> Box<dyn std::error::Error + Send + Sync> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(error) => format!("server error ({status}) {}: {}", error.code, error.message).into(),
        Err(_) => format!("server error ({status}): {body}").into(),
    }
}

#[cfg_attr(test, allow(dead_code))]
async fn post_analysis(
    client: &Client,
    server_url: &str,
    github_url: &str,
    requester_id: &str,
) -> CliResult<i64> {
    let response = client
        .post(format!("{server_url}/api/analysis"))
        .json(&AnalysisRequest {
            github_url,
            requester_id,
        })
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(server_error(response).await);
    }
    Ok(response.json::<AnalysisResponse>().await?.repository_id)
}

#[cfg_attr(test, allow(dead_code))]
async fn fetch_history(
    client: &Client,
    server_url: &str,
    requester_id: &str,
) -> CliResult<Vec<HistoryRow>> {
    let response = client
        .get(format!(
            "{server_url}/api/analysis/user/{}",
            urlencoding::encode(requester_id)
        ))
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(server_error(response).await);
    }
    Ok(response.json::<Vec<HistoryRow>>().await?)
}

/// HTTP client abstraction for server-backed commands.
trait ServerApi {
    fn analyze<'a>(
        &'a self,
        server_url: &'a str,
        github_url: &'a str,
        requester_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = CliResult<i64>> + Send + 'a>>;

    fn history<'a>(
        &'a self,
        server_url: &'a str,
        requester_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = CliResult<Vec<HistoryRow>>> + Send + 'a>>;
}

/// Reqwest-backed server client.
#[cfg_attr(test, allow(dead_code))]
struct ReqwestServerClient {
    client: Client,
}

impl ReqwestServerClient {
    #[cfg_attr(test, allow(dead_code))]
    fn new() -> CliResult<Self> {
        let client = Client::builder().user_agent("repograde-cli").build()?;
        Ok(Self { client })
    }
}

impl ServerApi for ReqwestServerClient {
    fn analyze<'a>(
        &'a self,
        server_url: &'a str,
        github_url: &'a str,
        requester_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = CliResult<i64>> + Send + 'a>> {
        Box::pin(post_analysis(
            &self.client,
            server_url,
            github_url,
            requester_id,
        ))
    }

    fn history<'a>(
        &'a self,
        server_url: &'a str,
        requester_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = CliResult<Vec<HistoryRow>>> + Send + 'a>> {
        Box::pin(fetch_history(&self.client, server_url, requester_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingClient {
        calls: Mutex<Vec<String>>,
        history: Vec<HistoryRow>,
    }

    impl RecordingClient {
        fn new(history: Vec<HistoryRow>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                history,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls").clone()
        }
    }

    impl ServerApi for RecordingClient {
        fn analyze<'a>(
            &'a self,
            server_url: &'a str,
            github_url: &'a str,
            requester_id: &'a str,
        ) -> Pin<Box<dyn Future<Output = CliResult<i64>> + Send + 'a>> {
            Box::pin(async move {
                self.calls
                    .lock()
                    .expect("calls")
                    .push(format!("analyze {server_url} {github_url} {requester_id}"));
                Ok(7)
            })
        }

        fn history<'a>(
            &'a self,
            server_url: &'a str,
            requester_id: &'a str,
        ) -> Pin<Box<dyn Future<Output = CliResult<Vec<HistoryRow>>> + Send + 'a>> {
            Box::pin(async move {
                self.calls
                    .lock()
                    .expect("calls")
                    .push(format!("history {server_url} {requester_id}"));
                Ok(self.history.clone())
            })
        }
    }

    fn args(server_url: &str, requester_id: &str) -> ServerArgs {
        ServerArgs {
            server_url: server_url.to_string(),
            requester_id: requester_id.to_string(),
        }
    }

    fn row(id: i64, score: u32) -> HistoryRow {
        HistoryRow {
            repository: RepositorySummary {
                id,
                name: "widgets".to_string(),
                html_url: "https://github.com/octo/widgets".to_string(),
                primary_language: Some("Rust".to_string()),
                public: false,
            },
            latest_result: ResultSummary {
                id: id * 10,
                summary: "Solid project".to_string(),
                total_score: score,
                created_at: "2024-06-01T00:00:00Z".to_string(),
            },
        }
    }

    #[test]
    fn normalize_server_url_trims_trailing_slash() {
        let url = normalize_server_url(" http://localhost:8080/ ").expect("url");
        assert_eq!(url, "http://localhost:8080");
    }

    #[test]
    fn normalize_server_url_rejects_empty() {
        let err = normalize_server_url("   ").unwrap_err();
        assert!(err.to_string().contains("server url"));
    }

    #[tokio::test]
    async fn analyze_normalizes_inputs() {
        let client = RecordingClient::new(Vec::new());
        let id = run_analyze_with(
            &args("http://localhost:8080/", " u1 "),
            " https://github.com/octo/widgets ",
            &client,
        )
        .await
        .expect("analyze");
        assert_eq!(id, 7);
        assert_eq!(
            client.calls(),
            vec!["analyze http://localhost:8080 https://github.com/octo/widgets u1"]
        );
    }

    #[tokio::test]
    async fn analyze_requires_url_and_requester() {
        let client = RecordingClient::new(Vec::new());
        let err = run_analyze_with(&args("http://localhost:8080", "u1"), "  ", &client)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("repository url"));

        let err = run_analyze_with(
            &args("http://localhost:8080", " "),
            "https://github.com/octo/widgets",
            &client,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("requester id"));
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn history_fetches_rows() {
        let client = RecordingClient::new(vec![row(1, 72)]);
        let rows = run_history_with(&args("http://localhost:8080", "u1"), &client)
            .await
            .expect("history");
        assert_eq!(rows, vec![row(1, 72)]);
        assert_eq!(client.calls(), vec!["history http://localhost:8080 u1"]);
    }

    #[test]
    fn history_renders_each_format() {
        let rows = vec![row(1, 72), row(2, 5)];

        let text = render_history(&rows, OutputFormat::Text).expect("text");
        assert!(text.contains(" 72/100  https://github.com/octo/widgets"));
        assert!(text.contains("Solid project"));

        let markdown = render_history(&rows, OutputFormat::Markdown).expect("markdown");
        assert!(markdown.starts_with("# RepoGrade History"));
        assert!(markdown.contains("| [widgets](https://github.com/octo/widgets) | Rust | 72 | no |"));

        let json = render_history(&rows, OutputFormat::Json).expect("json");
        let parsed: Vec<HistoryRow> = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, rows);

        assert_eq!(
            render_history(&[], OutputFormat::Text).expect("empty"),
            "No analyses recorded.\n"
        );
    }

    #[test]
    fn history_rows_ignore_extra_fields() {
        let body = r#"[{
            "repository": {"id": 3, "requester_id": "u1", "name": "demo",
                "html_url": "https://github.com/octo/demo", "description": null,
                "main_branch": "main", "primary_language": null, "public": true,
                "created_at": "2024-06-01T00:00:00Z", "updated_at": "2024-06-01T00:00:00Z"},
            "languages": {"Rust": 10},
            "latest_result": {"id": 4, "repository_id": 3, "summary": "ok",
                "strengths": [], "improvements": [],
                "scores": {"readme": 1, "test": 2, "commit": 3, "cicd": 4},
                "total_score": 10, "created_at": "2024-06-01T00:00:00Z"}
        }]"#;
        let rows: Vec<HistoryRow> = serde_json::from_str(body).expect("parse");
        assert_eq!(rows[0].repository.id, 3);
        assert!(rows[0].repository.public);
        assert_eq!(rows[0].latest_result.total_score, 10);
    }

    #[test]
    fn error_bodies_parse() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"code":"ANALYSIS_IN_PROGRESS","message":"busy"}"#)
                .expect("parse");
        assert_eq!(body.code, "ANALYSIS_IN_PROGRESS");
        assert_eq!(body.message, "busy");
    }
}

#![deny(missing_docs)]
//! RepoGrade command-line interface.
//!
//! Inspects local checkouts offline and talks to the analysis server.

mod server;

use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use repograde_core::{
    ArtifactClassifier, CheckoutReport, StdFileSystem, inspect_checkout, render_checkout_markdown,
    render_checkout_text, render_json,
};
use server::ServerArgs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub(crate) type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "repograde", version, about = "RepoGrade CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
#[command(group(
    ArgGroup::new("source")
        .required(true)
        .multiple(true)
        .args(&["path", "dir"])
))]
struct CheckoutSourceArgs {
    /// Local checkout to inspect (repeatable).
    #[arg(long)]
    path: Vec<PathBuf>,
    /// Directory whose subdirectories are checkouts to inspect.
    #[arg(long)]
    dir: Option<PathBuf>,
    /// Maximum number of checkouts inspected at once.
    #[arg(short = 'j', long, default_value_t = 4)]
    concurrency: usize,
}

#[derive(Args, Clone)]
struct OutputArgs {
    /// Output format for report data.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    /// Write the report to a file instead of stdout.
    #[arg(long = "report-output")]
    report_output: Option<PathBuf>,
}

#[derive(ValueEnum, Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputFormat {
    Text,
    Json,
    Markdown,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify local checkouts without contacting GitHub.
    Inspect {
        #[command(flatten)]
        source: CheckoutSourceArgs,
        #[command(flatten)]
        report: OutputArgs,
    },
    /// Ask the server to analyse a GitHub repository.
    Analyze {
        /// Repository URL, `https://github.com/{owner}/{name}`.
        #[arg(long)]
        url: String,
        #[command(flatten)]
        server: ServerArgs,
    },
    /// List the latest result of every analysed repository.
    History {
        #[command(flatten)]
        server: ServerArgs,
        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[cfg(not(test))]
#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect { source, report } => {
            let targets = resolve_targets(&source).await?;
            run_inspect(targets, source.concurrency, report).await?
        }
        Commands::Analyze { url, server } => server::run_analyze(server, url).await?,
        Commands::History { server, format } => server::run_history(server, format).await?,
    }

    Ok(())
}

#[cfg(test)]
fn main() {}

async fn run_inspect(targets: Vec<PathBuf>, concurrency: usize, report: OutputArgs) -> CliResult<()> {
    if targets.is_empty() {
        println!("No checkouts found to inspect.");
        return Ok(());
    }

    let classifier = Arc::new(ArtifactClassifier::new()?);
    let concurrency = if concurrency == 0 { 1 } else { concurrency };
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut tasks = JoinSet::new();

    for path in targets {
        let permit = semaphore.clone().acquire_owned().await?;
        let classifier = classifier.clone();
        tasks.spawn(async move {
            let _permit = permit;
            inspect_target(path, classifier).await
        });
    }

    let mut reports = Vec::new();
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(report) => reports.push(report),
            Err(err) => reports.push(report_from_task_error(err)),
        }
    }
    reports.sort_by(|left, right| left.path.cmp(&right.path));

    emit_reports(&reports, &report).await
}

async fn resolve_targets(source: &CheckoutSourceArgs) -> CliResult<Vec<PathBuf>> {
    let mut targets = source.path.clone();
    if let Some(dir) = &source.dir {
        targets.extend(load_checkouts_from_dir(dir).await?);
    }
    if targets.is_empty() && source.dir.is_none() {
        return Err("no checkout provided".into());
    }
    Ok(targets)
}

async fn load_checkouts_from_dir(path: &Path) -> CliResult<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(path).await?;
    let mut checkouts = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let file_type = entry.file_type().await?;
        if !file_type.is_dir() {
            continue;
        }
        let entry_path = entry.path();
        if is_hidden_path(&entry_path) {
            continue;
        }
        checkouts.push(entry_path);
    }
    checkouts.sort();
    Ok(checkouts)
}

fn is_hidden_path(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

async fn inspect_target(path: PathBuf, classifier: Arc<ArtifactClassifier>) -> CheckoutReport {
    let source = path.display().to_string();
    if !path.is_dir() {
        let error = format!("path not found: {}", path.display());
        return CheckoutReport::failed(source, path, error);
    }

    let fallback = (source.clone(), path.clone());
    let inspected = tokio::task::spawn_blocking(move || {
        inspect_checkout(&StdFileSystem::new(), &classifier, &source, &path)
    })
    .await;
    match inspected {
        Ok(report) => report,
        Err(err) => CheckoutReport::failed(fallback.0, fallback.1, err.to_string()),
    }
}

fn report_from_task_error(error: tokio::task::JoinError) -> CheckoutReport {
    CheckoutReport::failed("unknown".to_string(), PathBuf::from("."), error.to_string())
}

async fn emit_reports(reports: &[CheckoutReport], output: &OutputArgs) -> CliResult<()> {
    let contents = match output.format {
        OutputFormat::Text => render_checkout_text(reports),
        OutputFormat::Markdown => render_checkout_markdown(reports),
        OutputFormat::Json => render_json(reports)?,
    };
    emit_output(output, contents).await
}

async fn emit_output(output: &OutputArgs, contents: String) -> CliResult<()> {
    if let Some(path) = &output.report_output {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, contents).await?;
    } else {
        print!("{contents}");
    }
    Ok(())
}

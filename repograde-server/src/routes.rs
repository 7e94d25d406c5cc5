//! HTTP handlers for the RepoGrade server.

use std::fmt::Display;
use std::sync::Arc;

use actix_web::http::header;
use actix_web::{HttpResponse, Responder, delete, get, post, web};
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};

use crate::analysis::{AnalysisError, AnalysisService};
use crate::openapi::ApiDoc;
use crate::progress::ProgressHub;
use crate::store::{
    AnalysisResultRecord, AnalysisStore, HistoryEntry, PublishOutcome, RepositoryRecord,
};

#[derive(Clone)]
/// Shared application state for handlers.
pub struct AppState {
    /// Analysis orchestration service.
    pub analysis: AnalysisService,
    /// Store of repositories and results.
    pub store: Arc<dyn AnalysisStore>,
    /// Progress stream registry.
    pub progress: ProgressHub,
}

impl AppState {
    /// State sharing the service's store and progress hub.
    pub fn new(analysis: AnalysisService) -> Self {
        Self {
            store: analysis.store(),
            progress: analysis.progress().clone(),
            analysis,
        }
    }
}

/// Error response payload.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Stable error code.
    pub code: String,
    /// Error message.
    pub message: String,
}

impl ErrorResponse {
    fn new(code: &str, message: impl Display) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

/// Request payload for starting an analysis.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AnalysisRequest {
    /// `https://github.com/{owner}/{name}` URL.
    pub github_url: String,
    /// Requester identifier.
    pub requester_id: String,
}

/// Response payload for a finished analysis.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AnalysisResponse {
    /// Analysed repository.
    pub repository_id: i64,
}

/// Request payload for changing result visibility.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PublishRequest {
    /// Whether results should be public.
    pub public: bool,
}

fn analysis_failure(err: &AnalysisError) -> HttpResponse {
    HttpResponse::build(err.status()).json(ErrorResponse::new(err.code(), err))
}

fn internal_failure(message: impl Display) -> HttpResponse {
    HttpResponse::InternalServerError().json(ErrorResponse::new("INTERNAL_ERROR", message))
}

fn not_found(code: &str, message: impl Display) -> HttpResponse {
    HttpResponse::NotFound().json(ErrorResponse::new(code, message))
}

#[utoipa::path(
    post,
    path = "/analysis",
    request_body = AnalysisRequest,
    responses(
        (status = 200, description = "Analysis finished", body = AnalysisResponse),
        (status = 400, description = "Invalid GitHub URL", body = ErrorResponse),
        (status = 404, description = "Repository not found", body = ErrorResponse),
        (status = 409, description = "Analysis already running", body = ErrorResponse),
        (status = 413, description = "Repository too large", body = ErrorResponse),
        (status = 429, description = "GitHub rate limit exceeded", body = ErrorResponse),
        (status = 500, description = "Analysis failed", body = ErrorResponse)
    ),
    tag = "analysis"
)]
#[post("/api/analysis")]
/// Analyse a repository and store the evaluation.
pub async fn analysis_start(
    state: web::Data<AppState>,
    payload: web::Json<AnalysisRequest>,
) -> impl Responder {
    let AnalysisRequest {
        github_url,
        requester_id,
    } = payload.into_inner();
    let analysis = state.analysis.clone();
    let result = web::block(move || analysis.analyze(&github_url, &requester_id)).await;

    match result {
        Ok(Ok(repository_id)) => HttpResponse::Ok().json(AnalysisResponse { repository_id }),
        Ok(Err(err)) => analysis_failure(&err),
        Err(err) => internal_failure(format!("analysis task failed: {err}")),
    }
}

#[utoipa::path(
    get,
    path = "/analysis/progress/{requester_id}",
    params(
        ("requester_id" = String, Path, description = "Requester identifier")
    ),
    responses(
        (status = 200, description = "Server-sent progress events", content_type = "text/event-stream", body = String)
    ),
    tag = "analysis"
)]
#[get("/api/analysis/progress/{requester_id}")]
/// Stream analysis progress for a requester.
pub async fn analysis_progress(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let stream = state.progress.connect(&path.into_inner());
    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .body(stream)
}

#[utoipa::path(
    get,
    path = "/analysis/user/{requester_id}",
    params(
        ("requester_id" = String, Path, description = "Requester identifier")
    ),
    responses(
        (status = 200, description = "Latest result per repository", body = [HistoryEntry]),
        (status = 500, description = "Store failure", body = ErrorResponse)
    ),
    tag = "analysis"
)]
#[get("/api/analysis/user/{requester_id}")]
/// List the latest result of every repository a requester analysed.
pub async fn analysis_history(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let requester_id = path.into_inner();
    let store = state.store.clone();
    match web::block(move || store.history(&requester_id)).await {
        Ok(Ok(entries)) => HttpResponse::Ok().json(entries),
        Ok(Err(err)) => internal_failure(err),
        Err(err) => internal_failure(err),
    }
}

#[utoipa::path(
    get,
    path = "/repositories/{id}/results",
    params(
        ("id" = i64, Path, description = "Repository identifier")
    ),
    responses(
        (status = 200, description = "Results, newest first", body = [AnalysisResultRecord]),
        (status = 500, description = "Store failure", body = ErrorResponse)
    ),
    tag = "repositories"
)]
#[get("/api/repositories/{id}/results")]
/// List every result of a repository.
pub async fn repository_results(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> impl Responder {
    let repository_id = path.into_inner();
    let store = state.store.clone();
    match web::block(move || store.results_for_repository(repository_id)).await {
        Ok(Ok(results)) => HttpResponse::Ok().json(results),
        Ok(Err(err)) => internal_failure(err),
        Err(err) => internal_failure(err),
    }
}

#[utoipa::path(
    get,
    path = "/repositories/{id}/languages",
    params(
        ("id" = i64, Path, description = "Repository identifier")
    ),
    responses(
        (status = 200, description = "Language byte counts", body = serde_json::Value),
        (status = 404, description = "Unknown repository", body = ErrorResponse)
    ),
    tag = "repositories"
)]
#[get("/api/repositories/{id}/languages")]
/// Language byte counts of a repository.
pub async fn repository_languages(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> impl Responder {
    let repository_id = path.into_inner();
    let store = state.store.clone();
    match web::block(move || store.languages(repository_id)).await {
        Ok(Ok(Some(languages))) => HttpResponse::Ok().json(languages),
        Ok(Ok(None)) => not_found(
            "REPOSITORY_NOT_FOUND",
            format!("repository {repository_id} not found"),
        ),
        Ok(Err(err)) => internal_failure(err),
        Err(err) => internal_failure(err),
    }
}

#[utoipa::path(
    post,
    path = "/repositories/{id}/public",
    params(
        ("id" = i64, Path, description = "Repository identifier")
    ),
    request_body = PublishRequest,
    responses(
        (status = 200, description = "Updated repository", body = RepositoryRecord),
        (status = 404, description = "Unknown repository", body = ErrorResponse),
        (status = 409, description = "Repository has no results", body = ErrorResponse)
    ),
    tag = "repositories"
)]
#[post("/api/repositories/{id}/public")]
/// Publish or unpublish a repository's results.
pub async fn repository_publish(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    payload: web::Json<PublishRequest>,
) -> impl Responder {
    let repository_id = path.into_inner();
    let public = payload.public;
    let store = state.store.clone();
    match web::block(move || store.set_public(repository_id, public)).await {
        Ok(Ok(PublishOutcome::Updated(repository))) => HttpResponse::Ok().json(repository),
        Ok(Ok(PublishOutcome::NotFound)) => not_found(
            "REPOSITORY_NOT_FOUND",
            format!("repository {repository_id} not found"),
        ),
        Ok(Ok(PublishOutcome::NoResults)) => HttpResponse::Conflict().json(ErrorResponse::new(
            "NO_ANALYSIS_RESULTS",
            format!("repository {repository_id} has no analysis results to publish"),
        )),
        Ok(Err(err)) => internal_failure(err),
        Err(err) => internal_failure(err),
    }
}

#[utoipa::path(
    get,
    path = "/results/{id}",
    params(
        ("id" = i64, Path, description = "Result identifier")
    ),
    responses(
        (status = 200, description = "Result with score breakdown", body = AnalysisResultRecord),
        (status = 404, description = "Unknown result", body = ErrorResponse)
    ),
    tag = "results"
)]
#[get("/api/results/{id}")]
/// Fetch a single result.
pub async fn result_detail(state: web::Data<AppState>, path: web::Path<i64>) -> impl Responder {
    let result_id = path.into_inner();
    let store = state.store.clone();
    match web::block(move || store.find_result(result_id)).await {
        Ok(Ok(Some(result))) => HttpResponse::Ok().json(result),
        Ok(Ok(None)) => not_found("RESULT_NOT_FOUND", format!("result {result_id} not found")),
        Ok(Err(err)) => internal_failure(err),
        Err(err) => internal_failure(err),
    }
}

#[utoipa::path(
    delete,
    path = "/results/{id}",
    params(
        ("id" = i64, Path, description = "Result identifier")
    ),
    responses(
        (status = 204, description = "Result deleted"),
        (status = 404, description = "Unknown result", body = ErrorResponse)
    ),
    tag = "results"
)]
#[delete("/api/results/{id}")]
/// Delete a result and its scores.
pub async fn result_delete(state: web::Data<AppState>, path: web::Path<i64>) -> impl Responder {
    let result_id = path.into_inner();
    let store = state.store.clone();
    match web::block(move || store.delete_result(result_id)).await {
        Ok(Ok(true)) => HttpResponse::NoContent().finish(),
        Ok(Ok(false)) => not_found("RESULT_NOT_FOUND", format!("result {result_id} not found")),
        Ok(Err(err)) => internal_failure(err),
        Err(err) => internal_failure(err),
    }
}

#[utoipa::path(
    get,
    path = "/openapi.json",
    responses(
        (status = 200, description = "OpenAPI document", body = serde_json::Value)
    ),
    tag = "system"
)]
#[get("/api/openapi.json")]
/// Serve the OpenAPI document.
pub async fn openapi_json() -> impl Responder {
    HttpResponse::Ok().json(ApiDoc::openapi())
}

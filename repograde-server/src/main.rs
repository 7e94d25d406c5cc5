#![deny(missing_docs)]
//! RepoGrade server executable.
//!
//! Hosts HTTP endpoints that analyse GitHub repositories and serve the
//! stored evaluations.

mod aggregator;
mod analysis;
mod db;
mod gateway;
mod github;
mod lock;
mod models;
mod openapi;
mod progress;
mod retry;
mod routes;
mod schema;
mod store;
#[cfg(test)]
mod test_support;

#[cfg(not(test))]
use actix_cors::Cors;
#[cfg(not(test))]
use actix_web::{App, HttpServer, http::header, web};
#[cfg(not(test))]
use dotenvy::dotenv;

#[allow(unused_imports)]
use std::str::FromStr;

#[cfg(not(test))]
use std::sync::Arc;

#[cfg(not(test))]
use crate::analysis::AnalysisService;
#[cfg(not(test))]
use crate::lock::{AnalysisLock, InMemoryLock, spawn_sweeper, sweep_interval_from_env};
#[cfg(not(test))]
use crate::progress::ProgressHub;
#[cfg(not(test))]
use crate::routes::{
    AppState, analysis_history, analysis_progress, analysis_start, openapi_json,
    repository_languages, repository_publish, repository_results, result_delete, result_detail,
};

#[cfg(not(test))]
fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Blocking reqwest clients must be built before the Actix runtime starts.
    let lock: Arc<dyn AnalysisLock> = Arc::new(InMemoryLock::from_env());
    let _sweeper = spawn_sweeper(&lock, sweep_interval_from_env())?;
    let analysis = AnalysisService::from_env(lock, ProgressHub::from_env())?;
    let state = web::Data::new(AppState::new(analysis));

    let origins = std::env::var("REPOGRADE_UI_ORIGINS")
        .unwrap_or_else(|_| "http://127.0.0.1:3000,http://localhost:3000".to_string());
    let allowed_origins: Vec<String> = origins
        .split(',')
        .map(|value| value.trim())
        .filter(|origin| !origin.is_empty())
        .map(String::from)
        .collect();

    let listen_addr = std::env::var("REPOGRADE_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let listen_port =
        u16::from_str(&std::env::var("REPOGRADE_PORT").unwrap_or_else(|_| "8080".to_string()))
            .map_err(|err| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("REPOGRADE_PORT must be a u16 number: {err}"),
                )
            })?;
    log::info!("listening on {listen_addr}:{listen_port}");

    actix_web::rt::System::new().block_on(async move {
        HttpServer::new(move || {
            let mut cors = Cors::default()
                .allowed_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
                .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
                .max_age(3600);
            for origin in &allowed_origins {
                cors = cors.allowed_origin(origin);
            }
            App::new()
                .wrap(actix_web::middleware::Logger::default())
                .wrap(cors)
                .app_data(state.clone())
                .service(analysis_start)
                .service(analysis_progress)
                .service(analysis_history)
                .service(repository_results)
                .service(repository_languages)
                .service(repository_publish)
                .service(result_detail)
                .service(result_delete)
                .service(openapi_json)
        })
        .bind((listen_addr, listen_port))?
        .run()
        .await
    })
}

#[cfg(test)]
fn main() {}

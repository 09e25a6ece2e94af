#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the survey map application.
//!
//! Exposes the survey's record operations as a small REST API under
//! `/api`: submitting responses, listing them, deleting selected rows or
//! all of them, CSV download and the data for the clustered map.

mod handlers;
pub mod interactive;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use survey_map_survey::SurveyService;

/// Shared application state.
pub struct AppState {
    /// Record operations over the configured worksheet.
    pub survey: SurveyService,
}

/// Registers the `/api` routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route("/categories", web::get().to(handlers::categories))
            .route("/records", web::get().to(handlers::list_records))
            .route("/records", web::post().to(handlers::submit_record))
            .route("/records", web::delete().to(handlers::delete_records))
            .route("/records/all", web::delete().to(handlers::clear_records))
            .route("/records.csv", web::get().to(handlers::export_csv))
            .route("/map", web::get().to(handlers::map_view)),
    );
}

/// Starts the survey API server.
///
/// Opens the store selected by the environment and serves the API on
/// `BIND_ADDR`:`PORT` (default `127.0.0.1:8080`). The caller provides the
/// async runtime and initializes logging.
///
/// # Errors
///
/// Returns an `std::io::Result` error if the store is misconfigured, the
/// HTTP server fails to bind, or it encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    log::info!("Opening survey store...");
    let survey = SurveyService::from_env().map_err(std::io::Error::other)?;

    let state = web::Data::new(AppState { survey });

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((bind_addr, port))?
    .run()
    .await
}

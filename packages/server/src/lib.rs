#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the GeoNames import pipeline.
//!
//! Exposes the batch entry point (`POST /api/import`) and the import
//! state accessor (`GET /api/import/state`) consumed by the batch driver.
//! When `IMPORT_INTERVAL_SECS` is set, a background task periodically
//! replays any recorded failed offsets and then starts a new offset-0
//! batch with default options.

mod handlers;

use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use geonames_import_database::db;
use geonames_import_source::{DatasetFetcher, HttpDatasetFetcher};
use switchy_database::Database;

/// Shared application state.
pub struct AppState {
    /// Database connection.
    pub db: Arc<dyn Database>,
    /// Dataset fetcher used by batch invocations.
    pub fetcher: Arc<dyn DatasetFetcher>,
}

/// Starts the import API server.
///
/// Opens the `SQLite` database, builds the HTTP dataset fetcher, spawns
/// the scheduled import task (when configured), and starts the Actix-Web
/// HTTP server. This is a regular async function — the caller is
/// responsible for providing the async runtime (e.g. via
/// `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the HTTP server fails to bind or
/// encounters a runtime error.
///
/// # Panics
///
/// Panics if the database cannot be opened or the HTTP client cannot be
/// built.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    log::info!("Opening database...");
    let db_conn = db::open_from_env().await.expect("Failed to open database");

    let client = reqwest::Client::builder()
        .user_agent("geonames-import/1.0 (https://github.com/BSteffaniak/geonames-import)")
        .build()
        .expect("Failed to build HTTP client");

    let db: Arc<dyn Database> = Arc::from(db_conn);
    let fetcher: Arc<dyn DatasetFetcher> = Arc::new(HttpDatasetFetcher::new(client));

    spawn_scheduler(db.clone(), fetcher.clone());

    let state = web::Data::new(AppState {
        db,
        fetcher,
    });

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
            .service(
                web::scope("/api")
                    .route("/health", web::get().to(handlers::health))
                    .route("/import", web::post().to(handlers::run_import))
                    .route("/import/state", web::get().to(handlers::import_state)),
            )
    })
    .bind((bind_addr, port))?
    .run()
    .await
}

/// Spawns the scheduled import task when `IMPORT_INTERVAL_SECS` is set to
/// a non-zero value.
fn spawn_scheduler(db: Arc<dyn Database>, fetcher: Arc<dyn DatasetFetcher>) {
    let Some(secs) = std::env::var("IMPORT_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
    else {
        log::info!("IMPORT_INTERVAL_SECS not set, scheduled imports disabled");
        return;
    };

    log::info!("Scheduled imports enabled every {secs}s");

    actix_web::rt::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(secs));
        // The first tick fires immediately; consume it so the first pass
        // runs one full interval after startup.
        interval.tick().await;

        loop {
            interval.tick().await;

            log::info!("Scheduled import pass starting");
            if let Err(e) =
                geonames_import_ingest::run_scheduled_pass(db.as_ref(), fetcher.as_ref()).await
            {
                log::error!("Scheduled import pass failed: {e}");
            }
        }
    });
}

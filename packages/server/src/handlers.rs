//! HTTP handler functions for the import API.

use actix_web::{HttpResponse, web};
use geonames_import_ingest::ImportError;
use geonames_import_models::BatchOptions;

use crate::AppState;

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "healthy": true,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `POST /api/import`
///
/// Runs one import batch with the supplied options; unspecified fields
/// take the documented defaults. Responds with the batch summary, or a
/// structured error payload when the batch was rejected or could not run.
pub async fn run_import(
    state: web::Data<AppState>,
    options: web::Json<BatchOptions>,
) -> HttpResponse {
    let options = options.into_inner();

    match geonames_import_ingest::run_batch(
        state.db.as_ref(),
        state.fetcher.as_ref(),
        &options,
    )
    .await
    {
        Ok(summary) => HttpResponse::Ok().json(summary),
        Err(e @ ImportError::Validation { .. }) => {
            HttpResponse::BadRequest().json(serde_json::json!({ "error": e.to_string() }))
        }
        Err(e) => {
            log::error!("Import batch at offset {} failed: {e}", options.offset);
            HttpResponse::InternalServerError().json(serde_json::json!({ "error": e.to_string() }))
        }
    }
}

/// `GET /api/import/state`
///
/// Returns the persisted import state of the current (or most recent)
/// lineage.
pub async fn import_state(state: web::Data<AppState>) -> HttpResponse {
    match geonames_import_ingest::get_import_state(state.db.as_ref()).await {
        Ok(Some(import_state)) => HttpResponse::Ok().json(import_state),
        Ok(None) => HttpResponse::NotFound()
            .json(serde_json::json!({ "error": "no import has been started" })),
        Err(e) => {
            log::error!("Failed to read import state: {e}");
            HttpResponse::InternalServerError().json(serde_json::json!({ "error": e.to_string() }))
        }
    }
}

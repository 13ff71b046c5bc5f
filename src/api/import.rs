use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::importer::host::{spawn_import, CalibreImportRequest};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/Calibre", post(start_calibre_import))
        .route("/Calibre", get(get_import_status))
        .route("/Calibre", delete(cancel_calibre_import))
}

#[derive(Debug, Deserialize)]
pub struct StartImportBody {
    pub source_db_path: Option<PathBuf>,
    pub library_root_path: Option<PathBuf>,
    pub library_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ImportStatus {
    pub running: bool,
}

/// POST /Import/Calibre - start a Calibre import in the background.
///
/// All three parameters are required; a request missing any of them is
/// rejected before anything is spawned.
async fn start_calibre_import(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartImportBody>,
) -> Result<StatusCode, (StatusCode, String)> {
    let (Some(source_db), Some(library_root), Some(library_id)) =
        (body.source_db_path, body.library_root_path, body.library_id)
    else {
        return Err((
            StatusCode::BAD_REQUEST,
            "source_db_path, library_root_path and library_id are required".to_string(),
        ));
    };

    let mut job = state.import_job.lock().await;
    if job.as_ref().is_some_and(|running| !running.is_finished()) {
        return Err((
            StatusCode::CONFLICT,
            "An import is already running".to_string(),
        ));
    }

    tracing::info!("Calibre import requested for library '{}'", library_id);

    let request = CalibreImportRequest {
        source_db,
        library_root,
        library_id,
    };
    *job = Some(spawn_import(state.db.clone(), request));

    Ok(StatusCode::NO_CONTENT)
}

/// GET /Import/Calibre - whether an import is currently running.
async fn get_import_status(State(state): State<Arc<AppState>>) -> Json<ImportStatus> {
    let job = state.import_job.lock().await;
    Json(ImportStatus {
        running: job.as_ref().is_some_and(|running| !running.is_finished()),
    })
}

/// DELETE /Import/Calibre - cancel the running import, if any.
async fn cancel_calibre_import(
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, (StatusCode, String)> {
    let job = state.import_job.lock().await;
    match job.as_ref() {
        Some(running) if !running.is_finished() => {
            running.cancel();
            Ok(StatusCode::NO_CONTENT)
        }
        _ => Err((StatusCode::NOT_FOUND, "No import is running".to_string())),
    }
}

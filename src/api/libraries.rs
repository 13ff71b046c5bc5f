use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    models::{Library, MediaItem},
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_libraries))
        .route("/", post(create_library))
        .route("/:library_id", delete(delete_library))
        .route("/:library_id/Items", get(get_library_items))
}

async fn get_libraries(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Library>>, (StatusCode, String)> {
    let libraries: Vec<Library> = sqlx::query_as("SELECT * FROM libraries ORDER BY name")
        .fetch_all(&state.db)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(libraries))
}

#[derive(Debug, Deserialize)]
pub struct CreateLibraryBody {
    pub name: String,
    pub path: String,
    pub library_type: String,
}

async fn create_library(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateLibraryBody>,
) -> Result<(StatusCode, Json<Library>), (StatusCode, String)> {
    let id = Uuid::new_v4().to_string();

    sqlx::query("INSERT INTO libraries (id, name, path, library_type) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(&body.name)
        .bind(&body.path)
        .bind(&body.library_type)
        .execute(&state.db)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    tracing::info!("Created library '{}' at path '{}'", body.name, body.path);

    let library: Library = sqlx::query_as("SELECT * FROM libraries WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok((StatusCode::CREATED, Json(library)))
}

async fn delete_library(
    State(state): State<Arc<AppState>>,
    Path(library_id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let result = sqlx::query("DELETE FROM libraries WHERE id = ?")
        .bind(&library_id)
        .execute(&state.db)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    if result.rows_affected() == 0 {
        return Err((StatusCode::NOT_FOUND, "Library not found".to_string()));
    }

    tracing::info!("Deleted library '{}'", library_id);

    Ok(StatusCode::NO_CONTENT)
}

async fn get_library_items(
    State(state): State<Arc<AppState>>,
    Path(library_id): Path<String>,
) -> Result<Json<Vec<MediaItem>>, (StatusCode, String)> {
    let items: Vec<MediaItem> =
        sqlx::query_as("SELECT * FROM media_items WHERE library_id = ? ORDER BY date_added DESC")
            .bind(&library_id)
            .fetch_all(&state.db)
            .await
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(items))
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::{
    models::{MediaItem, MetadataCommon},
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:item_id", get(get_item))
        .route("/:item_id/People", get(get_item_people))
}

#[derive(Debug, Serialize)]
pub struct ItemDetails {
    pub item: MediaItem,
    pub metadata: Option<MetadataCommon>,
}

/// A person credited on an item, with their role on that item.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct CreditedPerson {
    pub id: String,
    pub name: String,
    pub sort_name: Option<String>,
    pub role: String,
}

async fn get_item(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<String>,
) -> Result<Json<ItemDetails>, (StatusCode, String)> {
    let item: Option<MediaItem> = sqlx::query_as("SELECT * FROM media_items WHERE id = ?")
        .bind(&item_id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let Some(item) = item else {
        return Err((StatusCode::NOT_FOUND, "Item not found".to_string()));
    };

    let metadata: Option<MetadataCommon> =
        sqlx::query_as("SELECT * FROM metadata_common WHERE item_id = ?")
            .bind(&item_id)
            .fetch_optional(&state.db)
            .await
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(ItemDetails { item, metadata }))
}

async fn get_item_people(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<String>,
) -> Result<Json<Vec<CreditedPerson>>, (StatusCode, String)> {
    let people: Vec<CreditedPerson> = sqlx::query_as(
        r#"SELECT p.id, p.name, p.sort_name, ip.role
           FROM people p
           JOIN item_people ip ON ip.person_id = p.id
           WHERE ip.item_id = ?
           ORDER BY ip.role, ip.sort_order, p.name"#,
    )
    .bind(&item_id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(people))
}

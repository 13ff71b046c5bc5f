use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::{db, models::Notification, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(get_notifications))
}

#[derive(Debug, Deserialize)]
pub struct NotificationsQuery {
    pub limit: Option<i64>,
}

async fn get_notifications(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NotificationsQuery>,
) -> Result<Json<Vec<Notification>>, (StatusCode, String)> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);

    db::recent_notifications(&state.db, limit)
        .await
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

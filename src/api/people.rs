use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use std::sync::Arc;

use crate::{models::Person, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(get_people))
}

async fn get_people(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Person>>, (StatusCode, String)> {
    let people: Vec<Person> = sqlx::query_as("SELECT * FROM people ORDER BY sort_name, name")
        .fetch_all(&state.db)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(people))
}

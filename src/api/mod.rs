use axum::Router;
use std::sync::Arc;

use crate::AppState;

mod import;
mod items;
mod libraries;
mod notifications;
mod people;
mod system;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/System", system::routes())
        .nest("/Libraries", libraries::routes())
        .nest("/Items", items::routes())
        .nest("/People", people::routes())
        .nest("/Import", import::routes())
        .nest("/Notifications", notifications::routes())
}

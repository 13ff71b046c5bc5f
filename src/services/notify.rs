//! Best-effort user-visible notifications.
//!
//! Notifications are (title, message) pairs persisted to the notifications
//! table and surfaced through the API. Failures to record one are logged and
//! otherwise ignored; no caller depends on delivery.

use sqlx::SqlitePool;

use crate::db;

pub async fn publish(pool: &SqlitePool, title: &str, message: &str) {
    tracing::info!("{}: {}", title, message);

    if let Err(e) = db::push_notification(pool, title, message).await {
        tracing::warn!("Failed to record notification '{}': {}", title, e);
    }
}

use anyhow::Result;
use sqlx::SqlitePool;

use crate::models::Notification;

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS libraries (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            path TEXT NOT NULL,
            library_type TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS media_items (
            id TEXT PRIMARY KEY,
            library_id TEXT NOT NULL REFERENCES libraries(id) ON DELETE CASCADE,
            item_type TEXT NOT NULL,
            path TEXT,
            content_hash TEXT,
            date_added TEXT NOT NULL,
            last_scanned_at TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        -- Metadata shared by every media type (books, movies, music, ...)
        CREATE TABLE IF NOT EXISTS metadata_common (
            item_id TEXT PRIMARY KEY REFERENCES media_items(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            sort_title TEXT,
            year INTEGER,
            release_date TEXT,
            rating REAL,
            summary TEXT,
            cover_path TEXT
        );

        -- People (authors, narrators, directors, ...)
        CREATE TABLE IF NOT EXISTS people (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            sort_name TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        -- Many-to-many relationship between items and people
        CREATE TABLE IF NOT EXISTS item_people (
            item_id TEXT NOT NULL REFERENCES media_items(id) ON DELETE CASCADE,
            person_id TEXT NOT NULL REFERENCES people(id) ON DELETE CASCADE,
            role TEXT NOT NULL,
            sort_order INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (item_id, person_id, role)
        );

        -- Best-effort user-visible notifications (import progress, failures)
        CREATE TABLE IF NOT EXISTS notifications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    )
    .execute(pool)
    .await?;

    create_indexes(pool).await?;

    Ok(())
}

/// Create all database indexes for the hot lookup paths
async fn create_indexes(pool: &SqlitePool) -> Result<()> {
    let indexes = [
        // Library browsing: filter by library
        "CREATE INDEX IF NOT EXISTS idx_media_items_library ON media_items(library_id)",
        // Filter by type (Book, Movie, ...)
        "CREATE INDEX IF NOT EXISTS idx_media_items_type ON media_items(item_type)",
        // Already-imported check during library imports
        "CREATE INDEX IF NOT EXISTS idx_media_items_library_path ON media_items(library_id, path)",
        // Find library by path (for auto-creation check)
        "CREATE INDEX IF NOT EXISTS idx_libraries_path ON libraries(path)",
        // Find people by name (find-or-create)
        "CREATE INDEX IF NOT EXISTS idx_people_name ON people(name)",
        // Find people for an item
        "CREATE INDEX IF NOT EXISTS idx_item_people_item ON item_people(item_id)",
        // Find items featuring a person
        "CREATE INDEX IF NOT EXISTS idx_item_people_person ON item_people(person_id)",
        // Notification feed, newest first
        "CREATE INDEX IF NOT EXISTS idx_notifications_created ON notifications(created_at)",
    ];

    for index_sql in indexes {
        if let Err(e) = sqlx::query(index_sql).execute(pool).await {
            tracing::warn!("Failed to create index: {} - {}", index_sql, e);
        }
    }

    tracing::debug!("Database indexes created/verified");

    Ok(())
}

/// Find the media item already stored for a file path within a library.
pub async fn find_item_by_path(
    pool: &SqlitePool,
    library_id: &str,
    path: &str,
) -> Result<Option<String>, sqlx::Error> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT id FROM media_items WHERE library_id = ? AND path = ?")
            .bind(library_id)
            .bind(path)
            .fetch_optional(pool)
            .await?;

    Ok(row.map(|(id,)| id))
}

/// Helper to insert or get a person ID, deduplicated by exact name
pub async fn get_or_create_person(
    pool: &SqlitePool,
    name: &str,
    sort_name: &str,
) -> Result<String, sqlx::Error> {
    let id = uuid::Uuid::new_v4().to_string();

    // Try to insert, ignore if a person with this name exists
    sqlx::query("INSERT OR IGNORE INTO people (id, name, sort_name) VALUES (?, ?, ?)")
        .bind(&id)
        .bind(name)
        .bind(sort_name)
        .execute(pool)
        .await?;

    // Get the actual ID (might be different if it already existed)
    let result: (String,) = sqlx::query_as("SELECT id FROM people WHERE name = ?")
        .bind(name)
        .fetch_one(pool)
        .await?;

    Ok(result.0)
}

/// Helper to link an item to a person under a role (AUTHOR, NARRATOR, ...)
pub async fn link_item_person(
    pool: &SqlitePool,
    item_id: &str,
    person_id: &str,
    role: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT OR IGNORE INTO item_people (item_id, person_id, role) VALUES (?, ?, ?)")
        .bind(item_id)
        .bind(person_id)
        .bind(role)
        .execute(pool)
        .await?;
    Ok(())
}

/// Record a (title, message) notification
pub async fn push_notification(
    pool: &SqlitePool,
    title: &str,
    message: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO notifications (title, message) VALUES (?, ?)")
        .bind(title)
        .bind(message)
        .execute(pool)
        .await?;
    Ok(())
}

/// Get the most recent notifications, newest first
pub async fn recent_notifications(
    pool: &SqlitePool,
    limit: i64,
) -> Result<Vec<Notification>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id, title, message, created_at FROM notifications ORDER BY id DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

//! Calibre library import pipeline.
//!
//! An import reads every book from a Calibre `metadata.db`, resolves each
//! book's file under the library root, normalizes its bibliographic fields
//! and writes media item + metadata + author rows into our own schema. Books
//! whose file cannot be found are skipped; books already present (same
//! resolved path in the same library) are skipped so re-imports are
//! idempotent. A persistence failure aborts the rest of the run — books
//! written so far stay committed.

use anyhow::Result;
use chrono::Utc;
use sqlx::SqlitePool;
use std::path::Path;
use uuid::Uuid;

pub mod host;
pub mod normalize;
pub mod resolve;
pub mod source;

use crate::db;
use normalize::{clean_author_name, clean_title, create_sort_title};

/// What happened to one source book during an import run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported { item_id: String },
    /// The recorded path resolved to nothing, or the file does not exist.
    SkippedMissingFile,
    /// A media item with the same resolved path already exists in the library.
    SkippedExisting,
}

/// Per-book outcomes of one import run, in processing order.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub outcomes: Vec<(i64, ImportOutcome)>,
}

impl ImportReport {
    pub fn imported(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, ImportOutcome::Imported { .. }))
            .count()
    }

    pub fn skipped_missing(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == ImportOutcome::SkippedMissingFile)
            .count()
    }

    pub fn skipped_existing(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == ImportOutcome::SkippedExisting)
            .count()
    }
}

/// Import every book from a Calibre library into the destination library.
///
/// Books are processed one after another in source id order. Writes for a
/// single book happen in a fixed order (media item, common metadata, person,
/// author link) and are not wrapped in a cross-book transaction.
pub async fn import_calibre_library(
    pool: &SqlitePool,
    source_db: &Path,
    library_root: &Path,
    library_id: &str,
) -> Result<ImportReport> {
    tracing::info!(
        "Importing Calibre library {} into library '{}'",
        source_db.display(),
        library_id
    );

    let books = source::read_source_books(source_db).await;
    let mut report = ImportReport::default();

    for (book_id, book) in &books {
        let resolved = match resolve::resolve_book_file(library_root, &book.relative_path) {
            Some(path) if path.exists() => path,
            _ => {
                tracing::debug!("No book file for '{}', skipping", book.title);
                report
                    .outcomes
                    .push((*book_id, ImportOutcome::SkippedMissingFile));
                continue;
            }
        };
        let path_str = resolved.to_string_lossy().to_string();

        if let Some(existing) = db::find_item_by_path(pool, library_id, &path_str).await? {
            tracing::debug!(
                "'{}' already imported as item {}, skipping",
                book.title,
                existing
            );
            report
                .outcomes
                .push((*book_id, ImportOutcome::SkippedExisting));
            continue;
        }

        let title = clean_title(&book.title);
        let sort_title = create_sort_title(&title);
        let author_raw = book
            .author_names
            .first()
            .map(String::as_str)
            .unwrap_or("Unknown");
        let author = clean_author_name(author_raw);

        let item_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"INSERT INTO media_items (id, library_id, item_type, path, date_added, last_scanned_at)
               VALUES (?, ?, 'Book', ?, ?, ?)"#,
        )
        .bind(&item_id)
        .bind(library_id)
        .bind(&path_str)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await?;

        sqlx::query("INSERT INTO metadata_common (item_id, title, sort_title) VALUES (?, ?, ?)")
            .bind(&item_id)
            .bind(&title)
            .bind(&sort_title)
            .execute(pool)
            .await?;

        let person_id = db::get_or_create_person(pool, &author.display_name, &author.sort_key).await?;
        db::link_item_person(pool, &item_id, &person_id, "AUTHOR").await?;

        match &book.series_name {
            Some(series) => tracing::debug!(
                "Imported '{}' by {} (series '{}', {} tags)",
                title,
                author.display_name,
                series,
                book.tags.len()
            ),
            None => tracing::debug!(
                "Imported '{}' by {} ({} tags)",
                title,
                author.display_name,
                book.tags.len()
            ),
        }
        report
            .outcomes
            .push((*book_id, ImportOutcome::Imported { item_id }));
    }

    tracing::info!(
        "Calibre import complete: {} imported, {} missing files, {} already present",
        report.imported(),
        report.skipped_missing(),
        report.skipped_existing()
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use sqlx::{Connection, SqliteConnection};
    use std::fs::File;
    use std::path::PathBuf;
    use tempfile::TempDir;

    async fn dest_pool(library_id: &str, library_root: &Path) -> SqlitePool {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        db::migrate(&pool).await.unwrap();

        sqlx::query("INSERT INTO libraries (id, name, path, library_type) VALUES (?, ?, ?, 'books')")
            .bind(library_id)
            .bind("Test Library")
            .bind(library_root.to_str().unwrap())
            .execute(&pool)
            .await
            .unwrap();

        pool
    }

    struct CalibreFixture {
        conn: SqliteConnection,
    }

    impl CalibreFixture {
        async fn create(db_path: &Path) -> Self {
            let options = SqliteConnectOptions::new()
                .filename(db_path)
                .create_if_missing(true);
            let mut conn = SqliteConnection::connect_with(&options).await.unwrap();

            sqlx::query(
                r#"
                CREATE TABLE books (
                    id INTEGER PRIMARY KEY,
                    title TEXT NOT NULL,
                    path TEXT NOT NULL,
                    series_index REAL
                );
                CREATE TABLE authors (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
                CREATE TABLE books_authors_link (
                    id INTEGER PRIMARY KEY,
                    book INTEGER NOT NULL,
                    author INTEGER NOT NULL
                );
                CREATE TABLE series (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
                CREATE TABLE books_series_link (
                    id INTEGER PRIMARY KEY,
                    book INTEGER NOT NULL,
                    series INTEGER NOT NULL
                );
                CREATE TABLE publishers (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
                CREATE TABLE books_publishers_link (
                    id INTEGER PRIMARY KEY,
                    book INTEGER NOT NULL,
                    publisher INTEGER NOT NULL
                );
                CREATE TABLE identifiers (
                    id INTEGER PRIMARY KEY,
                    book INTEGER NOT NULL,
                    type TEXT NOT NULL,
                    val TEXT NOT NULL
                );
                CREATE TABLE tags (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
                CREATE TABLE books_tags_link (
                    id INTEGER PRIMARY KEY,
                    book INTEGER NOT NULL,
                    tag INTEGER NOT NULL
                );
                CREATE TABLE comments (id INTEGER PRIMARY KEY, book INTEGER NOT NULL, text TEXT NOT NULL);
                "#,
            )
            .execute(&mut conn)
            .await
            .unwrap();

            Self { conn }
        }

        async fn add_book(&mut self, id: i64, title: &str, path: &str) {
            sqlx::query("INSERT INTO books (id, title, path) VALUES (?, ?, ?)")
                .bind(id)
                .bind(title)
                .bind(path)
                .execute(&mut self.conn)
                .await
                .unwrap();
        }

        async fn add_author(&mut self, book_id: i64, author_id: i64, name: &str) {
            sqlx::query("INSERT OR IGNORE INTO authors (id, name) VALUES (?, ?)")
                .bind(author_id)
                .bind(name)
                .execute(&mut self.conn)
                .await
                .unwrap();
            sqlx::query("INSERT INTO books_authors_link (book, author) VALUES (?, ?)")
                .bind(book_id)
                .bind(author_id)
                .execute(&mut self.conn)
                .await
                .unwrap();
        }

        async fn add_tag(&mut self, book_id: i64, tag_id: i64, name: &str) {
            sqlx::query("INSERT OR IGNORE INTO tags (id, name) VALUES (?, ?)")
                .bind(tag_id)
                .bind(name)
                .execute(&mut self.conn)
                .await
                .unwrap();
            sqlx::query("INSERT INTO books_tags_link (book, tag) VALUES (?, ?)")
                .bind(book_id)
                .bind(tag_id)
                .execute(&mut self.conn)
                .await
                .unwrap();
        }

        async fn close(self) {
            self.conn.close().await.unwrap();
        }
    }

    /// Library root with one real book folder (epub + cover) for book 1.
    fn book_dir_with_epub(root: &Path, rel: &str, epub: &str) -> PathBuf {
        let dir = root.join(rel);
        std::fs::create_dir_all(&dir).unwrap();
        File::create(dir.join(epub)).unwrap();
        File::create(dir.join("cover.jpg")).unwrap();
        dir.join(epub)
    }

    async fn two_book_fixture(dir: &TempDir) -> (PathBuf, PathBuf) {
        let library_root = dir.path().join("library");
        std::fs::create_dir_all(&library_root).unwrap();
        book_dir_with_epub(&library_root, "Tolkien/The Hobbit (1)", "hobbit.epub");

        let db_path = dir.path().join("metadata.db");
        let mut fixture = CalibreFixture::create(&db_path).await;
        fixture
            .add_book(1, "the hobbit", "Tolkien/The Hobbit (1)")
            .await;
        fixture.add_author(1, 1, "Tolkien, J.R.R.").await;
        fixture.add_book(2, "ghost book", "Nobody/Ghost (2)").await;
        fixture.close().await;

        (db_path, library_root)
    }

    #[tokio::test]
    async fn test_import_two_books_one_missing() {
        let dir = tempfile::tempdir().unwrap();
        let (db_path, library_root) = two_book_fixture(&dir).await;
        let pool = dest_pool("lib-1", &library_root).await;

        let report = import_calibre_library(&pool, &db_path, &library_root, "lib-1")
            .await
            .unwrap();

        assert_eq!(report.imported(), 1);
        assert_eq!(report.skipped_missing(), 1);
        assert_eq!(report.outcomes[0].0, 1);
        assert_eq!(report.outcomes[1], (2, ImportOutcome::SkippedMissingFile));

        let items: Vec<(String, String)> =
            sqlx::query_as("SELECT id, path FROM media_items WHERE library_id = 'lib-1'")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].1.ends_with("hobbit.epub"));

        let metadata: (String, String) =
            sqlx::query_as("SELECT title, sort_title FROM metadata_common WHERE item_id = ?")
                .bind(&items[0].0)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(metadata.0, "The Hobbit");
        assert_eq!(metadata.1, "Hobbit, The");

        let people: Vec<(String, String)> = sqlx::query_as("SELECT name, sort_name FROM people")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].0, "J.R.R. Tolkien");
        assert_eq!(people[0].1, "Tolkien, J.R.R.");

        let roles: Vec<(String,)> =
            sqlx::query_as("SELECT role FROM item_people WHERE item_id = ?")
                .bind(&items[0].0)
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(roles, vec![("AUTHOR".to_string(),)]);
    }

    #[tokio::test]
    async fn test_missing_file_does_not_halt_later_books() {
        let dir = tempfile::tempdir().unwrap();
        let library_root = dir.path().join("library");
        std::fs::create_dir_all(&library_root).unwrap();
        book_dir_with_epub(&library_root, "A/First (1)", "first.epub");
        book_dir_with_epub(&library_root, "C/Third (3)", "third.epub");

        let db_path = dir.path().join("metadata.db");
        let mut fixture = CalibreFixture::create(&db_path).await;
        fixture.add_book(1, "first", "A/First (1)").await;
        fixture.add_book(2, "second", "B/Missing (2)").await;
        fixture.add_book(3, "third", "C/Third (3)").await;
        fixture.close().await;

        let pool = dest_pool("lib-1", &library_root).await;
        let report = import_calibre_library(&pool, &db_path, &library_root, "lib-1")
            .await
            .unwrap();

        assert_eq!(report.imported(), 2);
        assert_eq!(report.skipped_missing(), 1);
        assert_eq!(report.outcomes[1], (2, ImportOutcome::SkippedMissingFile));
    }

    #[tokio::test]
    async fn test_reimport_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (db_path, library_root) = two_book_fixture(&dir).await;
        let pool = dest_pool("lib-1", &library_root).await;

        let first = import_calibre_library(&pool, &db_path, &library_root, "lib-1")
            .await
            .unwrap();
        assert_eq!(first.imported(), 1);

        let second = import_calibre_library(&pool, &db_path, &library_root, "lib-1")
            .await
            .unwrap();
        assert_eq!(second.imported(), 0);
        assert_eq!(second.skipped_existing(), 1);
        assert_eq!(second.skipped_missing(), 1);

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM media_items")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn test_fan_out_produces_single_item_with_all_authors_read() {
        let dir = tempfile::tempdir().unwrap();
        let library_root = dir.path().join("library");
        std::fs::create_dir_all(&library_root).unwrap();
        book_dir_with_epub(&library_root, "Pratchett/Good Omens (1)", "omens.epub");

        let db_path = dir.path().join("metadata.db");
        let mut fixture = CalibreFixture::create(&db_path).await;
        fixture
            .add_book(1, "good omens", "Pratchett/Good Omens (1)")
            .await;
        fixture.add_author(1, 1, "Pratchett, Terry").await;
        fixture.add_author(1, 2, "Gaiman, Neil").await;
        fixture.add_tag(1, 1, "fantasy").await;
        fixture.add_tag(1, 2, "humour").await;
        fixture.close().await;

        let books = source::read_source_books(&db_path).await;
        assert_eq!(books.len(), 1);
        assert_eq!(
            books[&1].author_names,
            vec!["Pratchett, Terry", "Gaiman, Neil"]
        );
        assert_eq!(books[&1].tags.len(), 2);

        // Only the first author becomes the item's AUTHOR link.
        let pool = dest_pool("lib-1", &library_root).await;
        import_calibre_library(&pool, &db_path, &library_root, "lib-1")
            .await
            .unwrap();

        let people: Vec<(String,)> = sqlx::query_as("SELECT name FROM people")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(people, vec![("Terry Pratchett".to_string(),)]);
    }

    #[tokio::test]
    async fn test_unreadable_source_imports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let library_root = dir.path().join("library");
        std::fs::create_dir_all(&library_root).unwrap();
        let pool = dest_pool("lib-1", &library_root).await;

        let report = import_calibre_library(
            &pool,
            &dir.path().join("does-not-exist.db"),
            &library_root,
            "lib-1",
        )
        .await
        .unwrap();

        assert!(report.outcomes.is_empty());
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM media_items")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }
}

//! Read-only access to a Calibre `metadata.db`.
//!
//! Calibre keeps bibliographic data normalized across link tables, so a
//! single book fans out to one row per (author, tag) combination in the
//! query below. The reader folds those rows back down to one [`SourceBook`]
//! per book id. A database that cannot be opened or queried is treated as an
//! empty library rather than an error.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Connection, SqliteConnection};

/// One book from the source library, with its one-to-many relations merged.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceBook {
    pub id: i64,
    pub title: String,
    /// Path relative to the Calibre library root; usually the book folder.
    pub relative_path: String,
    /// Author names in link-table order, deduplicated.
    pub author_names: Vec<String>,
    pub series_name: Option<String>,
    pub series_index: Option<f64>,
    pub publisher: Option<String>,
    pub isbn: Option<String>,
    pub tags: BTreeSet<String>,
    pub comments: Option<String>,
}

/// One raw row of the fan-out query. Scalar columns repeat for every row of
/// the same book; author/tag columns vary.
#[derive(Debug, sqlx::FromRow)]
struct SourceRow {
    id: i64,
    title: String,
    path: String,
    series_index: Option<f64>,
    author_name: Option<String>,
    series_name: Option<String>,
    publisher_name: Option<String>,
    isbn: Option<String>,
    tag_name: Option<String>,
    comments: Option<String>,
}

const BOOK_QUERY: &str = r#"
SELECT b.id            AS id,
       b.title         AS title,
       b.path          AS path,
       b.series_index  AS series_index,
       a.name          AS author_name,
       s.name          AS series_name,
       p.name          AS publisher_name,
       i.val           AS isbn,
       t.name          AS tag_name,
       c.text          AS comments
FROM books b
LEFT JOIN books_authors_link bal ON bal.book = b.id
LEFT JOIN authors a              ON a.id = bal.author
LEFT JOIN books_series_link bsl  ON bsl.book = b.id
LEFT JOIN series s               ON s.id = bsl.series
LEFT JOIN books_publishers_link bpl ON bpl.book = b.id
LEFT JOIN publishers p           ON p.id = bpl.publisher
LEFT JOIN identifiers i          ON i.book = b.id AND i.type = 'isbn'
LEFT JOIN books_tags_link btl    ON btl.book = b.id
LEFT JOIN tags t                 ON t.id = btl.tag
LEFT JOIN comments c             ON c.book = b.id
ORDER BY b.id, bal.id, btl.id
"#;

/// Read every book from a Calibre database, one aggregate per book id.
///
/// Any failure to open or query the database yields an empty map; the
/// connection is closed on every exit path.
pub async fn read_source_books(db_path: &Path) -> BTreeMap<i64, SourceBook> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .read_only(true);

    let mut conn = match SqliteConnection::connect_with(&options).await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!(
                "Failed to open Calibre database {}: {}",
                db_path.display(),
                e
            );
            return BTreeMap::new();
        }
    };

    let rows: Vec<SourceRow> = match sqlx::query_as(BOOK_QUERY).fetch_all(&mut conn).await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(
                "Failed to query Calibre database {}: {}",
                db_path.display(),
                e
            );
            let _ = conn.close().await;
            return BTreeMap::new();
        }
    };

    let _ = conn.close().await;

    let books = fold_source_rows(rows);
    tracing::debug!(
        "Read {} books from Calibre database {}",
        books.len(),
        db_path.display()
    );
    books
}

/// Fold the join-multiplied rows down to one aggregate per book id.
///
/// First pass: initialize each aggregate from the first row seen for its id
/// and collect authors/tags into side accumulators. Second pass: merge the
/// accumulators into the aggregates. Authors keep first-seen order; tags are
/// a set, so fan-out repetition cannot double-count either.
fn fold_source_rows(rows: Vec<SourceRow>) -> BTreeMap<i64, SourceBook> {
    let mut books: BTreeMap<i64, SourceBook> = BTreeMap::new();
    let mut authors: BTreeMap<i64, Vec<String>> = BTreeMap::new();
    let mut tags: BTreeMap<i64, BTreeSet<String>> = BTreeMap::new();

    for row in rows {
        books.entry(row.id).or_insert_with(|| SourceBook {
            id: row.id,
            title: row.title.clone(),
            relative_path: row.path.clone(),
            author_names: Vec::new(),
            series_name: row.series_name.clone(),
            series_index: row.series_index,
            publisher: row.publisher_name.clone(),
            isbn: row.isbn.clone(),
            tags: BTreeSet::new(),
            comments: row.comments.clone(),
        });

        if let Some(author) = row.author_name {
            let list = authors.entry(row.id).or_default();
            if !list.contains(&author) {
                list.push(author);
            }
        }
        if let Some(tag) = row.tag_name {
            tags.entry(row.id).or_default().insert(tag);
        }
    }

    for (id, book) in books.iter_mut() {
        if let Some(list) = authors.remove(id) {
            book.author_names = list;
        }
        if let Some(set) = tags.remove(id) {
            book.tags = set;
        }
    }

    books
}

//! Resolution of library-relative book paths to files on disk.

use std::path::{Path, PathBuf};

/// Extensions considered importable book files.
pub const BOOK_EXTENSIONS: &[&str] = &["epub", "mobi", "pdf"];

pub fn is_book_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| BOOK_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Resolve a library-relative path recorded in a Calibre database to a file.
///
/// Calibre records the book *folder* ("Author Name/Title (123)"), so when the
/// joined path is a directory its immediate children are scanned for the
/// first book file. Children are sorted lexicographically so the pick is
/// deterministic across platforms. A non-directory candidate is returned
/// as-is; existence is checked by the caller.
pub fn resolve_book_file(library_root: &Path, relative_path: &str) -> Option<PathBuf> {
    let candidate = library_root.join(relative_path);

    if !candidate.is_dir() {
        return Some(candidate);
    }

    let mut children: Vec<PathBuf> = std::fs::read_dir(&candidate)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    children.sort();

    children.into_iter().find(|child| is_book_file(child))
}

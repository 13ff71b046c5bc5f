//! Bibliographic name/title normalization for imported books.
//!
//! These are pure string transformations. Calibre stores titles and author
//! names in whatever shape the user typed them, so imports run everything
//! through here before persisting.

/// Leading articles rotated to the end of a sort title, checked in order.
const LEADING_ARTICLES: &[&str] = &["The ", "A ", "An "];

/// A normalized person name: how it is displayed, and how it sorts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPerson {
    pub display_name: String,
    pub sort_key: String,
}

/// Recapitalize a title word by word: "the GREAT gatsby" -> "The Great Gatsby".
///
/// Every token is lowercased and its first character uppercased. Small words
/// and acronyms are not special-cased.
pub fn clean_title(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Derive a sort title by rotating a leading article to the end:
/// "The Hobbit" -> "Hobbit, The". Titles without a leading article are
/// returned unchanged.
pub fn create_sort_title(title: &str) -> String {
    for article in LEADING_ARTICLES {
        if let Some(prefix) = title.get(..article.len()) {
            if prefix.eq_ignore_ascii_case(article) {
                let remainder = &title[article.len()..];
                return format!("{}, {}", remainder, article.trim_end());
            }
        }
    }
    title.to_string()
}

/// Canonicalize a raw author name into display and sort forms.
///
/// Handles the three shapes Calibre produces: "Last, First", "First Last",
/// and single-token pen names. The sort key for a single token keeps a
/// trailing ", " so all sort keys share the "Last, First" shape.
pub fn clean_author_name(raw: &str) -> NormalizedPerson {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return NormalizedPerson {
            display_name: "Unknown".to_string(),
            sort_key: "Unknown".to_string(),
        };
    }

    // Mononym: "Prince" -> ("Prince", "Prince, ")
    if !trimmed.contains(' ') && !trimmed.contains(',') {
        let capitalized = capitalize(trimmed);
        return NormalizedPerson {
            sort_key: format!("{}, ", capitalized),
            display_name: capitalized,
        };
    }

    // "Last, First" -> display "First Last", sort "Last, First"
    if let Some((last, first)) = trimmed.split_once(',') {
        let last = capitalize(last.trim());
        let first = capitalize(first.trim());
        return NormalizedPerson {
            display_name: format!("{} {}", first, last),
            sort_key: format!("{}, {}", last, first),
        };
    }

    // "First Middle Last": the final token is the last name. The display
    // name keeps the input verbatim; only the last name is capitalized in
    // the sort key.
    let mut tokens: Vec<&str> = trimmed.split_whitespace().collect();
    let last = tokens.pop().unwrap_or_default();
    let first = tokens.join(" ");
    NormalizedPerson {
        display_name: trimmed.to_string(),
        sort_key: format!("{}, {}", capitalize(last), first),
    }
}

/// Uppercase the first character if it is lowercase; the rest is untouched.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) if first.is_lowercase() => {
            first.to_uppercase().collect::<String>() + chars.as_str()
        }
        Some(first) => {
            let mut out = String::with_capacity(s.len());
            out.push(first);
            out.push_str(chars.as_str());
            out
        }
        None => String::new(),
    }
}

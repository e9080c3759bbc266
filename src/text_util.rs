use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

/// Default number of lines in a snippet when no match is found.
pub const DEFAULT_SNIPPET_LINES: usize = 6;

/// Maximum number of characters in a snippet before truncation.
pub const DEFAULT_SNIPPET_MAX_CHARS: usize = 400;

/// Lowercase `text` and strip diacritics ("Artículo" -> "articulo").
///
/// `ñ` folds to `n` as well; the result is only used for matching, never
/// shown to users.
pub fn fold(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Cut `text` to at most `max_chars` characters, on a char boundary.
///
/// Returns the input unchanged when it already fits.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Extract a snippet around the first occurrence of `query` in `text`.
///
/// Matching is accent- and case-insensitive. Returns `(snippet_text,
/// start_line_number)` where start_line_number is 1-indexed. If `query` is
/// not found, returns the first few lines. Returns `None` if the text is
/// empty.
pub fn extract_snippet(text: &str, query: &str) -> Option<(String, usize)> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return None;
    }

    let needle = fold(query);
    let match_idx = if needle.trim().is_empty() {
        None
    } else {
        lines.iter().position(|line| fold(line).contains(&needle))
    };

    let (start, end) = if let Some(idx) = match_idx {
        let start = idx.saturating_sub(2);
        let end = (idx + 3).min(lines.len());
        (start, end)
    } else {
        (0, DEFAULT_SNIPPET_LINES.min(lines.len()))
    };

    let joined = lines[start..end].join("\n");
    let truncated = truncate_chars(&joined, DEFAULT_SNIPPET_MAX_CHARS);
    let snippet = if truncated.len() < joined.len() {
        format!("{truncated}...")
    } else {
        joined
    };

    Some((snippet, start + 1))
}

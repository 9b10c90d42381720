//! Text helpers for platform title rules and storage file names

/// Number of leading words kept when a title has to be shortened.
const SHORTENED_WORD_COUNT: usize = 5;

/// Maximum length of a sanitized storage file name (without extension).
const MAX_FILENAME_LENGTH: usize = 80;

/// Ensure the required platform tag appears exactly once and the total
/// length stays within the platform maximum.
///
/// When the tagged title exceeds `max_length`, only the first few words of
/// the original title are kept before re-appending the tag; if that is
/// still too long the kept part is trimmed character by character.
pub fn normalize_title(title: &str, required_tag: &str, max_length: usize) -> String {
    let base = title.trim();

    // Strip any existing occurrences so the tag is never duplicated
    let without_tag = base
        .split_whitespace()
        .filter(|word| !word.eq_ignore_ascii_case(required_tag))
        .collect::<Vec<_>>()
        .join(" ");

    let tagged = if without_tag.is_empty() {
        required_tag.to_string()
    } else {
        format!("{} {}", without_tag, required_tag)
    };

    if tagged.chars().count() <= max_length {
        return tagged;
    }

    // Over length: keep only the first few words, then re-append the tag
    let mut kept = without_tag
        .split_whitespace()
        .take(SHORTENED_WORD_COUNT)
        .collect::<Vec<_>>()
        .join(" ");

    // Trim further if the shortened form still exceeds the limit
    let budget = max_length.saturating_sub(required_tag.chars().count() + 1);
    if kept.chars().count() > budget {
        kept = kept.chars().take(budget).collect::<String>();
        kept = kept.trim_end().to_string();
    }

    if kept.is_empty() {
        required_tag.chars().take(max_length).collect()
    } else {
        format!("{} {}", kept, required_tag)
    }
}

/// Strip tag markers and characters that are invalid in file paths, and
/// cap the length.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '#' | '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect();

    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    collapsed
        .chars()
        .take(MAX_FILENAME_LENGTH)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Deterministic destination file name for an ingestion queue item.
///
/// Derived from the trailing path segment of the source link so that the
/// same source item always maps to the same name, which is what makes the
/// destination-side dedupe check possible.
pub fn derive_queue_filename(source_url: &str) -> String {
    let without_query = source_url
        .split(['?', '#'])
        .next()
        .unwrap_or(source_url);
    let trimmed = without_query.trim_end_matches('/');
    let tail = trimmed.rsplit('/').next().unwrap_or(trimmed);

    let stem = sanitize_filename(tail);
    let stem = if stem.is_empty() {
        "item".to_string()
    } else {
        stem
    };

    format!("{}.mp4", stem)
}

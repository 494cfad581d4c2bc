//! Filename sanitization for stored documents.
//!
//! Derives a filesystem-safe `.pdf` filename from a work title. Windows is
//! the most restrictive target, so its rules drive the character set and the
//! trailing-character handling.

/// Maximum stem length before the extension (255 bytes is the common
/// filesystem limit; stay conservative).
const MAX_STEM_LEN: usize = 200;

/// Builds a safe `{title}.pdf` filename from a work title.
///
/// Spaces become underscores, characters invalid on common filesystems are
/// removed, the stem is capped at 200 characters, and trailing periods and
/// spaces are stripped. Empty inputs and titles that sanitize to nothing get
/// placeholder names so a document is never stored without one.
#[must_use]
pub fn title_filename(title: &str) -> String {
    let base = if title.is_empty() {
        "Unknown_Paper_Title".to_string()
    } else {
        title.to_string()
    };

    let replaced = base.replace(' ', "_");
    let mut stem: String = replaced
        .chars()
        .filter(|c| !is_invalid_filename_char(*c))
        .collect();

    if stem.chars().count() > MAX_STEM_LEN {
        stem = stem.chars().take(MAX_STEM_LEN).collect();
    }

    let stem = stem.trim_end_matches(['.', ' ']);
    let stem = if stem.is_empty() {
        "Sanitized_Paper_Title"
    } else {
        stem
    };

    format!("{stem}.pdf")
}

fn is_invalid_filename_char(c: char) -> bool {
    matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') || (c as u32) < 32
}

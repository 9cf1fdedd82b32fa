//! Slug generation and validation.
//!
//! Two related jobs:
//! - anchors for headings (`Hello, World!` → `hello-world`)
//! - checking that a user-supplied slug is safe to turn into a file name

use deunicode::deunicode;
use regex::Regex;
use std::sync::LazyLock;

/// Characters forbidden in file names built from slugs.
const FORBIDDEN_CHARS: &[char] = &[
    '/', '<', '>', ':', '|', '?', '*', '#', '\\', '"', '\0', '\t', '\r', '\n',
];

/// Lowercase ASCII words joined by single dashes.
static SLUG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").unwrap());

// ============================================================================
// Slugification
// ============================================================================

/// Convert heading text to an anchor.
///
/// Unicode is transliterated to ASCII, runs of anything that is not a letter
/// or digit collapse to one `-`, and leading/trailing dashes are dropped.
/// Text with no usable characters becomes `section`.
pub fn slugify_anchor(text: &str) -> String {
    let ascii = deunicode(text);
    let mut slug = String::with_capacity(ascii.len());
    let mut pending_dash = false;

    for c in ascii.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        slug.push_str("section");
    }
    slug
}

// ============================================================================
// Validation
// ============================================================================

/// Whether `value` matches the `slug` schema type.
pub fn is_valid_slug(value: &str) -> bool {
    SLUG_PATTERN.is_match(value)
}

/// Whether `value` can be used as a single path segment.
///
/// Rejects empty names, `.`/`..`, hidden files and anything containing a
/// separator or other forbidden character.
pub fn is_safe_segment(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && !value.starts_with('.')
        && !value.contains(FORBIDDEN_CHARS)
}

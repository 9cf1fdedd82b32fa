//! Publication date and slug from `YYYY-MM-DD-slug.ext` file names.
//!
//! Pure string work: the file content is never consulted.

use super::Record;
use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::{path::Path, sync::LazyLock};

/// Leading `YYYY-MM-DD-` on a file stem.
static DATE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]{4}-[0-9]{2}-[0-9]{2})-(.+)$").unwrap());

/// Result of [`extract_date_slug`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateSlug {
    pub date: Option<String>,
    pub slug: String,
}

impl DateSlug {
    /// Set `date` and `slug` on a record, keeping values it already defines.
    pub fn apply(self, record: &mut Record) {
        if let Some(date) = self.date {
            record
                .entry("date")
                .or_insert_with(|| Value::String(date));
        }
        record
            .entry("slug")
            .or_insert_with(|| Value::String(self.slug));
    }
}

/// Split a file name like `2024-01-15-hello-world.md` into date and slug.
///
/// The prefix must be a real calendar date; `2024-13-40-x.md` has no date
/// and the whole stem is the slug.
pub fn extract_date_slug(path: &Path) -> DateSlug {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    if let Some(caps) = DATE_PREFIX.captures(&stem)
        && NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").is_ok()
    {
        return DateSlug {
            date: Some(caps[1].to_owned()),
            slug: caps[2].to_owned(),
        };
    }

    DateSlug {
        date: None,
        slug: stem,
    }
}

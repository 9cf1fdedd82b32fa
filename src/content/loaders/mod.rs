//! Format loaders.
//!
//! Every loader has the same shape:
//!
//! ```ignore
//! pub fn load(raw: &[u8], path: &Path) -> Result<Record, ParseError>
//! ```
//!
//! Loaders are pure. They never read other files (sidecars are merged by the
//! collection builder) and never swallow malformed input.

pub mod blocks;
pub mod csv;
pub mod html;
pub mod json5;
pub mod markdown;
pub mod toml;
pub mod yaml;

use crate::error::{Location, ParseError};
use std::path::Path;

/// Decode raw bytes as UTF-8, stripping a leading byte order mark.
pub(crate) fn utf8<'a>(raw: &'a [u8], path: &Path) -> Result<&'a str, ParseError> {
    let raw = raw.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(raw);
    std::str::from_utf8(raw).map_err(|err| {
        ParseError::new(path, "file is not valid UTF-8").at(Location::Offset(err.valid_up_to()))
    })
}

//! JSON5 documents: JSON with comments, trailing commas and unquoted keys.
//!
//! Accepted verbatim; the collection schema decides what survives.

use super::utf8;
use crate::{
    content::{Record, into_record},
    error::{Location, ParseError},
};
use serde_json::Value;
use std::path::Path;

pub fn load(raw: &[u8], path: &Path) -> Result<Record, ParseError> {
    parse_object(utf8(raw, path)?, path)
}

/// Parse JSON5 text that must be an object.
///
/// Shared with the HTML loader for embedded metadata scripts.
pub(crate) fn parse_object(text: &str, path: &Path) -> Result<Record, ParseError> {
    let value: Value = ::json5::from_str(text).map_err(|err| match err {
        ::json5::Error::Message { msg, location } => {
            let parse_err = ParseError::new(path, msg);
            match location {
                Some(loc) => parse_err.at(Location::LineColumn {
                    line: loc.line,
                    column: loc.column,
                }),
                None => parse_err,
            }
        }
    })?;
    into_record(value, path)
}

//! TOML documents. Datetimes become their RFC 3339 string form.

use super::utf8;
use crate::{
    content::Record,
    error::{Location, ParseError},
};
use serde_json::Value;
use std::path::Path;

pub fn load(raw: &[u8], path: &Path) -> Result<Record, ParseError> {
    parse_table(utf8(raw, path)?, path)
}

/// Parse TOML text into a record.
///
/// Shared with the markdown loader for `+++` frontmatter.
pub(crate) fn parse_table(text: &str, path: &Path) -> Result<Record, ParseError> {
    let table: ::toml::Table = ::toml::from_str(text).map_err(|err: ::toml::de::Error| {
        let parse_err = ParseError::new(path, err.message().to_owned());
        match err.span() {
            Some(span) => parse_err.at(Location::Offset(span.start)),
            None => parse_err,
        }
    })?;

    table
        .into_iter()
        .map(|(key, value)| Ok((key, to_json(value, path)?)))
        .collect()
}

fn to_json(value: ::toml::Value, path: &Path) -> Result<Value, ParseError> {
    use ::toml::Value as Toml;
    Ok(match value {
        Toml::String(s) => Value::String(s),
        Toml::Integer(i) => Value::from(i),
        Toml::Float(f) => match serde_json::Number::from_f64(f) {
            Some(number) => Value::Number(number),
            None => {
                return Err(ParseError::new(
                    path,
                    format!("non-finite float `{f}` cannot be represented"),
                ));
            }
        },
        Toml::Boolean(b) => Value::Bool(b),
        Toml::Datetime(dt) => Value::String(dt.to_string()),
        Toml::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| to_json(item, path))
                .collect::<Result<_, _>>()?,
        ),
        Toml::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(key, value)| Ok((key, to_json(value, path)?)))
                .collect::<Result<_, ParseError>>()?,
        ),
    })
}

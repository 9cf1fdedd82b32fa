//! CSV tables. The first row names the columns.
//!
//! Output shape is `{rows: [{column: "value", ...}, ...]}`. Every value stays
//! a string; numeric comparison is the caller's business.

use crate::{
    content::Record,
    error::{Location, ParseError},
};
use serde_json::Value;
use std::path::Path;

pub fn load(raw: &[u8], path: &Path) -> Result<Record, ParseError> {
    let raw = raw.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(raw);
    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(raw);

    let headers = reader
        .headers()
        .map_err(|err| csv_error(&err, path))?
        .clone();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|err| csv_error(&err, path))?;
        let row: Record = headers
            .iter()
            .zip(record.iter())
            .map(|(column, value)| (column.to_owned(), Value::String(value.to_owned())))
            .collect();
        rows.push(Value::Object(row));
    }

    let mut record = Record::new();
    record.insert("rows".into(), Value::Array(rows));
    Ok(record)
}

fn csv_error(err: &::csv::Error, path: &Path) -> ParseError {
    let parse_err = ParseError::new(path, err.to_string());
    match err.position() {
        Some(pos) => parse_err.at(Location::Line(pos.line() as usize)),
        None => parse_err,
    }
}

//! YAML documents. The whole file is data; no frontmatter split.

use super::utf8;
use crate::{
    content::{Record, into_record},
    error::{Location, ParseError},
};
use serde_json::Value;
use std::path::Path;

pub fn load(raw: &[u8], path: &Path) -> Result<Record, ParseError> {
    parse_mapping(utf8(raw, path)?, path)
}

/// Parse YAML text that must be a mapping. Empty text is an empty record.
///
/// Shared with the markdown loader for `---` frontmatter.
pub(crate) fn parse_mapping(text: &str, path: &Path) -> Result<Record, ParseError> {
    if text.trim().is_empty() {
        return Ok(Record::new());
    }

    let value: serde_yaml::Value = serde_yaml::from_str(text).map_err(|err| {
        let parse_err = ParseError::new(path, err.to_string());
        match err.location() {
            Some(loc) => parse_err.at(Location::LineColumn {
                line: loc.line(),
                column: loc.column(),
            }),
            None => parse_err,
        }
    })?;
    reject_non_finite(&value, path)?;
    let value: Value =
        serde_yaml::from_value(value).map_err(|err| ParseError::new(path, err.to_string()))?;

    match value {
        // A document holding only comments
        Value::Null => Ok(Record::new()),
        other => into_record(other, path),
    }
}

/// JSON has no `.inf` or `.nan`.
fn reject_non_finite(value: &serde_yaml::Value, path: &Path) -> Result<(), ParseError> {
    use serde_yaml::Value as Yaml;
    match value {
        Yaml::Number(n) if n.is_nan() || n.is_infinite() => Err(ParseError::new(
            path,
            format!("non-finite float `{n}` cannot be represented"),
        )),
        Yaml::Sequence(items) => items.iter().try_for_each(|item| reject_non_finite(item, path)),
        Yaml::Mapping(map) => map.values().try_for_each(|item| reject_non_finite(item, path)),
        Yaml::Tagged(tagged) => reject_non_finite(&tagged.value, path),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_load_mapping() {
        let raw = b"title: Hello\ncount: 3\ntags:\n  - a\n  - b\nnested:\n  key: value\n";
        let record = load(raw, Path::new("data/site.yaml")).unwrap();

        assert_eq!(record.get("title"), Some(&json!("Hello")));
        assert_eq!(record.get("count"), Some(&json!(3)));
        assert_eq!(record.get("tags"), Some(&json!(["a", "b"])));
        assert_eq!(record.get("nested"), Some(&json!({"key": "value"})));
    }

    #[test]
    fn test_unquoted_date_stays_a_string() {
        let record = load(b"date: 2024-01-15\n", Path::new("a.yaml")).unwrap();
        assert_eq!(record.get("date"), Some(&json!("2024-01-15")));
    }

    #[test]
    fn test_empty_document() {
        assert!(load(b"", Path::new("a.yaml")).unwrap().is_empty());
        assert!(load(b"# only a comment\n", Path::new("a.yaml")).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_yaml() {
        let err = load(b"title: [unclosed\n", Path::new("data/bad.yaml")).unwrap_err();
        assert_eq!(err.path, Path::new("data/bad.yaml"));
        assert!(err.location.is_some());
    }

    #[test]
    fn test_top_level_sequence_rejected() {
        let err = load(b"- a\n- b\n", Path::new("a.yaml")).unwrap_err();
        assert!(err.message.contains("array"));
    }

    #[test]
    fn test_non_finite_floats_rejected() {
        for raw in ["ratio: .nan\n", "limits:\n  max: [1, -.inf]\n"] {
            let err = load(raw.as_bytes(), Path::new("data/limits.yaml")).unwrap_err();
            assert!(err.message.contains("non-finite"), "{raw}: {}", err.message);
        }
        let record = load(b"ratio: 0.25\n", Path::new("data/limits.yaml")).unwrap();
        assert_eq!(record.get("ratio"), Some(&json!(0.25)));
    }

    #[test]
    fn test_deterministic() {
        let raw = b"b: 1\na: [1, 2]\n";
        let first = load(raw, Path::new("a.yaml")).unwrap();
        let second = load(raw, Path::new("a.yaml")).unwrap();
        assert_eq!(first, second);
    }
}

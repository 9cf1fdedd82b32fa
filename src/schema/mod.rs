//! Declarative record schemas.
//!
//! A schema is a table of field descriptors, written in `loam.toml`:
//!
//! ```toml
//! [collections.posts.schema]
//! title = { type = "string", max = 99 }
//! slug  = { type = "slug" }
//! date  = { type = "date" }
//! tags  = { type = "array", of = { type = "string" }, optional = true, default = [] }
//! cover = { type = "object", optional = true, fields = { src = { type = "string" } } }
//! ```
//!
//! Validation turns a loaded record into exactly the declared shape:
//! unknown fields are dropped, defaults are filled, dates are normalized,
//! and every violation is collected instead of stopping at the first.

pub mod transform;

pub use transform::Transform;

use crate::{
    content::{Record, json_type},
    error::{Violation, ViolationKind},
    utils::slug::is_valid_slug,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

// ============================================================================
// Field descriptors
// ============================================================================

/// Type of a field, with nested descriptors for containers.
#[derive(Debug, Clone, PartialEq)]
pub enum Kind {
    String,
    Number,
    Boolean,
    /// `YYYY-MM-DD` or RFC 3339, normalized on output.
    Date,
    /// Lowercase dash-separated identifier, unique within a collection.
    Slug,
    /// Content-relative path without extension; filled in when absent.
    Path,
    Array(Box<Field>),
    Object(BTreeMap<String, Field>),
    Any,
}

impl Kind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Slug => "slug",
            Self::Path => "path",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Any => "any",
        }
    }

    /// Whether `max` means something for this kind.
    const fn is_measurable(&self) -> bool {
        matches!(self, Self::String | Self::Slug | Self::Path | Self::Array(_))
    }
}

/// One field descriptor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "FieldDef")]
pub struct Field {
    pub kind: Kind,
    pub optional: bool,
    pub default: Option<Value>,
    /// Maximum length in characters (strings) or items (arrays).
    pub max: Option<usize>,
}

impl Field {
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            optional: false,
            default: None,
            max: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.optional = true;
        self.default = Some(default);
        self
    }

    pub fn with_max(mut self, max: usize) -> Self {
        self.max = Some(max);
        self
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum KindName {
    String,
    Number,
    Boolean,
    Date,
    Slug,
    Path,
    Array,
    Object,
    Any,
}

/// Raw descriptor as written in TOML.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldDef {
    #[serde(rename = "type")]
    kind: KindName,
    #[serde(default)]
    optional: bool,
    default: Option<Value>,
    max: Option<usize>,
    of: Option<Box<Field>>,
    fields: Option<BTreeMap<String, Field>>,
}

impl TryFrom<FieldDef> for Field {
    type Error = String;

    fn try_from(def: FieldDef) -> Result<Self, Self::Error> {
        let kind = match (def.kind, def.of, def.fields) {
            (KindName::Array, Some(of), None) => Kind::Array(of),
            (KindName::Array, None, _) => return Err("`array` fields require `of`".into()),
            (KindName::Object, None, Some(fields)) => Kind::Object(fields),
            (KindName::Object, _, None) => return Err("`object` fields require `fields`".into()),
            (_, Some(_), _) => return Err("`of` is only valid on `array` fields".into()),
            (_, _, Some(_)) => return Err("`fields` is only valid on `object` fields".into()),
            (KindName::String, None, None) => Kind::String,
            (KindName::Number, None, None) => Kind::Number,
            (KindName::Boolean, None, None) => Kind::Boolean,
            (KindName::Date, None, None) => Kind::Date,
            (KindName::Slug, None, None) => Kind::Slug,
            (KindName::Path, None, None) => Kind::Path,
            (KindName::Any, None, None) => Kind::Any,
        };

        if def.max.is_some() && !kind.is_measurable() {
            return Err(format!("`max` is not valid on `{}` fields", kind.name()));
        }

        Ok(Self {
            kind,
            // A default makes a field optional
            optional: def.optional || def.default.is_some(),
            default: def.default,
            max: def.max,
        })
    }
}

// ============================================================================
// Schema
// ============================================================================

/// Field name → descriptor. Iteration (and output) order is by name.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fields: BTreeMap<String, Field>,
}

impl Schema {
    pub fn new(fields: impl IntoIterator<Item = (String, Field)>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Top-level fields of kind `slug`.
    pub fn slug_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, field)| field.kind == Kind::Slug)
            .map(|(name, _)| name.as_str())
    }

    /// Fill absent top-level `path` fields with the record's flattened path.
    pub fn fill_paths(&self, record: &mut Record, flattened: &str) {
        for (name, field) in &self.fields {
            if field.kind == Kind::Path
                && record.get(name).is_none_or(Value::is_null)
            {
                record.insert(name.clone(), Value::String(flattened.to_owned()));
            }
        }
    }

    /// Check that every declared default satisfies its own field.
    ///
    /// Returns `(field, reason)` for the first bad default found.
    pub fn check_defaults(&self) -> Result<(), (String, String)> {
        check_defaults(&self.fields, "")
    }

    /// Validate and normalize a record.
    pub fn validate(&self, record: Record) -> Result<Record, Vec<Violation>> {
        let mut violations = Vec::new();
        let output = validate_object(&self.fields, record, "", &mut violations);
        if violations.is_empty() {
            Ok(output)
        } else {
            Err(violations)
        }
    }
}

fn check_defaults(fields: &BTreeMap<String, Field>, prefix: &str) -> Result<(), (String, String)> {
    for (name, field) in fields {
        let path = join_field(prefix, name);
        if let Some(default) = &field.default {
            let mut violations = Vec::new();
            validate_value(field, default.clone(), &path, &mut violations);
            if let Some(first) = violations.into_iter().next() {
                return Err((path, format!("default does not match: {}", first.kind)));
            }
        }
        match &field.kind {
            Kind::Object(nested) => check_defaults(nested, &path)?,
            Kind::Array(item) => {
                check_defaults(&BTreeMap::from([("[]".to_owned(), (**item).clone())]), &path)?
            }
            _ => {}
        }
    }
    Ok(())
}

fn join_field(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else if name.starts_with('[') {
        format!("{prefix}{name}")
    } else {
        format!("{prefix}.{name}")
    }
}

// ============================================================================
// Validation
// ============================================================================

fn validate_object(
    fields: &BTreeMap<String, Field>,
    mut input: Record,
    prefix: &str,
    violations: &mut Vec<Violation>,
) -> Record {
    let mut output = Record::new();

    for (name, field) in fields {
        let path = join_field(prefix, name);
        match input.remove(name) {
            None | Some(Value::Null) => {
                if let Some(default) = &field.default {
                    output.insert(name.clone(), default.clone());
                } else if !field.optional {
                    violations.push(Violation::new(path, ViolationKind::Missing));
                }
            }
            Some(value) => {
                if let Some(value) = validate_value(field, value, &path, violations) {
                    output.insert(name.clone(), value);
                }
            }
        }
    }

    output
}

/// Validate one value. Returns `None` after recording a violation.
fn validate_value(
    field: &Field,
    value: Value,
    path: &str,
    violations: &mut Vec<Violation>,
) -> Option<Value> {
    let mismatch = |value: &Value| {
        Violation::new(
            path,
            ViolationKind::TypeMismatch {
                expected: field.kind.name(),
                found: json_type(value),
            },
        )
    };

    let too_long = |actual: usize| {
        field
            .max
            .filter(|max| actual > *max)
            .map(|max| Violation::new(path, ViolationKind::TooLong { max, actual }))
    };

    match (&field.kind, value) {
        (Kind::String | Kind::Path, Value::String(s)) => match too_long(s.chars().count()) {
            Some(violation) => {
                violations.push(violation);
                None
            }
            None => Some(Value::String(s)),
        },
        (Kind::Slug, Value::String(s)) => {
            if !is_valid_slug(&s) {
                violations.push(Violation::new(path, ViolationKind::InvalidSlug(s)));
                return None;
            }
            match too_long(s.chars().count()) {
                Some(violation) => {
                    violations.push(violation);
                    None
                }
                None => Some(Value::String(s)),
            }
        }
        (Kind::Date, Value::String(s)) => match normalize_date(&s) {
            Some(date) => Some(Value::String(date)),
            None => {
                violations.push(Violation::new(path, ViolationKind::InvalidDate(s)));
                None
            }
        },
        (Kind::Number, value @ Value::Number(_)) => Some(value),
        (Kind::Boolean, value @ Value::Bool(_)) => Some(value),
        (Kind::Array(item), Value::Array(items)) => {
            let before = violations.len();
            if let Some(violation) = too_long(items.len()) {
                violations.push(violation);
            }
            let output: Vec<Value> = items
                .into_iter()
                .enumerate()
                .filter_map(|(i, value)| {
                    validate_value(item, value, &format!("{path}[{i}]"), violations)
                })
                .collect();
            (violations.len() == before).then_some(Value::Array(output))
        }
        (Kind::Object(fields), Value::Object(map)) => {
            let before = violations.len();
            let output = validate_object(fields, map, path, violations);
            (violations.len() == before).then_some(Value::Object(output))
        }
        (Kind::Any, value) => Some(value),
        (_, value) => {
            violations.push(mismatch(&value));
            None
        }
    }
}

/// Normalize a date string.
///
/// | Input                        | Output                  |
/// |------------------------------|-------------------------|
/// | `2024-01-15`                 | `2024-01-15`            |
/// | `2024-01-15T10:00:00+02:00`  | `2024-01-15T08:00:00Z`  |
/// | `2024-01-15 10:00:00`        | `2024-01-15T10:00:00Z`  |
/// | `2024-01-15T10:00:00.250`    | `2024-01-15T10:00:00Z`  |
pub fn normalize_date(value: &str) -> Option<String> {
    const UTC_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
    let value = value.trim();

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date.format("%Y-%m-%d").to_string());
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
        return Some(datetime.with_timezone(&Utc).format(UTC_FORMAT).to_string());
    }
    // `%.f` also matches an absent fraction
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc().format(UTC_FORMAT).to_string())
}

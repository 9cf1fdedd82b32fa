//! Derived fields computed after validation.
//!
//! ```toml
//! [[collections.posts.transform]]
//! kind = "template"
//! field = "permalink"
//! template = "/blog/{slug}"
//!
//! [[collections.docs.transform]]
//! kind = "basename"
//! field = "slug"
//! from = "path"
//! ```
//!
//! Transforms only add fields. Targeting a declared schema field is rejected
//! when the configuration is validated.

use crate::content::Record;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", deny_unknown_fields)]
pub enum Transform {
    /// Interpolate `{name}` placeholders with record values.
    Template { field: String, template: String },
    /// Last `/`-separated segment of a string field.
    Basename { field: String, from: String },
}

impl Transform {
    /// Name of the field this transform writes.
    pub fn target(&self) -> &str {
        match self {
            Self::Template { field, .. } | Self::Basename { field, .. } => field,
        }
    }

    pub fn apply(&self, record: &mut Record) {
        match self {
            Self::Template { field, template } => {
                let value = render_template(template, record);
                record.insert(field.clone(), Value::String(value));
            }
            Self::Basename { field, from } => {
                if let Some(source) = record.get(from).and_then(Value::as_str) {
                    let base = source
                        .trim_end_matches('/')
                        .rsplit('/')
                        .next()
                        .unwrap_or_default()
                        .to_owned();
                    record.insert(field.clone(), Value::String(base));
                }
            }
        }
    }
}

/// Apply transforms in declaration order.
pub fn apply_all(transforms: &[Transform], record: &mut Record) {
    for transform in transforms {
        transform.apply(record);
    }
}

/// Replace `{name}` with the scalar value of `name`.
///
/// Missing fields and non-scalar values render as empty. An unclosed `{` is
/// copied through literally.
fn render_template(template: &str, record: &Record) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };

        match record.get(after[..close].trim()) {
            Some(Value::String(s)) => out.push_str(s),
            Some(Value::Number(n)) => out.push_str(&n.to_string()),
            Some(Value::Bool(b)) => out.push_str(if *b { "true" } else { "false" }),
            _ => {}
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    out
}

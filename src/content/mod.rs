//! Raw files to pre-validation records.
//!
//! - **loaders**: one pure function per file format
//! - **sidecar**: `name.ext` ↔ `name.meta.json` metadata files
//! - **filename**: `YYYY-MM-DD-slug.ext` date/slug extraction
//!
//! # Loader Selection
//!
//! ```text
//! posts/hello.md ──► LoaderRegistry::resolve() ──► Format::Markdown ──► Record
//!                    (extension lookup table)      (tagged variant)
//! ```
//!
//! The registry is resolved once from config; an extension claimed by two
//! formats is rejected at registration time.

pub mod filename;
pub mod loaders;
pub mod sidecar;

use crate::{
    config::ConfigError,
    error::{Location, ParseError},
};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::BTreeMap, path::Path};

/// Field name → value mapping produced by loaders and validated by schemas.
pub type Record = serde_json::Map<String, Value>;

// ============================================================================
// Formats
// ============================================================================

/// Supported source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Markdown with YAML (`---`) or TOML (`+++`) frontmatter.
    Markdown,
    /// Block-editor JSON documents (`{time, blocks: [...]}`).
    Blocks,
    /// JSON5 (plain JSON is a subset).
    Json5,
    /// HTML with a `<script id="meta">` metadata block.
    Html,
    Yaml,
    Csv,
    Toml,
}

impl Format {
    pub const ALL: [Self; 7] = [
        Self::Markdown,
        Self::Blocks,
        Self::Json5,
        Self::Html,
        Self::Yaml,
        Self::Csv,
        Self::Toml,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Blocks => "blocks",
            Self::Json5 => "json5",
            Self::Html => "html",
            Self::Yaml => "yaml",
            Self::Csv => "csv",
            Self::Toml => "toml",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|format| format.name() == name)
    }

    /// Extensions registered for this format by default.
    pub const fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Markdown => &["md", "mdx"],
            Self::Blocks => &["editorjs"],
            Self::Json5 => &["json5", "json"],
            Self::Html => &["html", "htm"],
            Self::Yaml => &["yaml", "yml"],
            Self::Csv => &["csv"],
            Self::Toml => &["toml"],
        }
    }

    /// Whether records of this format pick up a `name.meta.json` sidecar.
    pub const fn has_sidecar(self) -> bool {
        matches!(self, Self::Blocks)
    }

    /// Parse raw file bytes into a record.
    pub fn load(self, raw: &[u8], path: &Path) -> Result<Record, ParseError> {
        match self {
            Self::Markdown => loaders::markdown::load(raw, path),
            Self::Blocks => loaders::blocks::load(raw, path),
            Self::Json5 => loaders::json5::load(raw, path),
            Self::Html => loaders::html::load(raw, path),
            Self::Yaml => loaders::yaml::load(raw, path),
            Self::Csv => loaders::csv::load(raw, path),
            Self::Toml => loaders::toml::load(raw, path),
        }
    }
}

// ============================================================================
// Loader Registry
// ============================================================================

/// Extension → format lookup table.
#[derive(Debug, Clone, Default)]
pub struct LoaderRegistry {
    by_extension: FxHashMap<String, Format>,
}

impl LoaderRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with every built-in format under its default extensions.
    pub fn builtin() -> Self {
        let by_extension = Format::ALL
            .iter()
            .flat_map(|format| {
                format
                    .extensions()
                    .iter()
                    .map(move |ext| ((*ext).to_owned(), *format))
            })
            .collect();
        Self { by_extension }
    }

    /// Built-in registry extended with user aliases from `[loaders]`
    /// (extension → format name).
    pub fn with_aliases(aliases: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let mut registry = Self::builtin();
        for (ext, name) in aliases {
            let format = Format::from_name(name).ok_or_else(|| ConfigError::UnknownFormat {
                extension: ext.clone(),
                format: name.clone(),
            })?;
            registry.register(ext, format)?;
        }
        Ok(registry)
    }

    /// Claim `ext` for `format`. An extension can only be claimed once.
    pub fn register(&mut self, ext: &str, format: Format) -> Result<(), ConfigError> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        if let Some(existing) = self.by_extension.get(&ext) {
            return Err(ConfigError::AmbiguousLoader {
                extension: ext,
                existing: existing.name(),
                requested: format.name(),
            });
        }
        self.by_extension.insert(ext, format);
        Ok(())
    }

    /// Find the loader for a file by its extension.
    pub fn resolve(&self, path: &Path) -> Result<Format, ConfigError> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.by_extension.get(&ext.to_ascii_lowercase()))
            .copied()
            .ok_or_else(|| ConfigError::NoLoader(path.to_path_buf()))
    }
}

// ============================================================================
// Shared helpers for loaders
// ============================================================================

/// Require a parsed document to be a mapping.
pub(crate) fn into_record(value: Value, path: &Path) -> Result<Record, ParseError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ParseError::new(
            path,
            format!("expected a top-level object, found {}", json_type(&other)),
        )),
    }
}

/// Parse a JSON document into a record, reporting line/column on failure.
pub(crate) fn parse_json_record(raw: &[u8], path: &Path) -> Result<Record, ParseError> {
    let value: Value = serde_json::from_slice(raw).map_err(|err| {
        ParseError::new(path, err.to_string()).at(Location::LineColumn {
            line: err.line(),
            column: err.column(),
        })
    })?;
    into_record(value, path)
}

/// Human-readable JSON type name, used in error messages.
pub fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

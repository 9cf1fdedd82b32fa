//! Collection builder.
//!
//! Turns a content directory into named collections of validated records.
//!
//! # Pipeline
//!
//! ```text
//! walk content dir ──► match pattern ──► load by extension ──► merge sidecar
//!   (once, sorted)      (per collection)   (LoaderRegistry)      (blocks only)
//!
//!   ──► filename date/slug ──► fill `path` ──► validate ──► transforms
//!        (filename_date)        (schema)        (schema)     (in order)
//! ```
//!
//! Collections are built in parallel. Any failure aborts the whole build; the
//! reported error is the first in collection-name order, and within a
//! collection the first in file order.

use crate::{
    config::{CollectionConfig, ConfigError},
    content::{
        LoaderRegistry, Record,
        filename::extract_date_slug,
        sidecar::{SIDECAR_SUFFIX, merge_meta, resolve_meta},
    },
    error::{BuildError, ValidationError, Violation, ViolationKind},
    schema::{Schema, Transform, transform::apply_all},
};
use glob::{MatchOptions, Pattern};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// Files to ignore during directory traversal
const IGNORED_FILES: &[&str] = &[".DS_Store"];

/// `*` must not cross `/`, `**` may.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Assembled output of one build pass.
pub type Site = BTreeMap<String, CollectionOutput>;

/// A built collection: one record or an ordered list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CollectionOutput {
    Single(Record),
    Many(Vec<Record>),
}

impl CollectionOutput {
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Many(records) => records.len(),
        }
    }
}

// ============================================================================
// Collection definitions
// ============================================================================

/// A collection ready to build: pattern compiled, rules checked.
#[derive(Debug, Clone)]
pub struct CollectionDef {
    pub name: String,
    pub pattern: Pattern,
    pub single: bool,
    pub required: bool,
    pub filename_date: bool,
    pub schema: Option<Schema>,
    pub transforms: Vec<Transform>,
}

impl CollectionDef {
    pub fn from_config(name: &str, config: &CollectionConfig) -> Result<Self, ConfigError> {
        let pattern = Pattern::new(&config.pattern).map_err(|source| ConfigError::InvalidPattern {
            pattern: config.pattern.clone(),
            source,
        })?;

        if let Some(schema) = &config.schema {
            schema
                .check_defaults()
                .map_err(|(field, reason)| ConfigError::InvalidField {
                    collection: name.to_owned(),
                    field,
                    reason,
                })?;

            if let Some(transform) = config
                .transform
                .iter()
                .find(|t| schema.contains(t.target()))
            {
                return Err(ConfigError::TransformTarget {
                    collection: name.to_owned(),
                    field: transform.target().to_owned(),
                });
            }
        }

        Ok(Self {
            name: name.to_owned(),
            pattern,
            single: config.single,
            required: config.required,
            filename_date: config.filename_date,
            schema: config.schema.clone(),
            transforms: config.transform.clone(),
        })
    }

    fn matches(&self, relative: &str) -> bool {
        self.pattern.matches_with(relative, MATCH_OPTIONS)
    }
}

// ============================================================================
// Build
// ============================================================================

/// Build every collection under `root`.
pub fn build(
    root: &Path,
    defs: &[CollectionDef],
    registry: &LoaderRegistry,
) -> Result<Site, BuildError> {
    let files = collect_content_files(root)?;

    let mut results: Vec<(&str, Result<CollectionOutput, BuildError>)> = defs
        .par_iter()
        .map(|def| (def.name.as_str(), build_collection(root, def, &files, registry)))
        .collect();
    results.sort_by(|a, b| a.0.cmp(b.0));

    let mut site = Site::new();
    for (name, result) in results {
        site.insert(name.to_owned(), result?);
    }
    Ok(site)
}

/// Every content file under `root` as a `/`-separated relative path, sorted.
///
/// Sidecar files are never records of their own.
fn collect_content_files(root: &Path) -> Result<Vec<String>, BuildError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|source| BuildError::Walk {
            root: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_str().unwrap_or_default();
        if IGNORED_FILES.contains(&name) || name.ends_with(SIDECAR_SUFFIX) {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            files.push(to_slash(relative));
        }
    }

    files.sort();
    Ok(files)
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// `posts/2024/hello.md` → `posts/2024/hello`
fn flattened_path(relative: &str) -> &str {
    let file_start = relative.rfind('/').map_or(0, |i| i + 1);
    match relative[file_start..].rfind('.') {
        Some(dot) if dot > 0 => &relative[..file_start + dot],
        _ => relative,
    }
}

fn build_collection(
    root: &Path,
    def: &CollectionDef,
    files: &[String],
    registry: &LoaderRegistry,
) -> Result<CollectionOutput, BuildError> {
    let config_error = |source| BuildError::Config {
        collection: def.name.clone(),
        source,
    };

    let matched: Vec<&str> = files
        .iter()
        .map(String::as_str)
        .filter(|relative| def.matches(relative))
        .collect();

    if def.single && matched.len() != 1 {
        return Err(config_error(ConfigError::SingleFileCount {
            pattern: def.pattern.as_str().to_owned(),
            found: matched.len(),
        }));
    }
    if def.required && matched.is_empty() {
        return Err(config_error(ConfigError::EmptyCollection {
            pattern: def.pattern.as_str().to_owned(),
        }));
    }

    let loaded: Vec<Result<Record, BuildError>> = matched
        .par_iter()
        .map(|relative| load_entry(root, def, relative, registry))
        .collect();
    let records = loaded.into_iter().collect::<Result<Vec<_>, _>>()?;

    check_unique_slugs(def, &matched, &records, root)?;

    if def.single {
        // Count checked above
        Ok(records
            .into_iter()
            .next()
            .map_or_else(|| CollectionOutput::Many(Vec::new()), CollectionOutput::Single))
    } else {
        Ok(CollectionOutput::Many(records))
    }
}

/// Load one file through the full per-record pipeline.
fn load_entry(
    root: &Path,
    def: &CollectionDef,
    relative: &str,
    registry: &LoaderRegistry,
) -> Result<Record, BuildError> {
    let path = root.join(relative);
    let collection = || def.name.clone();

    let format = registry.resolve(&path).map_err(|source| BuildError::Config {
        collection: collection(),
        source,
    })?;

    let raw = fs::read(&path).map_err(|source| BuildError::Io {
        collection: collection(),
        path: path.clone(),
        source,
    })?;

    let parse_error = |source| BuildError::Parse {
        collection: collection(),
        source,
    };

    let mut record = format.load(&raw, &path).map_err(parse_error)?;

    if format.has_sidecar() {
        let meta = resolve_meta(&path).map_err(parse_error)?;
        merge_meta(&mut record, meta);
    }

    if def.filename_date {
        extract_date_slug(&path).apply(&mut record);
    }

    let mut record = match &def.schema {
        Some(schema) => {
            schema.fill_paths(&mut record, flattened_path(relative));
            schema
                .validate(record)
                .map_err(|violations| BuildError::Validation {
                    collection: collection(),
                    source: ValidationError {
                        path: path.clone(),
                        violations,
                    },
                })?
        }
        None => record,
    };

    apply_all(&def.transforms, &mut record);
    Ok(record)
}

/// Reject two records sharing a value in any `slug` field.
fn check_unique_slugs(
    def: &CollectionDef,
    files: &[&str],
    records: &[Record],
    root: &Path,
) -> Result<(), BuildError> {
    let Some(schema) = &def.schema else {
        return Ok(());
    };

    for field in schema.slug_fields() {
        let mut seen: FxHashMap<&str, &str> = FxHashMap::default();
        for (relative, record) in files.iter().zip(records) {
            let Some(Value::String(value)) = record.get(field) else {
                continue;
            };
            if let Some(first) = seen.insert(value.as_str(), *relative) {
                return Err(BuildError::Validation {
                    collection: def.name.clone(),
                    source: ValidationError {
                        path: root.join(relative),
                        violations: vec![Violation::new(
                            field,
                            ViolationKind::DuplicateSlug {
                                value: value.clone(),
                                first: PathBuf::from(first),
                            },
                        )],
                    },
                });
            }
        }
    }
    Ok(())
}

//! Configuration error types.
//!
//! Covers both the `loam.toml` file itself and the content rules it
//! declares (loader table, collection patterns, schemas, transforms).

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{}`", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config file parsing error")]
    Toml(#[from] toml::de::Error),

    #[error("Config validation error: {0}")]
    Validation(String),

    #[error("extension `.{extension}` is claimed by both `{existing}` and `{requested}`")]
    AmbiguousLoader {
        extension: String,
        existing: &'static str,
        requested: &'static str,
    },

    #[error("no loader registered for `{}`", .0.display())]
    NoLoader(PathBuf),

    #[error("[loaders] `{extension}` maps to unknown format `{format}`")]
    UnknownFormat { extension: String, format: String },

    #[error("single-file pattern `{pattern}` matched {found} files, expected exactly 1")]
    SingleFileCount { pattern: String, found: usize },

    #[error("required pattern `{pattern}` matched no files")]
    EmptyCollection { pattern: String },

    #[error("invalid pattern `{pattern}`")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("collection `{collection}` field `{field}`: {reason}")]
    InvalidField {
        collection: String,
        field: String,
        reason: String,
    },

    #[error("collection `{collection}`: transform writes declared schema field `{field}`")]
    TransformTarget { collection: String, field: String },
}

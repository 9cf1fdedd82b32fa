//! Error taxonomy for a build pass.
//!
//! | Error             | Raised by                         | Carries                        |
//! |-------------------|-----------------------------------|--------------------------------|
//! | `ParseError`      | format loaders, sidecar resolver  | file path, line/offset         |
//! | `ValidationError` | schema layer, slug uniqueness     | file path, every violation     |
//! | `ConfigError`     | loader registry, collection rules | what was misconfigured         |
//! | `BuildError`      | collection builder                | collection name + one of above |
//!
//! All of them are fatal to the build pass. Nothing is retried.

use std::{
    fmt, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub use crate::config::ConfigError;

// ============================================================================
// ParseError
// ============================================================================

/// Position of a parse failure inside a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    LineColumn { line: usize, column: usize },
    Line(usize),
    Offset(usize),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LineColumn { line, column } => write!(f, "line {line}, column {column}"),
            Self::Line(line) => write!(f, "line {line}"),
            Self::Offset(offset) => write!(f, "byte {offset}"),
        }
    }
}

/// Malformed input for a given format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub path: PathBuf,
    pub location: Option<Location>,
    pub message: String,
}

impl ParseError {
    pub fn new(path: &Path, message: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            location: None,
            message: message.into(),
        }
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Shift line-based locations down by `lines`.
    ///
    /// Used when a fragment (e.g. frontmatter) was parsed out of a larger file.
    pub fn offset_lines(mut self, lines: usize) -> Self {
        self.location = self.location.map(|loc| match loc {
            Location::LineColumn { line, column } => Location::LineColumn {
                line: line + lines,
                column,
            },
            Location::Line(line) => Location::Line(line + lines),
            other => other,
        });
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse `{}`", self.path.display())?;
        if let Some(location) = self.location {
            write!(f, " at {location}")?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for ParseError {}

// ============================================================================
// ValidationError
// ============================================================================

/// What went wrong with a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    Missing,
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    TooLong {
        max: usize,
        actual: usize,
    },
    InvalidDate(String),
    InvalidSlug(String),
    DuplicateSlug {
        value: String,
        first: PathBuf,
    },
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("missing required field"),
            Self::TypeMismatch { expected, found } => write!(f, "expected {expected}, found {found}"),
            Self::TooLong { max, actual } => write!(f, "length {actual} exceeds maximum of {max}"),
            Self::InvalidDate(value) => write!(f, "`{value}` is not an ISO date"),
            Self::InvalidSlug(value) => write!(f, "`{value}` is not a valid slug"),
            Self::DuplicateSlug { value, first } => {
                write!(f, "slug `{value}` is already used by `{}`", first.display())
            }
        }
    }
}

/// A violated field, addressed by a dotted path (`object.key`, `tags[1]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: String,
    pub kind: ViolationKind,
}

impl Violation {
    pub fn new(field: impl Into<String>, kind: ViolationKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.kind)
    }
}

/// Schema mismatch. Lists every violated field, not just the first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub path: PathBuf,
    pub violations: Vec<Violation>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "`{}` does not match its schema ({} violation{})",
            self.path.display(),
            self.violations.len(),
            if self.violations.len() == 1 { "" } else { "s" }
        )?;
        for violation in &self.violations {
            write!(f, "\n  - {violation}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

// ============================================================================
// BuildError
// ============================================================================

/// Build-level failure. Every variant names the collection it happened in.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("collection `{collection}` failed")]
    Parse {
        collection: String,
        #[source]
        source: ParseError,
    },

    #[error("collection `{collection}` failed")]
    Validation {
        collection: String,
        #[source]
        source: ValidationError,
    },

    #[error("collection `{collection}` is misconfigured")]
    Config {
        collection: String,
        #[source]
        source: ConfigError,
    },

    #[error("collection `{collection}`: cannot read `{}`", .path.display())]
    Io {
        collection: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot walk content directory `{}`", .root.display())]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("a build is already in progress")]
    InProgress,

    #[error("build was cancelled")]
    Cancelled,
}

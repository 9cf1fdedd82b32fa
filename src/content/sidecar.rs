//! Sidecar metadata files.
//!
//! A primary content file `dir/name.ext` may have a sibling `dir/name.meta.json`
//! holding extra fields. A missing sidecar means "no extra metadata".
//!
//! This is the only place that knows the naming convention; the collection
//! builder and the article store both go through [`ContentSource`].

use super::{Record, parse_json_record};
use crate::error::ParseError;
use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Suffix replacing the primary file's extension.
pub const SIDECAR_SUFFIX: &str = ".meta.json";

/// Sidecar location for a primary file: `dir/name.ext` → `dir/name.meta.json`.
pub fn sidecar_path(primary: &Path) -> PathBuf {
    let stem = primary
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    primary.with_file_name(format!("{stem}{SIDECAR_SUFFIX}"))
}

/// A content file and its (possibly absent) metadata file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSource {
    pub primary: PathBuf,
    pub sidecar: PathBuf,
}

impl ContentSource {
    pub fn new(primary: impl Into<PathBuf>) -> Self {
        let primary = primary.into();
        let sidecar = sidecar_path(&primary);
        Self { primary, sidecar }
    }

    /// Read the sidecar as a record. Absent → empty record.
    pub fn read_meta(&self) -> Result<Record, ParseError> {
        match fs::read(&self.sidecar) {
            Ok(raw) => parse_json_record(&raw, &self.sidecar),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Record::new()),
            Err(err) => Err(ParseError::new(
                &self.sidecar,
                format!("cannot read sidecar: {err}"),
            )),
        }
    }
}

/// Metadata for `path` from its sidecar, or an empty record.
pub fn resolve_meta(path: &Path) -> Result<Record, ParseError> {
    ContentSource::new(path).read_meta()
}

/// Merge sidecar fields into a loaded record. Sidecar fields win.
pub fn merge_meta(record: &mut Record, meta: Record) {
    record.extend(meta);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            sidecar_path(Path::new("articles/hello.editorjs")),
            PathBuf::from("articles/hello.meta.json")
        );
        assert_eq!(
            sidecar_path(Path::new("hello.editorjs")),
            PathBuf::from("hello.meta.json")
        );
    }

    #[test]
    fn test_sidecar_path_keeps_inner_dots() {
        assert_eq!(
            sidecar_path(Path::new("a/v1.2.editorjs")),
            PathBuf::from("a/v1.2.meta.json")
        );
    }

    #[test]
    fn test_resolve_meta_absent_is_empty() {
        let dir = TempDir::new().unwrap();
        let primary = dir.path().join("name.editorjs");
        fs::write(&primary, "{}").unwrap();

        let meta = resolve_meta(&primary).unwrap();
        assert!(meta.is_empty());
    }

    #[test]
    fn test_resolve_meta_present() {
        let dir = TempDir::new().unwrap();
        let primary = dir.path().join("name.editorjs");
        fs::write(&primary, "{}").unwrap();
        fs::write(dir.path().join("name.meta.json"), r#"{"title":"X"}"#).unwrap();

        let meta = resolve_meta(&primary).unwrap();
        assert_eq!(meta.get("title"), Some(&json!("X")));
    }

    #[test]
    fn test_resolve_meta_malformed() {
        let dir = TempDir::new().unwrap();
        let primary = dir.path().join("name.editorjs");
        fs::write(dir.path().join("name.meta.json"), "{ title: ").unwrap();

        let err = resolve_meta(&primary).unwrap_err();
        assert!(err.path.ends_with("name.meta.json"));
    }

    #[test]
    fn test_resolve_meta_not_an_object() {
        let dir = TempDir::new().unwrap();
        let primary = dir.path().join("name.editorjs");
        fs::write(dir.path().join("name.meta.json"), "[1]").unwrap();

        assert!(resolve_meta(&primary).is_err());
    }

    #[test]
    fn test_merge_meta_sidecar_wins() {
        let mut record = Record::new();
        record.insert("content".into(), json!("<p>a</p>"));
        record.insert("title".into(), json!("from content"));

        let mut meta = Record::new();
        meta.insert("title".into(), json!("X"));
        merge_meta(&mut record, meta);

        assert_eq!(record.get("title"), Some(&json!("X")));
        assert_eq!(record.get("content"), Some(&json!("<p>a</p>")));
    }
}

//! Block-format article store.
//!
//! Each article is two files in one directory:
//!
//! ```text
//! articles/
//! ├── hello.editorjs     # block document
//! └── hello.meta.json    # optional metadata (title, ...)
//! ```
//!
//! Writes go through a temporary file and a rename, so a concurrent build
//! reads either the old or the new version of each file. The two files of
//! one article are not updated as a pair.

use crate::{
    content::{Record, sidecar::ContentSource},
    error::{Location, ParseError},
    utils::slug::is_safe_segment,
};
use serde::Serialize;
use serde_json::Value;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Extension of article content files.
pub const EXTENSION: &str = "editorjs";

#[derive(Debug, Error)]
pub enum ArticleError {
    #[error("invalid article slug `{0}`")]
    InvalidSlug(String),

    #[error("cannot access `{}`", .0.display())]
    Io(PathBuf, #[source] io::Error),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Entry of [`ArticleStore::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleSummary {
    pub slug: String,
    pub title: String,
}

/// A stored article: the block document and its metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Article {
    pub slug: String,
    pub content: Value,
    pub meta: Record,
}

#[derive(Debug, Clone)]
pub struct ArticleStore {
    dir: PathBuf,
    extension: String,
}

impl ArticleStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            extension: EXTENSION.to_owned(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Files backing `slug`. Rejects slugs that are not a single plain segment.
    fn source(&self, slug: &str) -> Result<ContentSource, ArticleError> {
        if !is_safe_segment(slug) {
            return Err(ArticleError::InvalidSlug(slug.to_owned()));
        }
        Ok(ContentSource::new(
            self.dir.join(format!("{slug}.{}", self.extension)),
        ))
    }

    /// Every article in the directory, sorted by slug.
    ///
    /// The title comes from the sidecar's `title`, falling back to the slug.
    pub fn list(&self) -> Result<Vec<ArticleSummary>, ArticleError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(ArticleError::Io(self.dir.clone(), err)),
        };

        let suffix = format!(".{}", self.extension);
        let mut articles = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| ArticleError::Io(self.dir.clone(), err))?;
            let name = entry.file_name();
            let Some(slug) = name.to_str().and_then(|name| name.strip_suffix(&suffix)) else {
                continue;
            };
            if !is_safe_segment(slug) {
                continue;
            }

            let meta = ContentSource::new(entry.path()).read_meta()?;
            let title = meta
                .get("title")
                .and_then(Value::as_str)
                .filter(|title| !title.is_empty())
                .unwrap_or(slug)
                .to_owned();
            articles.push(ArticleSummary {
                slug: slug.to_owned(),
                title,
            });
        }

        articles.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(articles)
    }

    /// Read one article. `None` when its content file does not exist.
    pub fn get(&self, slug: &str) -> Result<Option<Article>, ArticleError> {
        let source = self.source(slug)?;
        let raw = match fs::read(&source.primary) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(ArticleError::Io(source.primary, err)),
        };

        let content = serde_json::from_slice(&raw).map_err(|err| {
            ParseError::new(&source.primary, err.to_string()).at(Location::LineColumn {
                line: err.line(),
                column: err.column(),
            })
        })?;
        let meta = source.read_meta()?;

        Ok(Some(Article {
            slug: slug.to_owned(),
            content,
            meta,
        }))
    }

    /// Write the content file and, when given, the sidecar. Both pretty-printed.
    pub fn save(
        &self,
        slug: &str,
        content: &Value,
        meta: Option<&Record>,
    ) -> Result<(), ArticleError> {
        let source = self.source(slug)?;
        fs::create_dir_all(&self.dir).map_err(|err| ArticleError::Io(self.dir.clone(), err))?;

        write_atomic(&source.primary, content)?;
        if let Some(meta) = meta {
            write_atomic(&source.sidecar, meta)?;
        }
        Ok(())
    }

    /// Remove both files of an article. Missing files are not an error.
    pub fn delete(&self, slug: &str) -> Result<(), ArticleError> {
        let source = self.source(slug)?;
        for path in [source.primary, source.sidecar] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(ArticleError::Io(path, err)),
            }
        }
        Ok(())
    }
}

/// Pretty JSON written to a hidden temp file, then renamed over `path`.
fn write_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ArticleError> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|err| ArticleError::Io(path.to_path_buf(), err.into()))?;

    let name = path
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{name}.tmp"));

    fs::write(&temp, bytes).map_err(|err| ArticleError::Io(temp.clone(), err))?;
    fs::rename(&temp, path).map_err(|err| {
        fs::remove_file(&temp).ok();
        ArticleError::Io(path.to_path_buf(), err)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store() -> (TempDir, ArticleStore) {
        let dir = TempDir::new().unwrap();
        let store = ArticleStore::new(dir.path().join("articles"));
        (dir, store)
    }

    fn meta(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let (_dir, store) = store();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_save_and_get() {
        let (_dir, store) = store();
        let content = json!({"time": 1, "blocks": [{"type": "paragraph", "data": {"text": "Hi"}}]});
        let meta = meta(json!({"title": "Hello"}));

        store.save("hello", &content, Some(&meta)).unwrap();

        let raw = fs::read_to_string(store.dir().join("hello.editorjs")).unwrap();
        assert!(raw.contains("\n  \"blocks\""), "content is pretty-printed");
        assert!(store.dir().join("hello.meta.json").exists());

        let article = store.get("hello").unwrap().unwrap();
        assert_eq!(article.slug, "hello");
        assert_eq!(article.content, content);
        assert_eq!(article.meta["title"], "Hello");
    }

    #[test]
    fn test_save_without_meta_keeps_existing_sidecar() {
        let (_dir, store) = store();
        store
            .save("a", &json!({"blocks": []}), Some(&meta(json!({"title": "A"}))))
            .unwrap();
        store.save("a", &json!({"blocks": [], "time": 2}), None).unwrap();

        let article = store.get("a").unwrap().unwrap();
        assert_eq!(article.content["time"], 2);
        assert_eq!(article.meta["title"], "A");
    }

    #[test]
    fn test_get_missing_and_no_sidecar() {
        let (_dir, store) = store();
        assert!(store.get("nope").unwrap().is_none());

        store.save("bare", &json!({"blocks": []}), None).unwrap();
        let article = store.get("bare").unwrap().unwrap();
        assert!(article.meta.is_empty());
    }

    #[test]
    fn test_get_malformed_content() {
        let (_dir, store) = store();
        fs::create_dir_all(store.dir()).unwrap();
        fs::write(store.dir().join("bad.editorjs"), "{ nope").unwrap();
        assert!(matches!(store.get("bad"), Err(ArticleError::Parse(_))));
    }

    #[test]
    fn test_list_sorted_with_titles() {
        let (_dir, store) = store();
        store
            .save("zeta", &json!({"blocks": []}), Some(&meta(json!({"title": "Last"}))))
            .unwrap();
        store.save("alpha", &json!({"blocks": []}), None).unwrap();
        store
            .save("mid", &json!({"blocks": []}), Some(&meta(json!({"title": ""}))))
            .unwrap();
        fs::write(store.dir().join("notes.txt"), "ignored").unwrap();

        let list = store.list().unwrap();
        assert_eq!(
            list,
            vec![
                ArticleSummary { slug: "alpha".into(), title: "alpha".into() },
                ArticleSummary { slug: "mid".into(), title: "mid".into() },
                ArticleSummary { slug: "zeta".into(), title: "Last".into() },
            ]
        );
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (_dir, store) = store();
        store
            .save("gone", &json!({"blocks": []}), Some(&meta(json!({"title": "x"}))))
            .unwrap();

        store.delete("gone").unwrap();
        assert!(!store.dir().join("gone.editorjs").exists());
        assert!(!store.dir().join("gone.meta.json").exists());

        store.delete("gone").unwrap();
        store.delete("never-existed").unwrap();
    }

    #[test]
    fn test_rejects_path_traversal() {
        let (_dir, store) = store();
        for slug in ["", "..", "../escape", "a/b", ".hidden", "a\\b"] {
            assert!(
                matches!(store.get(slug), Err(ArticleError::InvalidSlug(_))),
                "slug {slug:?} should be rejected"
            );
            assert!(matches!(
                store.save(slug, &json!({}), None),
                Err(ArticleError::InvalidSlug(_))
            ));
            assert!(matches!(store.delete(slug), Err(ArticleError::InvalidSlug(_))));
        }
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let (_dir, store) = store();
        store.save("clean", &json!({"blocks": []}), Some(&Record::new())).unwrap();
        let names: Vec<_> = fs::read_dir(store.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().all(|name| !name.ends_with(".tmp")), "{names:?}");
    }
}

//! Build lifecycle and output.
//!
//! # Architecture
//!
//! ```text
//! build_site()
//!     │
//!     ├── Builder::run()            NotStarted/Complete/Failed ──► InProgress
//!     │       │
//!     │       └── collection::build()   walk, load, validate, transform
//!     │
//!     └── write_output()            <output>/<name>.json + index.json
//! ```
//!
//! The builder owns the state of the most recent pass so the dev server can
//! serve the last good result while a rebuild runs.

use crate::{
    collection::{self, CollectionOutput, Site},
    config::LoamConfig,
    error::BuildError,
    log,
};
use anyhow::{Context, Result};
use parking_lot::RwLock;
use rayon::prelude::*;
use serde_json::{Value, json};
use std::{
    error::Error,
    fs,
    mem,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

/// File listing every collection and its record count.
pub const INDEX_FILE: &str = "index.json";

// ============================================================================
// Build State
// ============================================================================

/// Where the most recent build pass stands.
#[derive(Debug, Clone, Default)]
pub enum BuildState {
    #[default]
    NotStarted,
    InProgress,
    Complete(Arc<Site>),
    /// Rendered error chain of the failed pass.
    Failed(Arc<String>),
}

/// Owns build passes and their results.
///
/// At most one pass runs at a time. A cancelled pass leaves the state as it
/// was before the pass started.
#[derive(Debug, Default)]
pub struct Builder {
    state: RwLock<BuildState>,
    latest: RwLock<Option<Arc<Site>>>,
    cancelled: AtomicBool,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> BuildState {
        self.state.read().clone()
    }

    /// Result of the last successful pass, even if a later one failed.
    pub fn latest(&self) -> Option<Arc<Site>> {
        self.latest.read().clone()
    }

    /// Discard the running pass once it returns. No-op when idle.
    pub fn cancel(&self) {
        if matches!(*self.state.read(), BuildState::InProgress) {
            self.cancelled.store(true, Ordering::SeqCst);
        }
    }

    /// Run one build pass and record its outcome.
    pub fn run<F>(&self, pass: F) -> Result<Arc<Site>, BuildError>
    where
        F: FnOnce() -> Result<Site, BuildError>,
    {
        let previous = {
            let mut state = self.state.write();
            if matches!(*state, BuildState::InProgress) {
                return Err(BuildError::InProgress);
            }
            self.cancelled.store(false, Ordering::SeqCst);
            mem::replace(&mut *state, BuildState::InProgress)
        };

        let result = pass();

        let mut state = self.state.write();
        if self.cancelled.swap(false, Ordering::SeqCst) {
            *state = previous;
            return Err(BuildError::Cancelled);
        }

        match result {
            Ok(site) => {
                let site = Arc::new(site);
                *state = BuildState::Complete(Arc::clone(&site));
                *self.latest.write() = Some(Arc::clone(&site));
                Ok(site)
            }
            Err(err) => {
                *state = BuildState::Failed(Arc::new(error_chain(&err)));
                Err(err)
            }
        }
    }
}

/// `outer: inner: innermost`, one cause per line.
pub fn error_chain(err: &dyn Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str("\n  caused by: ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

// ============================================================================
// Entry Point
// ============================================================================

/// Build every configured collection and write the output directory.
///
/// Nothing is written unless the whole pass succeeds.
pub fn build_site(config: &LoamConfig, builder: &Builder) -> Result<Arc<Site>> {
    let registry = config.registry()?;
    let defs = config.collection_defs()?;
    let content = &config.build.content;

    let start = Instant::now();
    let site = builder.run(|| collection::build(content, &defs, &registry))?;

    write_output(&site, &config.build.output, config.build.clean)?;

    let records: usize = site.values().map(CollectionOutput::len).sum();
    log!(
        "build";
        "{} collections, {} records in {:.2?}",
        site.len(),
        records,
        start.elapsed()
    );
    Ok(site)
}

/// Write `<output>/<name>.json` for each collection plus the index.
///
/// With `clean`, the output directory is removed first.
pub fn write_output(site: &Site, output: &Path, clean: bool) -> Result<()> {
    if clean && output.exists() {
        fs::remove_dir_all(output)
            .with_context(|| format!("Failed to clean output directory: {}", output.display()))?;
    }
    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory: {}", output.display()))?;

    site.par_iter().try_for_each(|(name, collection)| {
        write_json(&output.join(format!("{name}.json")), collection)
    })?;

    write_json(&output.join(INDEX_FILE), &index_json(site))
}

/// Contents of `index.json`, written to disk and served by the dev server.
pub fn index_json(site: &Site) -> Value {
    let index: Vec<_> = site
        .iter()
        .map(|(name, collection)| {
            json!({
                "name": name,
                "count": collection.len(),
                "single": matches!(collection, CollectionOutput::Single(_)),
            })
        })
        .collect();
    json!({ "collections": index })
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Record;
    use tempfile::TempDir;

    fn sample_site() -> Site {
        let mut post = Record::new();
        post.insert("title".into(), json!("Hello"));
        let mut site = Site::new();
        site.insert("posts".into(), CollectionOutput::Many(vec![post.clone(), post.clone()]));
        site.insert("site".into(), CollectionOutput::Single(post));
        site
    }

    fn read_json(path: &Path) -> Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn test_builder_starts_empty() {
        let builder = Builder::new();
        assert!(matches!(builder.state(), BuildState::NotStarted));
        assert!(builder.latest().is_none());
    }

    #[test]
    fn test_successful_pass_completes() {
        let builder = Builder::new();
        let site = builder.run(|| Ok(sample_site())).unwrap();

        assert_eq!(site.len(), 2);
        assert!(matches!(builder.state(), BuildState::Complete(_)));
        assert!(builder.latest().is_some_and(|latest| Arc::ptr_eq(&latest, &site)));
    }

    #[test]
    fn test_failed_pass_keeps_latest() {
        let builder = Builder::new();
        builder.run(|| Ok(sample_site())).unwrap();

        let err = builder
            .run(|| {
                Err(BuildError::Walk {
                    root: "content".into(),
                    source: walkdir::WalkDir::new("/definitely/not/here")
                        .into_iter()
                        .next()
                        .unwrap()
                        .unwrap_err(),
                })
            })
            .unwrap_err();
        assert!(matches!(err, BuildError::Walk { .. }));

        match builder.state() {
            BuildState::Failed(message) => {
                assert!(message.contains("cannot walk content directory"));
                assert!(message.contains("caused by"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(builder.latest().is_some());
    }

    #[test]
    fn test_concurrent_pass_is_refused() {
        let builder = Builder::new();
        let result = builder.run(|| {
            assert!(matches!(builder.state(), BuildState::InProgress));
            let nested = builder.run(|| Ok(Site::new()));
            assert!(matches!(nested, Err(BuildError::InProgress)));
            Ok(sample_site())
        });
        assert!(result.is_ok());
    }

    #[test]
    fn test_cancelled_pass_reverts_state() {
        let builder = Builder::new();
        let first = builder.run(|| Ok(sample_site())).unwrap();

        let result = builder.run(|| {
            builder.cancel();
            Ok(Site::new())
        });
        assert!(matches!(result, Err(BuildError::Cancelled)));

        match builder.state() {
            BuildState::Complete(site) => assert!(Arc::ptr_eq(&site, &first)),
            other => panic!("expected previous Complete state, got {other:?}"),
        }

        // The flag does not leak into the next pass.
        assert!(builder.run(|| Ok(Site::new())).is_ok());
    }

    #[test]
    fn test_cancel_when_idle_is_noop() {
        let builder = Builder::new();
        builder.cancel();
        assert!(builder.run(|| Ok(Site::new())).is_ok());
    }

    #[test]
    fn test_write_output() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out");
        write_output(&sample_site(), &output, false).unwrap();

        let posts = read_json(&output.join("posts.json"));
        assert_eq!(posts.as_array().map(Vec::len), Some(2));

        let site = read_json(&output.join("site.json"));
        assert_eq!(site["title"], "Hello");

        let index = read_json(&output.join(INDEX_FILE));
        assert_eq!(
            index["collections"],
            json!([
                {"name": "posts", "count": 2, "single": false},
                {"name": "site", "count": 1, "single": true},
            ])
        );
    }

    #[test]
    fn test_write_output_clean() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out");
        fs::create_dir_all(&output).unwrap();
        fs::write(output.join("stale.json"), "{}").unwrap();

        write_output(&sample_site(), &output, false).unwrap();
        assert!(output.join("stale.json").exists());

        write_output(&sample_site(), &output, true).unwrap();
        assert!(!output.join("stale.json").exists());
        assert!(output.join("posts.json").exists());
    }

    fn config_for(dir: &Path, collections: &str) -> LoamConfig {
        let mut config = LoamConfig::from_str(collections).unwrap();
        config.build.content = dir.join("content");
        config.build.output = dir.join("out");
        config
    }

    #[test]
    fn test_build_site_writes_after_success() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("content/posts")).unwrap();
        fs::write(
            dir.path().join("content/posts/hello.md"),
            "---\ntitle: Hello\n---\n\nBody text.\n",
        )
        .unwrap();

        let config = config_for(
            dir.path(),
            r#"
                [collections.posts]
                pattern = "posts/*.md"

                [collections.posts.schema]
                title = { type = "string" }
                content = { type = "string" }
            "#,
        );
        let builder = Builder::new();
        let site = build_site(&config, &builder).unwrap();

        assert_eq!(site["posts"].len(), 1);
        let posts = read_json(&dir.path().join("out/posts.json"));
        assert_eq!(posts[0]["title"], "Hello");
        assert!(posts[0]["content"].as_str().unwrap().contains("<p>Body text.</p>"));
    }

    #[test]
    fn test_build_site_failure_writes_nothing() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("content/posts")).unwrap();
        fs::write(dir.path().join("content/posts/hello.md"), "no frontmatter\n").unwrap();

        let config = config_for(
            dir.path(),
            r#"
                [collections.posts]
                pattern = "posts/*.md"

                [collections.posts.schema]
                title = { type = "string" }
            "#,
        );
        let builder = Builder::new();
        let err = build_site(&config, &builder).unwrap_err();

        assert!(err.downcast_ref::<BuildError>().is_some());
        assert!(!dir.path().join("out").exists());
        assert!(matches!(builder.state(), BuildState::Failed(_)));
    }
}

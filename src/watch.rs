//! File system watcher for automatic rebuilds.
//!
//! Monitors the content directory and the config file. Every batch of changes
//! triggers a full rebuild; there is no incremental path.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐    ┌───────────┐    ┌──────────────────┐
//! │ notify   │───▶│ Debouncer │───▶│ handle_changes() │
//! │ events   │    │ (300ms)   │    │  config? reload  │
//! └──────────┘    └───────────┘    │  build_site()    │
//!                                  └──────────────────┘
//! ```

use crate::{
    build::{Builder, build_site},
    config::LoamConfig,
    log,
};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

// =============================================================================
// Constants
// =============================================================================

const DEBOUNCE_MS: u64 = 300;
const REBUILD_COOLDOWN_MS: u64 = 800;

// =============================================================================
// Path Utilities
// =============================================================================

/// Check if path is a temp/backup file (editor artifacts, article store temps).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

/// `/proj/content/posts/a.md` → `content/posts/a.md`
fn rel_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

// =============================================================================
// Debounce State
// =============================================================================

/// Batches rapid file events with debouncing and rebuild cooldown.
struct Debouncer {
    pending: FxHashSet<PathBuf>,
    /// Events under this directory are build output, not input.
    ignored: PathBuf,
    last_event: Option<Instant>,
    last_rebuild: Option<Instant>,
}

impl Debouncer {
    fn new(ignored: PathBuf) -> Self {
        Self {
            pending: FxHashSet::default(),
            ignored,
            last_event: None,
            last_rebuild: None,
        }
    }

    fn in_cooldown(&self) -> bool {
        self.last_rebuild
            .is_some_and(|t| t.elapsed() < Duration::from_millis(REBUILD_COOLDOWN_MS))
    }

    fn add(&mut self, event: Event) {
        for path in event.paths {
            if !is_temp_file(&path) && !path.starts_with(&self.ignored) {
                self.pending.insert(path);
                self.last_event = Some(Instant::now());
            }
        }
    }

    fn ready(&self) -> bool {
        !self.pending.is_empty()
            && self
                .last_event
                .is_some_and(|t| t.elapsed() >= Duration::from_millis(DEBOUNCE_MS))
    }

    fn take(&mut self) -> Vec<PathBuf> {
        self.last_event = None;
        let mut paths: Vec<_> = self.pending.drain().collect();
        paths.sort();
        paths
    }

    fn mark_rebuild(&mut self) {
        self.last_rebuild = Some(Instant::now());
    }

    fn timeout(&self) -> Duration {
        if self.pending.is_empty() {
            Duration::from_secs(60)
        } else {
            Duration::from_millis(DEBOUNCE_MS)
        }
    }
}

// =============================================================================
// Event Handler
// =============================================================================

/// Re-read loam.toml, keeping CLI overrides.
fn reload_config(current: &LoamConfig) -> Result<LoamConfig> {
    let mut config = LoamConfig::from_path(&current.config_path)?;
    if let Some(cli) = current.cli {
        config.update_with_cli(cli);
    }
    config.validate()?;
    Ok(config)
}

/// Rebuild after a batch of changes. Returns true if the build succeeded.
fn handle_changes(paths: &[PathBuf], config: &mut LoamConfig, builder: &Builder) -> bool {
    let Some(first) = paths.first() else {
        return false;
    };
    let root = config.get_root().to_path_buf();

    if paths.contains(&config.config_path) {
        match reload_config(config) {
            Ok(reloaded) => {
                *config = reloaded;
                log!("watch"; "config changed, rebuilding...");
            }
            Err(err) => {
                log!("watch"; "config reload failed, keeping previous config");
                log!("error"; "{err:#}");
                return false;
            }
        }
    } else if paths.len() == 1 {
        log!("watch"; "{} changed, rebuilding...", rel_path(first, &root));
    } else {
        log!("watch"; "{} files changed, rebuilding...", paths.len());
    }

    match build_site(config, builder) {
        Ok(_) => true,
        Err(err) => {
            log!("watch"; "build failed");
            log!("error"; "{err:#}");
            false
        }
    }
}

// =============================================================================
// Watcher Setup
// =============================================================================

fn setup_watchers(watcher: &mut impl Watcher, config: &LoamConfig) -> Result<()> {
    let root = config.get_root();

    watcher
        .watch(&config.build.content, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch content: {}", config.build.content.display()))?;

    if config.config_path.exists() {
        watcher
            .watch(&config.config_path, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config: {}", config.config_path.display()))?;
    }

    log!(
        "watch";
        "watching {}/, {}",
        rel_path(&config.build.content, root),
        rel_path(&config.config_path, root)
    );
    Ok(())
}

const fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    )
}

// =============================================================================
// Public API
// =============================================================================

/// Start blocking file watcher with debouncing and full rebuilds.
pub fn watch_for_changes_blocking(config: &LoamConfig, builder: &Builder) -> Result<()> {
    let mut config = config.clone();

    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;
    setup_watchers(&mut watcher, &config)?;

    let mut debouncer = Debouncer::new(config.build.output.clone());

    loop {
        match rx.recv_timeout(debouncer.timeout()) {
            Ok(Ok(event)) if is_relevant(&event) && !debouncer.in_cooldown() => {
                debouncer.add(event);
            }
            Ok(Err(e)) => log!("watch"; "error: {e}"),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) if debouncer.ready() => {
                if handle_changes(&debouncer.take(), &mut config, builder) {
                    debouncer.mark_rebuild();
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
            _ => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};
    use std::thread;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |event, path| event.add_path(PathBuf::from(path)))
    }

    #[test]
    fn test_is_temp_file() {
        assert!(is_temp_file(Path::new("content/post.md~")));
        assert!(is_temp_file(Path::new("content/.post.md.swp")));
        assert!(is_temp_file(Path::new("articles/.hello.editorjs.tmp")));
        assert!(is_temp_file(Path::new("content/backup.bak")));
        assert!(!is_temp_file(Path::new("content/post.md")));
        assert!(!is_temp_file(Path::new("articles/hello.meta.json")));
    }

    #[test]
    fn test_is_relevant() {
        assert!(is_relevant(&event(EventKind::Create(CreateKind::File), &[])));
        assert!(is_relevant(&event(EventKind::Modify(ModifyKind::Any), &[])));
        assert!(is_relevant(&event(EventKind::Remove(RemoveKind::File), &[])));
        assert!(!is_relevant(&event(EventKind::Any, &[])));
    }

    #[test]
    fn test_debouncer_filters_paths() {
        let mut debouncer = Debouncer::new(PathBuf::from("/site/.loam"));
        debouncer.add(event(
            EventKind::Modify(ModifyKind::Any),
            &[
                "/site/content/a.md",
                "/site/content/a.md",
                "/site/content/.a.md.swp",
                "/site/.loam/posts.json",
            ],
        ));
        assert_eq!(debouncer.take(), vec![PathBuf::from("/site/content/a.md")]);
    }

    #[test]
    fn test_debouncer_ignored_only_batch_never_ready() {
        let mut debouncer = Debouncer::new(PathBuf::from("/site/.loam"));
        debouncer.add(event(EventKind::Create(CreateKind::File), &["/site/.loam/index.json"]));
        assert!(!debouncer.ready());
        assert_eq!(debouncer.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_debouncer_ready_after_quiet_period() {
        let mut debouncer = Debouncer::new(PathBuf::from("/out"));
        debouncer.add(event(EventKind::Create(CreateKind::File), &["/c/a.md"]));
        assert!(!debouncer.ready());
        assert_eq!(debouncer.timeout(), Duration::from_millis(DEBOUNCE_MS));

        thread::sleep(Duration::from_millis(DEBOUNCE_MS + 50));
        assert!(debouncer.ready());

        let taken = debouncer.take();
        assert_eq!(taken.len(), 1);
        assert!(!debouncer.ready());
    }

    #[test]
    fn test_debouncer_cooldown() {
        let mut debouncer = Debouncer::new(PathBuf::from("/out"));
        assert!(!debouncer.in_cooldown());
        debouncer.mark_rebuild();
        assert!(debouncer.in_cooldown());
    }

    #[test]
    fn test_handle_changes_rebuilds() {
        use std::fs;
        use tempfile::TempDir;

        let dir = TempDir::new().unwrap();
        let content = dir.path().join("content");
        fs::create_dir_all(content.join("data")).unwrap();
        fs::write(content.join("data/team.yaml"), "name: Core\n").unwrap();

        let mut config =
            LoamConfig::from_str("[collections.team]\npattern = \"data/*.yaml\"\nsingle = true\n")
                .unwrap();
        config.build.content = content.clone();
        config.build.output = dir.path().join("out");

        let builder = Builder::new();
        assert!(!handle_changes(&[], &mut config, &builder));
        assert!(handle_changes(&[content.join("data/team.yaml")], &mut config, &builder));
        assert!(builder.latest().is_some());
        assert!(dir.path().join("out/team.json").exists());
    }
}

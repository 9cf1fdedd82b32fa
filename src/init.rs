//! Project initialization.
//!
//! Writes a default `loam.toml` and one sample file per supported format.

use crate::{config::LoamConfig, log};
use anyhow::{Context, Result, bail};
use std::{fs, path::Path};

/// Files to write ignore patterns to
const IGNORE_FILES: &[&str] = &[".gitignore", ".ignore"];

/// Default config filename
pub const CONFIG_FILE: &str = "loam.toml";

/// Default configuration (embedded at compile time)
const DEFAULT_CONFIG: &str = include_str!("embed/loam.toml");

/// Sample content, paths relative to the content directory
const STARTER_CONTENT: &[(&str, &str)] = &[
    (
        "posts/hello-world.md",
        include_str!("embed/content/posts/hello-world.md"),
    ),
    (
        "posts/toml-frontmatter.md",
        include_str!("embed/content/posts/toml-frontmatter.md"),
    ),
    (
        "articles/getting-started.editorjs",
        include_str!("embed/content/articles/getting-started.editorjs"),
    ),
    (
        "articles/getting-started.meta.json",
        include_str!("embed/content/articles/getting-started.meta.json"),
    ),
    (
        "config/site.json5",
        include_str!("embed/content/config/site.json5"),
    ),
    ("data/loam.yaml", include_str!("embed/content/data/loam.yaml")),
    ("data/stats.csv", include_str!("embed/content/data/stats.csv")),
    ("data/v0-1.toml", include_str!("embed/content/data/v0-1.toml")),
    ("pages/about.mdx", include_str!("embed/content/pages/about.mdx")),
    ("html/banner.html", include_str!("embed/content/html/banner.html")),
    (
        "jekyll-posts/2024-02-14-first-entry.md",
        include_str!("embed/content/jekyll-posts/2024-02-14-first-entry.md"),
    ),
];

/// Create a new project with default config and sample content
pub fn new_site(config: &LoamConfig, has_name: bool) -> Result<()> {
    let root = config.get_root();

    // Without a name (init in current dir) the directory must be empty
    if !has_name && !is_dir_empty(root)? {
        bail!(
            "Current directory is not empty. Use `loam init <NAME>` to create in a subdirectory."
        );
    }

    let content = &config.build.content;
    if content.exists() {
        bail!(
            "Path `{}` already exists. Try `loam init <NAME>` instead.",
            content.display()
        );
    }

    fs::create_dir_all(root).with_context(|| format!("Failed to create {}", root.display()))?;
    fs::write(root.join(CONFIG_FILE), DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write {CONFIG_FILE}"))?;
    init_starter_content(content)?;

    let output = config.build.output.strip_prefix(root).unwrap_or(&config.build.output);
    init_ignored_files(root, &[output])?;

    log!("init"; "created {} in {}", CONFIG_FILE, root.display());
    log!("init"; "{} sample files in {}", STARTER_CONTENT.len(), content.display());
    Ok(())
}

/// Check if a directory is completely empty
fn is_dir_empty(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(true);
    }
    Ok(fs::read_dir(path)?.next().is_none())
}

fn init_starter_content(content: &Path) -> Result<()> {
    for (relative, text) in STARTER_CONTENT {
        let path = content.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}

/// Initialize .gitignore and .ignore files with specified paths
fn init_ignored_files(root: &Path, paths: &[&Path]) -> Result<()> {
    let mut content = paths
        .iter()
        .filter_map(|p| p.to_str())
        .map(|p| format!("/{p}"))
        .collect::<Vec<_>>()
        .join("\n");
    content.push('\n');

    for filename in IGNORE_FILES {
        let path = root.join(filename);
        if !path.exists() {
            fs::write(&path, &content)?;
        }
    }

    Ok(())
}

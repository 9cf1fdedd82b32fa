//! Project configuration management for `loam.toml`.
//!
//! # Sections
//!
//! | Section                | Purpose                                      |
//! |------------------------|----------------------------------------------|
//! | `[build]`              | Content and output directories               |
//! | `[serve]`              | Development server (port, interface, watch)  |
//! | `[loaders]`            | Extra extension → format aliases             |
//! | `[collections.<name>]` | Pattern, schema and transforms per collection |
//!
//! # Example
//!
//! ```toml
//! [build]
//! content = "content"
//! output = ".loam"
//!
//! [serve]
//! port = 5277
//!
//! [loaders]
//! markdown = "markdown"
//!
//! [collections.posts]
//! pattern = "posts/**/*.md"
//!
//! [collections.posts.schema]
//! title = { type = "string", max = 99 }
//! ```

mod build;
mod collection;
pub mod defaults;
mod error;
mod serve;

pub use collection::CollectionConfig;
pub use error::ConfigError;

use build::BuildConfig;
use serve::ServeConfig;

use crate::{
    cli::{Cli, Commands},
    collection::CollectionDef,
    content::LoaderRegistry,
    utils::slug::is_safe_segment,
};
use anyhow::{Result, bail};
use educe::Educe;
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing loam.toml
#[derive(Debug, Clone, Educe, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct LoamConfig {
    /// CLI arguments reference
    #[serde(skip)]
    pub cli: Option<&'static Cli>,

    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Build settings
    #[serde(default)]
    pub build: BuildConfig,

    /// Development server settings
    #[serde(default)]
    pub serve: ServeConfig,

    /// Extension aliases: `ext = "format"`
    #[serde(default)]
    pub loaders: BTreeMap<String, String>,

    /// Named collections
    #[serde(default)]
    pub collections: BTreeMap<String, CollectionConfig>,
}

impl LoamConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: LoamConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content)
    }

    /// Get the root directory path
    pub fn get_root(&self) -> &Path {
        self.build.root.as_deref().unwrap_or(Path::new("./"))
    }

    /// Set the root directory path
    pub fn set_root(&mut self, path: &Path) {
        self.build.root = Some(path.to_path_buf())
    }

    /// Directory served by the article API
    pub fn articles_dir(&self) -> PathBuf {
        self.build.content.join(&self.serve.articles)
    }

    /// Loader registry with `[loaders]` aliases applied
    pub fn registry(&self) -> Result<LoaderRegistry, ConfigError> {
        LoaderRegistry::with_aliases(&self.loaders)
    }

    /// Compile every `[collections.<name>]` entry, in name order
    pub fn collection_defs(&self) -> Result<Vec<CollectionDef>, ConfigError> {
        self.collections
            .iter()
            .map(|(name, config)| CollectionDef::from_config(name, config))
            .collect()
    }

    /// Update configuration with CLI arguments
    pub fn update_with_cli(&mut self, cli: &'static Cli) {
        self.cli = Some(cli);

        // Determine the final root path based on command
        let base = cli
            .root
            .as_ref()
            .cloned()
            .unwrap_or_else(|| self.get_root().to_owned());
        let root = match &cli.command {
            Commands::Init { name: Some(name) } => base.join(name),
            _ => base,
        };
        self.update_path_with_root(&root, cli);

        match &cli.command {
            Commands::Build { clean, .. } => {
                self.build.clean |= *clean;
            }
            Commands::Serve {
                interface,
                port,
                watch,
            } => {
                Self::update_option(&mut self.serve.interface, interface.as_ref());
                Self::update_option(&mut self.serve.port, port.as_ref());
                Self::update_option(&mut self.serve.watch, watch.as_ref());
            }
            Commands::Init { .. } => {}
        }
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Update all paths relative to root directory and normalize to absolute paths
    fn update_path_with_root(&mut self, root: &Path, cli: &Cli) {
        // Apply CLI overrides first
        Self::update_option(&mut self.build.content, cli.content.as_ref());
        Self::update_option(&mut self.build.output, cli.output.as_ref());

        // Normalize root to absolute path
        let root = Self::normalize_path(root);
        self.set_root(&root);

        self.config_path = Self::normalize_path(&root.join(&cli.config));
        self.build.content = Self::normalize_path(&root.join(&self.build.content));
        self.build.output = Self::normalize_path(&root.join(&self.build.output));
    }

    /// Normalize a path to absolute, using canonicalize if the path exists
    fn normalize_path(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| {
            // For non-existent paths, manually make them absolute
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()
                    .map(|cwd| cwd.join(path))
                    .unwrap_or_else(|_| path.to_path_buf())
            }
        })
    }

    /// Validate configuration for the current command
    pub fn validate(&self) -> Result<()> {
        if !self.config_path.exists() {
            bail!("Config file not found");
        }

        if !self.build.content.is_dir() {
            bail!(ConfigError::Validation(format!(
                "[build.content] `{}` is not a directory",
                self.build.content.display()
            )));
        }

        if self.build.output == self.build.content || self.build.content.starts_with(&self.build.output) {
            bail!(ConfigError::Validation(
                "[build.output] must not contain the content directory".into()
            ));
        }

        // Output files would be read back as content on the next pass
        if self.build.output.starts_with(&self.build.content) {
            bail!(ConfigError::Validation(
                "[build.output] must not be inside the content directory".into()
            ));
        }

        if self.serve.articles.is_absolute()
            || self
                .serve
                .articles
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            bail!(ConfigError::Validation(
                "[serve.articles] must be a path inside the content directory".into()
            ));
        }

        for name in self.collections.keys() {
            if !is_safe_segment(name) || name == "index" {
                bail!(ConfigError::Validation(format!(
                    "[collections.{name}] name must be a plain file name other than `index`"
                )));
            }
        }

        self.registry()?;
        self.collection_defs()?;

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

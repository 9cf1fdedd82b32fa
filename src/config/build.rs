//! `[build]` section configuration.
//!
//! Where content is read from and where assembled collections are written.

use super::defaults;
use educe::Educe;
use serde::Deserialize;
use std::path::PathBuf;

/// `[build]` section in loam.toml - build pipeline configuration.
///
/// # Example
/// ```toml
/// [build]
/// content = "content"      # Source directory
/// output = ".loam"         # Output directory
/// clean = false            # Remove output before each build
/// ```
#[derive(Debug, Clone, Educe, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Project root directory (usually set via CLI `--root`).
    #[serde(default = "defaults::build::root")]
    #[educe(Default = defaults::build::root())]
    pub root: Option<PathBuf>,

    /// Content source directory. Collection patterns are relative to it.
    #[serde(default = "defaults::build::content")]
    #[educe(Default = defaults::build::content())]
    pub content: PathBuf,

    /// Build output directory.
    #[serde(default = "defaults::build::output")]
    #[educe(Default = defaults::build::output())]
    pub output: PathBuf,

    /// Remove the output directory before each build.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub clean: bool,
}

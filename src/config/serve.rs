//! `[serve]` section configuration.
//!
//! Contains development server settings.

use super::defaults;
use educe::Educe;
use serde::Deserialize;
use std::path::PathBuf;

/// `[serve]` section in loam.toml - development server settings.
///
/// # Example
/// ```toml
/// [serve]
/// interface = "0.0.0.0"  # Listen on all interfaces
/// port = 3000
/// watch = true           # Rebuild on file changes
/// articles = "articles"  # Article API directory, relative to content
/// ```
#[derive(Debug, Clone, Educe, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct ServeConfig {
    /// Network interface to bind.
    /// - `127.0.0.1` (default): localhost only
    /// - `0.0.0.0`: all interfaces (LAN accessible)
    #[serde(default = "defaults::serve::interface")]
    #[educe(Default = defaults::serve::interface())]
    pub interface: String,

    /// HTTP port number (default: 5277).
    #[serde(default = "defaults::serve::port")]
    #[educe(Default = defaults::serve::port())]
    pub port: u16,

    /// Enable file watcher for rebuilds on changes.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub watch: bool,

    /// Directory served by `/api/articles`, relative to the content directory.
    #[serde(default = "defaults::serve::articles")]
    #[educe(Default = defaults::serve::articles())]
    pub articles: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::super::LoamConfig;
    use std::path::PathBuf;

    #[test]
    fn test_serve_config() {
        let config = r#"
            [serve]
            interface = "0.0.0.0"
            port = 8080
            watch = false
            articles = "drafts"
        "#;
        let config: LoamConfig = toml::from_str(config).unwrap();

        assert_eq!(config.serve.interface, "0.0.0.0");
        assert_eq!(config.serve.port, 8080);
        assert!(!config.serve.watch);
        assert_eq!(config.serve.articles, PathBuf::from("drafts"));
    }

    #[test]
    fn test_serve_config_defaults() {
        let config: LoamConfig = toml::from_str("").unwrap();

        assert_eq!(config.serve.interface, "127.0.0.1");
        assert_eq!(config.serve.port, 5277);
        assert!(config.serve.watch);
        assert_eq!(config.serve.articles, PathBuf::from("articles"));
    }

    #[test]
    fn test_unknown_field_rejection() {
        let config = r#"
            [serve]
            unknown_field = "should_fail"
        "#;
        let result: Result<LoamConfig, _> = toml::from_str(config);

        assert!(result.is_err());
    }

    #[test]
    fn test_serve_config_partial_override() {
        let config = r#"
            [serve]
            port = 3000
        "#;
        let config: LoamConfig = toml::from_str(config).unwrap();

        // port is overridden
        assert_eq!(config.serve.port, 3000);
        // interface uses default
        assert_eq!(config.serve.interface, "127.0.0.1");
        // watch uses default
        assert!(config.serve.watch);
    }
}

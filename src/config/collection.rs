//! `[collections.<name>]` section configuration.

use super::defaults;
use crate::schema::{Schema, Transform};
use serde::Deserialize;

/// One named collection in loam.toml.
///
/// # Example
/// ```toml
/// [collections.posts]
/// pattern = "posts/**/*.md"
/// required = true
///
/// [collections.posts.schema]
/// title = { type = "string", max = 99 }
/// slug = { type = "slug" }
///
/// [[collections.posts.transform]]
/// kind = "template"
/// field = "permalink"
/// template = "/blog/{slug}"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionConfig {
    /// Glob relative to the content directory. `*` stays within one
    /// directory, `**` crosses directories.
    pub pattern: String,

    /// Collection is exactly one record instead of a list.
    #[serde(default = "defaults::r#false")]
    pub single: bool,

    /// Fail the build when the pattern matches nothing.
    #[serde(default = "defaults::r#false")]
    pub required: bool,

    /// Take `date` and `slug` from `YYYY-MM-DD-slug.ext` file names.
    #[serde(default = "defaults::r#false")]
    pub filename_date: bool,

    /// Field descriptors. Without a schema, records pass through as loaded.
    #[serde(default)]
    pub schema: Option<Schema>,

    /// Derived fields, applied in order after validation.
    #[serde(default)]
    pub transform: Vec<Transform>,
}

#[cfg(test)]
mod tests {
    use super::super::LoamConfig;
    use crate::schema::Transform;

    #[test]
    fn test_collection_config() {
        let config = r#"
            [collections.posts]
            pattern = "posts/**/*.md"
            required = true

            [collections.posts.schema]
            title = { type = "string", max = 99 }
            slug = { type = "slug" }

            [[collections.posts.transform]]
            kind = "template"
            field = "permalink"
            template = "/blog/{slug}"

            [collections.site]
            pattern = "config/site.json5"
            single = true
        "#;
        let config: LoamConfig = toml::from_str(config).unwrap();

        let posts = &config.collections["posts"];
        assert_eq!(posts.pattern, "posts/**/*.md");
        assert!(posts.required);
        assert!(!posts.single);
        assert!(posts.schema.as_ref().is_some_and(|s| s.contains("title")));
        assert_eq!(
            posts.transform,
            vec![Transform::Template {
                field: "permalink".into(),
                template: "/blog/{slug}".into(),
            }]
        );

        let site = &config.collections["site"];
        assert!(site.single);
        assert!(!site.filename_date);
        assert!(site.schema.is_none());
    }

    #[test]
    fn test_collection_requires_pattern() {
        let result: Result<LoamConfig, _> = toml::from_str("[collections.posts]\nsingle = true\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_field_rejection() {
        let config = r#"
            [collections.posts]
            pattern = "*.md"
            sort = "date"
        "#;
        let result: Result<LoamConfig, _> = toml::from_str(config);
        assert!(result.is_err());
    }
}

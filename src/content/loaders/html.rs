//! HTML documents with an embedded metadata block.
//!
//! ```html
//! <html>
//!   <head><script id="meta">{ title: "Hello", tags: ["a"] }</script></head>
//!   <body><h1>Hello</h1></body>
//! </html>
//! ```
//!
//! The first `<script id="meta">` is parsed as JSON5 and removed from the
//! output. `content` is the inner HTML of `<body>` (whole document when there
//! is no body), copied byte-for-byte from the source apart from the removed
//! block. Metadata fields are merged on top of `content`.

use super::utf8;
use crate::{
    content::Record,
    error::{Location, ParseError},
};
use quick_xml::{Reader, events::Event};
use serde_json::Value;
use std::{ops::Range, path::Path};

/// `id` of the script element holding metadata.
pub const META_SCRIPT_ID: &str = "meta";

/// Byte ranges of interest found in one pass over the document.
#[derive(Debug, Default)]
struct Layout {
    body: Option<Range<usize>>,
    meta_element: Option<Range<usize>>,
    meta_source: Option<Range<usize>>,
}

pub fn load(raw: &[u8], path: &Path) -> Result<Record, ParseError> {
    let text = utf8(raw, path)?;
    let layout = scan(text.as_bytes(), path)?;

    let range = layout.body.clone().unwrap_or(0..text.len());
    let content = match &layout.meta_element {
        Some(meta) if meta.start >= range.start && meta.end <= range.end => {
            format!("{}{}", &text[range.start..meta.start], &text[meta.end..range.end])
        }
        _ => text[range].to_owned(),
    };

    let mut record = Record::new();
    record.insert("content".into(), Value::String(content.trim().to_owned()));

    if let Some(source) = layout.meta_source {
        let meta = super::json5::parse_object(&text[source], path)
            .map_err(|err| ParseError::new(path, format!("invalid meta script: {}", err.message)))?;
        record.extend(meta);
    }

    Ok(record)
}

#[inline]
fn create_reader(content: &[u8]) -> Reader<&[u8]> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(false);
    reader.config_mut().enable_all_checks(false);
    // `AT&T` and `&nbsp` without `;` are common in hand-written HTML
    reader.config_mut().allow_dangling_amp = true;
    reader
}

/// Locate `<body>` and the metadata script.
///
/// `<script>` and `<style>` bodies are raw text and may contain `<` that is
/// not markup, so they are skipped by searching for the closing tag and the
/// reader restarts after it.
fn scan(content: &[u8], path: &Path) -> Result<Layout, ParseError> {
    let mut base = 0;
    let mut reader = create_reader(content);
    let mut layout = Layout::default();
    let mut body_start = None;

    loop {
        let before = base + reader.buffer_position() as usize;
        match reader.read_event() {
            Ok(Event::Start(elem)) => {
                let name = elem.name();
                let local = name.as_ref();
                let after = base + reader.buffer_position() as usize;

                if local.eq_ignore_ascii_case(b"body") {
                    body_start.get_or_insert(after);
                } else if local.eq_ignore_ascii_case(b"script") || local.eq_ignore_ascii_case(b"style") {
                    let is_meta = layout.meta_element.is_none()
                        && local.eq_ignore_ascii_case(b"script")
                        && elem.html_attributes().flatten().any(|attr| {
                            attr.key.as_ref().eq_ignore_ascii_case(b"id")
                                && attr.value.as_ref() == META_SCRIPT_ID.as_bytes()
                        });
                    let (inner_end, element_end) = find_closing_tag(content, after, local)
                        .ok_or_else(|| {
                            ParseError::new(
                                path,
                                format!("unclosed <{}>", String::from_utf8_lossy(local)),
                            )
                            .at(Location::Offset(before))
                        })?;
                    if is_meta {
                        layout.meta_source = Some(after..inner_end);
                        layout.meta_element = Some(before..element_end);
                    }
                    base = element_end;
                    reader = create_reader(&content[base..]);
                }
            }
            Ok(Event::End(elem)) if elem.name().as_ref().eq_ignore_ascii_case(b"body") => {
                if let Some(start) = body_start
                    && layout.body.is_none()
                {
                    layout.body = Some(start..before);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                return Err(ParseError::new(path, err.to_string())
                    .at(Location::Offset(base + reader.error_position() as usize)));
            }
        }
    }

    // Unclosed body runs to the end of the document
    if layout.body.is_none()
        && let Some(start) = body_start
    {
        layout.body = Some(start..content.len());
    }

    Ok(layout)
}

/// Find `</tag>` at or after `from`, ignoring ASCII case.
///
/// Returns the offset of the closing tag and the offset just past it.
fn find_closing_tag(content: &[u8], from: usize, tag: &[u8]) -> Option<(usize, usize)> {
    let needle_len = tag.len() + 2;
    let mut pos = from;
    while pos + needle_len <= content.len() {
        let candidate = &content[pos..pos + needle_len];
        if candidate.starts_with(b"</") && candidate[2..].eq_ignore_ascii_case(tag) {
            let close = content[pos + needle_len..].iter().position(|&b| b == b'>')?;
            return Some((pos, pos + needle_len + close + 1));
        }
        pos += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn load_str(src: &str) -> Record {
        load(src.as_bytes(), Path::new("pages/about.html")).unwrap()
    }

    #[test]
    fn test_meta_and_body() {
        let record = load_str(
            r#"<!DOCTYPE html>
<html>
<head><script id="meta">{ title: "About", tags: ["a", "b"], }</script></head>
<body>
  <h1>About</h1>
  <p>Hello &amp; welcome</p>
</body>
</html>"#,
        );

        assert_eq!(record.get("title"), Some(&json!("About")));
        assert_eq!(record.get("tags"), Some(&json!(["a", "b"])));
        assert_eq!(
            record.get("content"),
            Some(&json!("<h1>About</h1>\n  <p>Hello &amp; welcome</p>"))
        );
    }

    #[test]
    fn test_bare_ampersands_are_kept() {
        let record = load_str("<body><p>AT&T</p> &nbsp<p>R&D; x & y</p></body>");
        assert_eq!(
            record.get("content"),
            Some(&json!("<p>AT&T</p> &nbsp<p>R&D; x & y</p>"))
        );
    }

    #[test]
    fn test_fragment_without_body() {
        let record = load_str(r#"<script id="meta">{"title": "Frag"}</script><p>Only a fragment</p>"#);
        assert_eq!(record.get("title"), Some(&json!("Frag")));
        assert_eq!(record.get("content"), Some(&json!("<p>Only a fragment</p>")));
    }

    #[test]
    fn test_meta_inside_body_is_removed() {
        let record = load_str(
            r#"<body><p>a</p><script id="meta">{draft: true}</script><p>b</p></body>"#,
        );
        assert_eq!(record.get("draft"), Some(&json!(true)));
        assert_eq!(record.get("content"), Some(&json!("<p>a</p><p>b</p>")));
    }

    #[test]
    fn test_no_meta_script() {
        let record = load_str("<body><p>plain</p></body>");
        assert_eq!(record.len(), 1);
        assert_eq!(record.get("content"), Some(&json!("<p>plain</p>")));
    }

    #[test]
    fn test_other_scripts_are_kept_verbatim() {
        let record = load_str(
            r#"<body><script>if (a < b) { go(); }</script><style>p > a {}</style></body>"#,
        );
        assert_eq!(
            record.get("content"),
            Some(&json!("<script>if (a < b) { go(); }</script><style>p > a {}</style>"))
        );
    }

    #[test]
    fn test_only_first_meta_script_is_used() {
        let record = load_str(
            r#"<script id="meta">{n: 1}</script><script id="meta">{n: 2}</script><p>x</p>"#,
        );
        assert_eq!(record.get("n"), Some(&json!(1)));
        assert!(record["content"].as_str().unwrap().contains("{n: 2}"));
    }

    #[test]
    fn test_meta_overrides_content() {
        let record = load_str(r#"<script id="meta">{content: "from meta"}</script><p>x</p>"#);
        assert_eq!(record.get("content"), Some(&json!("from meta")));
    }

    #[test]
    fn test_unquoted_meta_id() {
        let record = load_str("<script id=meta>{a: 1}</script><p>x</p>");
        assert_eq!(record.get("a"), Some(&json!(1)));
    }

    #[test]
    fn test_find_closing_tag_ignores_case() {
        let html = b"<SCRIPT>x</Script >rest";
        assert_eq!(find_closing_tag(html, 8, b"script"), Some((9, 19)));
        assert_eq!(find_closing_tag(html, 8, b"style"), None);
    }

    #[test]
    fn test_unclosed_script_fails() {
        let err = load(b"<body><script>never closed", Path::new("a.html")).unwrap_err();
        assert!(err.message.contains("unclosed"));
    }

    #[test]
    fn test_malformed_meta_fails() {
        let err = load(
            br#"<script id="meta">{ title: </script><p>x</p>"#,
            Path::new("pages/bad.html"),
        )
        .unwrap_err();
        assert_eq!(err.path, Path::new("pages/bad.html"));
        assert!(err.message.contains("meta"));
    }

    #[test]
    fn test_meta_must_be_object() {
        assert!(load(br#"<script id="meta">[1, 2]</script>"#, Path::new("a.html")).is_err());
    }
}

//! Block-editor documents.
//!
//! Input is the editor's saved JSON:
//!
//! ```json
//! {"time": 1700000000000, "blocks": [{"type": "paragraph", "data": {"text": "..."}}]}
//! ```
//!
//! Each block renders to an HTML fragment; fragments are concatenated in
//! block order with no separator and stored as `content`.
//!
//! | Block       | HTML                                              |
//! |-------------|---------------------------------------------------|
//! | `paragraph` | `<p>text</p>`                                     |
//! | `header`    | `<hN>text</hN>` (N = `level`, 1–6, default 2)     |
//! | `list`      | `<ul>`/`<ol>` with `<li>`, nested lists supported |
//! | `code`      | `<pre><code>escaped</code></pre>`                 |
//! | `quote`     | `<blockquote><p>text</p><cite>caption</cite></blockquote>` |
//! | `delimiter` | `<hr>`                                            |
//! | `image`     | `<figure><img ...><figcaption>...</figcaption></figure>` |
//!
//! `text` fields already contain inline HTML from the editor and are written
//! as-is. An unknown block type fails the whole document.

use super::utf8;
use crate::{
    content::{Record, json_type},
    error::{Location, ParseError},
};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct Document {
    blocks: Vec<Block>,
}

#[derive(Debug, Deserialize)]
struct Block {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

pub fn load(raw: &[u8], path: &Path) -> Result<Record, ParseError> {
    let text = utf8(raw, path)?;
    let document: Document = serde_json::from_str(text).map_err(|err| {
        ParseError::new(path, err.to_string()).at(Location::LineColumn {
            line: err.line(),
            column: err.column(),
        })
    })?;

    let html = render_blocks(&document.blocks).map_err(|msg| ParseError::new(path, msg))?;

    let mut record = Record::new();
    record.insert("content".into(), Value::String(html));
    Ok(record)
}

fn render_blocks(blocks: &[Block]) -> Result<String, String> {
    let mut html = String::new();
    for (index, block) in blocks.iter().enumerate() {
        render_block(block, &mut html).map_err(|msg| format!("block {index} ({}): {msg}", block.kind))?;
    }
    Ok(html)
}

fn render_block(block: &Block, out: &mut String) -> Result<(), String> {
    let data = &block.data;
    match block.kind.as_str() {
        "paragraph" => {
            out.push_str("<p>");
            out.push_str(string_field(data, "text")?);
            out.push_str("</p>");
        }
        "header" => {
            let level = match data.get("level") {
                None => 2,
                Some(value) => value
                    .as_u64()
                    .filter(|level| (1..=6).contains(level))
                    .ok_or_else(|| format!("`level` must be 1-6, found {value}"))?,
            };
            out.push_str(&format!("<h{level}>{}</h{level}>", string_field(data, "text")?));
        }
        "list" => {
            let ordered = data.get("style").and_then(Value::as_str) == Some("ordered");
            render_list(array_field(data, "items")?, ordered, out)?;
        }
        "code" => {
            out.push_str("<pre><code>");
            out.push_str(&escape_html(string_field(data, "code")?));
            out.push_str("</code></pre>");
        }
        "quote" => {
            out.push_str("<blockquote><p>");
            out.push_str(string_field(data, "text")?);
            out.push_str("</p>");
            if let Some(caption) = optional_string(data, "caption") {
                out.push_str(&format!("<cite>{caption}</cite>"));
            }
            out.push_str("</blockquote>");
        }
        "delimiter" => out.push_str("<hr>"),
        "image" => {
            let url = data
                .pointer("/file/url")
                .or_else(|| data.get("url"))
                .and_then(Value::as_str)
                .ok_or("missing image `file.url`")?;
            let caption = optional_string(data, "caption");
            out.push_str("<figure>");
            out.push_str(&format!(
                r#"<img src="{}" alt="{}">"#,
                escape_html(url),
                escape_html(&strip_tags(caption.unwrap_or_default()))
            ));
            if let Some(caption) = caption {
                out.push_str(&format!("<figcaption>{caption}</figcaption>"));
            }
            out.push_str("</figure>");
        }
        other => return Err(format!("unsupported block type `{other}`")),
    }
    Ok(())
}

/// Render list items. Items are plain strings or `{content, items}` objects
/// carrying a nested list of the same style.
fn render_list(items: &[Value], ordered: bool, out: &mut String) -> Result<(), String> {
    let tag = if ordered { "ol" } else { "ul" };
    out.push_str(&format!("<{tag}>"));
    for item in items {
        out.push_str("<li>");
        match item {
            Value::String(text) => out.push_str(text),
            Value::Object(_) => {
                out.push_str(string_field(item, "content")?);
                if let Some(children) = item.get("items").and_then(Value::as_array)
                    && !children.is_empty()
                {
                    render_list(children, ordered, out)?;
                }
            }
            other => return Err(format!("list item must be a string or object, found {}", json_type(other))),
        }
        out.push_str("</li>");
    }
    out.push_str(&format!("</{tag}>"));
    Ok(())
}

fn string_field<'a>(data: &'a Value, key: &str) -> Result<&'a str, String> {
    match data.get(key) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(format!("`{key}` must be a string, found {}", json_type(other))),
        None => Err(format!("missing `{key}`")),
    }
}

fn optional_string<'a>(data: &'a Value, key: &str) -> Option<&'a str> {
    data.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn array_field<'a>(data: &'a Value, key: &str) -> Result<&'a [Value], String> {
    match data.get(key) {
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(format!("`{key}` must be an array, found {}", json_type(other))),
        None => Err(format!("missing `{key}`")),
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Drop inline markup so a caption can be used as `alt` text.
fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn content(doc: Value) -> String {
        let raw = serde_json::to_vec(&doc).unwrap();
        let record = load(&raw, Path::new("articles/a.editorjs")).unwrap();
        record["content"].as_str().unwrap().to_owned()
    }

    #[test]
    fn test_paragraph_rendered_once() {
        let html = content(json!({
            "time": 1700000000000u64,
            "blocks": [{"type": "paragraph", "data": {"text": "Start writing..."}}],
        }));
        assert_eq!(html.matches("<p>Start writing...</p>").count(), 1);
    }

    #[test]
    fn test_blocks_concatenate_in_order() {
        let html = content(json!({
            "blocks": [
                {"type": "header", "data": {"text": "Title", "level": 1}},
                {"type": "paragraph", "data": {"text": "Body with <b>bold</b>"}},
                {"type": "delimiter", "data": {}},
            ],
        }));
        assert_eq!(html, "<h1>Title</h1><p>Body with <b>bold</b></p><hr>");
    }

    #[test]
    fn test_header_levels() {
        for level in 1..=4 {
            let html = content(json!({
                "blocks": [{"type": "header", "data": {"text": "H", "level": level}}],
            }));
            assert_eq!(html, format!("<h{level}>H</h{level}>"));
        }

        let html = content(json!({"blocks": [{"type": "header", "data": {"text": "H"}}]}));
        assert_eq!(html, "<h2>H</h2>");
    }

    #[test]
    fn test_header_level_out_of_range() {
        let raw = serde_json::to_vec(&json!({
            "blocks": [{"type": "header", "data": {"text": "H", "level": 9}}],
        }))
        .unwrap();
        assert!(load(&raw, Path::new("a.editorjs")).is_err());
    }

    #[test]
    fn test_lists() {
        let html = content(json!({
            "blocks": [
                {"type": "list", "data": {"style": "unordered", "items": ["a", "b"]}},
                {"type": "list", "data": {"style": "ordered", "items": ["one"]}},
            ],
        }));
        assert_eq!(html, "<ul><li>a</li><li>b</li></ul><ol><li>one</li></ol>");
    }

    #[test]
    fn test_nested_list_items() {
        let html = content(json!({
            "blocks": [{"type": "list", "data": {"style": "unordered", "items": [
                {"content": "parent", "items": [{"content": "child", "items": []}]},
            ]}}],
        }));
        assert_eq!(html, "<ul><li>parent<ul><li>child</li></ul></li></ul>");
    }

    #[test]
    fn test_code_is_escaped() {
        let html = content(json!({
            "blocks": [{"type": "code", "data": {"code": "if a < b && c > d {}"}}],
        }));
        assert_eq!(
            html,
            "<pre><code>if a &lt; b &amp;&amp; c &gt; d {}</code></pre>"
        );
    }

    #[test]
    fn test_quote_with_and_without_caption() {
        let html = content(json!({
            "blocks": [
                {"type": "quote", "data": {"text": "Stay hungry", "caption": "Jobs"}},
                {"type": "quote", "data": {"text": "Anonymous", "caption": ""}},
            ],
        }));
        assert_eq!(
            html,
            "<blockquote><p>Stay hungry</p><cite>Jobs</cite></blockquote>\
             <blockquote><p>Anonymous</p></blockquote>"
        );
    }

    #[test]
    fn test_image_block() {
        let html = content(json!({
            "blocks": [{"type": "image", "data": {
                "file": {"url": "/img/cat.png"},
                "caption": "A <i>cat</i>",
            }}],
        }));
        assert_eq!(
            html,
            r#"<figure><img src="/img/cat.png" alt="A cat"><figcaption>A <i>cat</i></figcaption></figure>"#
        );
    }

    #[test]
    fn test_unknown_block_fails_whole_document() {
        let raw = serde_json::to_vec(&json!({
            "blocks": [
                {"type": "paragraph", "data": {"text": "ok"}},
                {"type": "carousel", "data": {}},
            ],
        }))
        .unwrap();
        let err = load(&raw, Path::new("articles/a.editorjs")).unwrap_err();
        assert!(err.message.contains("block 1"));
        assert!(err.message.contains("carousel"));
    }

    #[test]
    fn test_missing_blocks_key() {
        let err = load(br#"{"time": 1}"#, Path::new("a.editorjs")).unwrap_err();
        assert!(err.message.contains("blocks"));
    }

    #[test]
    fn test_malformed_json() {
        let err = load(b"{\"blocks\": [", Path::new("a.editorjs")).unwrap_err();
        assert!(err.location.is_some());
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(content(json!({"blocks": []})), "");
    }
}

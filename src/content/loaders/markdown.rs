//! Markdown with frontmatter.
//!
//! # Layout
//!
//! ```text
//! ---                  ← YAML frontmatter (or `+++` for TOML)
//! title: Hello
//! ---
//! # Heading            ← body, rendered with pulldown-cmark
//! First paragraph.
//! ```
//!
//! # Output
//!
//! | Field      | Value                                              |
//! |------------|----------------------------------------------------|
//! | *(front)*  | every frontmatter key                              |
//! | `content`  | rendered HTML, headings carry `id` anchors         |
//! | `excerpt`  | plain text of the first paragraph, or `null`       |
//! | `toc`      | `[{depth, title, anchor}]` in document order       |
//! | `metadata` | `{readingTime, wordCount}` of the raw body         |

use super::utf8;
use crate::{
    content::Record,
    error::ParseError,
    utils::slug::slugify_anchor,
};
use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, TagEnd, html};
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::{Value, json};
use std::path::Path;

/// Words per minute used for `readingTime`.
const WORDS_PER_MINUTE: usize = 200;

/// One heading in the document outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocEntry {
    pub depth: u8,
    pub title: String,
    pub anchor: String,
}

enum Frontmatter<'a> {
    Yaml(&'a str),
    Toml(&'a str),
}

pub fn load(raw: &[u8], path: &Path) -> Result<Record, ParseError> {
    let text = utf8(raw, path)?;
    let (front, body) = split_frontmatter(text);

    // The opening fence occupies line 1
    let mut record = match front {
        Some(Frontmatter::Yaml(src)) => {
            super::yaml::parse_mapping(src, path).map_err(|err| err.offset_lines(1))?
        }
        Some(Frontmatter::Toml(src)) => super::toml::parse_table(src, path)?,
        None => Record::new(),
    };

    let rendered = render(body);
    let words = body.split_whitespace().count();

    record.insert("content".into(), Value::String(rendered.html));
    record.insert(
        "excerpt".into(),
        rendered.excerpt.map_or(Value::Null, Value::String),
    );
    record.insert("toc".into(), json!(rendered.toc));
    record.insert(
        "metadata".into(),
        json!({
            "readingTime": words.div_ceil(WORDS_PER_MINUTE),
            "wordCount": words,
        }),
    );
    Ok(record)
}

// ============================================================================
// Frontmatter
// ============================================================================

/// Split a leading fenced block from the body.
///
/// The fence must be alone on the first line. An unclosed fence is treated as
/// body text (a leading `---` is also a thematic break in markdown).
fn split_frontmatter(text: &str) -> (Option<Frontmatter<'_>>, &str) {
    for fence in ["---", "+++"] {
        let Some(rest) = text.strip_prefix(fence) else {
            continue;
        };
        let Some(rest) = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n')) else {
            continue;
        };
        if let Some((inner, body)) = find_closing_fence(rest, fence) {
            let front = if fence == "---" {
                Frontmatter::Yaml(inner)
            } else {
                Frontmatter::Toml(inner)
            };
            return (Some(front), body);
        }
    }
    (None, text)
}

fn find_closing_fence<'a>(rest: &'a str, fence: &str) -> Option<(&'a str, &'a str)> {
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == fence {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

// ============================================================================
// Rendering
// ============================================================================

struct Rendered {
    html: String,
    excerpt: Option<String>,
    toc: Vec<TocEntry>,
}

fn render(body: &str) -> Rendered {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_HEADING_ATTRIBUTES;

    let mut events: Vec<Event<'_>> = Parser::new_ext(body, options).collect();
    let toc = assign_heading_anchors(&mut events);
    let excerpt = first_paragraph(&events);

    let mut out = String::with_capacity(body.len() * 3 / 2);
    html::push_html(&mut out, events.into_iter());

    Rendered {
        html: out,
        excerpt,
        toc,
    }
}

/// Give every heading an `id` and collect the outline.
///
/// Explicit `{#id}` attributes are kept; otherwise the anchor is the slugified
/// heading text, with `-1`, `-2`, ... appended to repeats.
fn assign_heading_anchors(events: &mut [Event<'_>]) -> Vec<TocEntry> {
    let mut toc = Vec::new();
    let mut seen: FxHashMap<String, usize> = FxHashMap::default();
    let mut i = 0;

    while i < events.len() {
        let Event::Start(Tag::Heading { level, id, .. }) = &events[i] else {
            i += 1;
            continue;
        };
        let depth = *level as u8;
        let explicit = id.as_ref().map(|id| id.to_string());
        let start = i;

        let mut title = String::new();
        i += 1;
        while i < events.len() && !matches!(events[i], Event::End(TagEnd::Heading(_))) {
            if let Event::Text(text) | Event::Code(text) = &events[i] {
                title.push_str(text);
            }
            i += 1;
        }

        let anchor = match explicit {
            Some(anchor) => {
                *seen.entry(anchor.clone()).or_default() += 1;
                anchor
            }
            None => unique_anchor(slugify_anchor(&title), &mut seen),
        };
        if let Event::Start(Tag::Heading { id, .. }) = &mut events[start] {
            *id = Some(CowStr::from(anchor.clone()));
        }

        toc.push(TocEntry {
            depth,
            title: title.trim().to_owned(),
            anchor,
        });
        i += 1;
    }

    toc
}

fn unique_anchor(base: String, seen: &mut FxHashMap<String, usize>) -> String {
    let count = seen.entry(base.clone()).or_default();
    let anchor = if *count == 0 {
        base
    } else {
        format!("{base}-{count}")
    };
    *count += 1;
    anchor
}

/// Plain text of the first paragraph.
fn first_paragraph(events: &[Event<'_>]) -> Option<String> {
    let start = events
        .iter()
        .position(|e| matches!(e, Event::Start(Tag::Paragraph)))?;

    let mut text = String::new();
    for event in &events[start + 1..] {
        match event {
            Event::End(TagEnd::Paragraph) => break,
            Event::Text(t) | Event::Code(t) => text.push_str(t),
            Event::SoftBreak | Event::HardBreak => text.push(' '),
            _ => {}
        }
    }

    let text = text.trim();
    (!text.is_empty()).then(|| text.to_owned())
}

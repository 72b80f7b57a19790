// src/pipeline/markdown.rs

//! Markdown docs -> JSON documents consumed by the docs site.

use async_trait::async_trait;
use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd, html};
use serde::Serialize;

use crate::errors::{KitforgeError, Result};
use crate::pipeline::{FileRecord, Step};

/// Heading entry of a converted document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocEntry {
    pub level: u8,
    pub text: String,
    pub id: String,
}

/// JSON shape of a converted markdown file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkdownDoc {
    pub name: String,
    pub title: Option<String>,
    pub toc: Vec<TocEntry>,
    pub html: String,
}

fn options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS
}

fn level_number(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Lowercase, alphanumeric words joined by `-`.
fn slugify(text: &str) -> String {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Convert one markdown document.
pub fn convert(name: &str, source: &str) -> MarkdownDoc {
    let mut toc = Vec::new();
    let mut heading: Option<(u8, String)> = None;

    for event in Parser::new_ext(source, options()) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                heading = Some((level_number(level), String::new()));
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some((_, ref mut buf)) = heading {
                    buf.push_str(&text);
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((level, text)) = heading.take() {
                    let id = slugify(&text);
                    toc.push(TocEntry { level, text, id });
                }
            }
            _ => {}
        }
    }

    let mut html_output = String::new();
    html::push_html(&mut html_output, Parser::new_ext(source, options()));

    MarkdownDoc {
        name: name.to_string(),
        title: toc.iter().find(|e| e.level == 1).map(|e| e.text.clone()),
        toc,
        html: html_output,
    }
}

/// Convert `.md` records into pretty-printed `.json` records.
#[derive(Debug, Clone, Default)]
pub struct MarkdownToJson;

#[async_trait]
impl Step for MarkdownToJson {
    fn name(&self) -> &str {
        "markdown-to-json"
    }

    async fn apply(&self, records: Vec<FileRecord>) -> Result<Vec<FileRecord>> {
        records
            .into_iter()
            .map(|mut record| {
                let name = record
                    .relative
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let source = record.text().ok_or_else(|| {
                    KitforgeError::config(format!(
                        "markdown file {} is not UTF-8",
                        record.relative.display()
                    ))
                })?;
                let doc = convert(&name, source);
                record.contents = serde_json::to_vec_pretty(&doc)?;
                record.relative.set_extension("json");
                Ok(record)
            })
            .collect()
    }
}

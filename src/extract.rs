//! Text extraction for local documents and fetched HTML.
//!
//! Local files are read by extension (`.txt`/`.md` as UTF-8, `.pdf` via
//! `pdf-extract`). HTML pages are reduced to text blocks with a
//! recorded provenance: which CSS selector or tag filter produced each
//! block, or `fallback` when the whole `<body>` was taken.

use std::fs;
use std::path::Path;

use scraper::{Html, Selector};

use crate::error::{Error, Result};

/// File extensions the document ingester accepts.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "pdf"];

/// How a block of page text was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractMethod {
    /// Matched one of the configured CSS selectors.
    Selector,
    /// Matched one of the configured tag names.
    Tag,
    /// No selector or tag configured (or none matched): whole body text.
    Fallback,
}

impl ExtractMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractMethod::Selector => "selector",
            ExtractMethod::Tag => "tag",
            ExtractMethod::Fallback => "fallback",
        }
    }
}

/// One extracted block plus the rule that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedBlock {
    pub text: String,
    pub method: ExtractMethod,
    /// The selector or tag that matched; "body" for fallback.
    pub pattern: String,
}

/// Read a local document as plain text, dispatching on extension.
/// Unsupported extensions are the caller's job to filter out; reaching
/// here with one is an error.
pub fn extract_file(path: &Path) -> Result<String> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "txt" | "md" => Ok(fs::read_to_string(path)?),
        "pdf" => {
            let bytes = fs::read(path)?;
            pdf_extract::extract_text_from_mem(&bytes).map_err(|e| Error::Extract {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        }
        other => Err(Error::Extract {
            path: path.to_path_buf(),
            reason: format!("unsupported extension: {:?}", other),
        }),
    }
}

/// Capability for turning a fetched HTML page into text blocks. The
/// crawler depends only on this interface.
pub trait ContentExtractor {
    fn extract(&self, html: &str) -> Vec<ExtractedBlock>;
}

/// Extracts the whole `<body>` as one block.
#[derive(Debug, Default)]
pub struct BodyExtractor;

impl ContentExtractor for BodyExtractor {
    fn extract(&self, html: &str) -> Vec<ExtractedBlock> {
        let document = Html::parse_document(html);
        let mut blocks = Vec::new();
        if let Ok(body) = Selector::parse("body") {
            if let Some(element) = document.select(&body).next() {
                push_block(
                    &mut blocks,
                    element_text(&element),
                    ExtractMethod::Fallback,
                    "body",
                );
            }
        }
        blocks
    }
}

/// Extracts via tag filters first, then CSS selectors, each match one
/// block in document order. When neither list matches anything (or
/// both are empty), degrades to [`BodyExtractor`].
#[derive(Debug)]
pub struct SelectorExtractor {
    selectors: Vec<String>,
    tags: Vec<String>,
}

impl SelectorExtractor {
    pub fn new(selectors: Vec<String>, tags: Vec<String>) -> Self {
        Self { selectors, tags }
    }
}

impl ContentExtractor for SelectorExtractor {
    fn extract(&self, html: &str) -> Vec<ExtractedBlock> {
        let document = Html::parse_document(html);
        let mut blocks = Vec::new();

        for tag in &self.tags {
            let Ok(selector) = Selector::parse(tag) else {
                tracing::warn!(tag = %tag, "skipping unparseable tag filter");
                continue;
            };
            for element in document.select(&selector) {
                push_block(&mut blocks, element_text(&element), ExtractMethod::Tag, tag);
            }
        }

        for raw in &self.selectors {
            let Ok(selector) = Selector::parse(raw) else {
                tracing::warn!(selector = %raw, "skipping unparseable CSS selector");
                continue;
            };
            for element in document.select(&selector) {
                push_block(
                    &mut blocks,
                    element_text(&element),
                    ExtractMethod::Selector,
                    raw,
                );
            }
        }

        if blocks.is_empty() {
            return BodyExtractor.extract(html);
        }
        blocks
    }
}

fn element_text(element: &scraper::ElementRef) -> String {
    let joined: String = element.text().collect::<Vec<_>>().join(" ");
    // Collapse runs of whitespace left behind by markup.
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn push_block(blocks: &mut Vec<ExtractedBlock>, text: String, method: ExtractMethod, pattern: &str) {
    if text.is_empty() {
        return;
    }
    blocks.push(ExtractedBlock {
        text,
        method,
        pattern: pattern.to_string(),
    });
}

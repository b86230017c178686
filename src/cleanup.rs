//! Cleanup of raw extracted text.
//!
//! The extraction stage emits one JSON node per element (`Text`, `Page`,
//! `Path`, ...). Before an element becomes a paragraph its text goes through
//! [`clean_text`], which strips table-of-contents leaders and drops elements
//! that carry no presentable content (page numbers, blank lines).

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Runs of three or more dots/underscores (dot leaders in tables of contents).
static LEADER_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[_.]{3,}").expect("static regex"));

/// A single-line table-of-contents entry: a label ending in a leader of four
/// or more characters, followed by an optional page number. A leader set off
/// by a space needs the page number, so blank form fields (`Signature: ____`)
/// are not entries. Three dots alone are an ellipsis.
static TOC_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\n]*[^\s_.](?:[_.]{4,}[ \t]*\d*|[ \t]+[_.]{4,}[ \t]*\d+)\s*$")
        .expect("static regex")
});

/// Turn raw extracted text into presentation text, or `None` if nothing is left.
///
/// Rules, in order:
/// 1. a single-line element shaped like `Chapter 1.......... 7` is a
///    table-of-contents entry and is dropped; elsewhere leader runs are deleted
/// 2. trailing whitespace is stripped
/// 3. purely numeric text (page numbers, footnote markers) is dropped
/// 4. empty text is dropped
pub fn clean_text(raw: &str) -> Option<String> {
    if TOC_ENTRY.is_match(raw) {
        return None;
    }

    let without_leaders = LEADER_RUN.replace_all(raw, "");
    let result = without_leaders.trim_end();

    if is_numeric(result) {
        return None;
    }

    if result.is_empty() || result == "\n" {
        return None;
    }

    Some(result.to_string())
}

fn is_numeric(text: &str) -> bool {
    !text.is_empty() && text.chars().all(char::is_numeric)
}

/// One element from the extraction output, before it is grouped into sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterimElement {
    /// The raw JSON node as emitted by the extractor.
    pub raw: serde_json::Value,
    /// Whether the element sits next to a table or figure instead of body flow.
    pub is_aside: bool,
    /// Element path without the `//Document` prefix.
    pub path: String,
}

impl InterimElement {
    pub fn new(raw: serde_json::Value, is_aside: bool, path: impl Into<String>) -> Self {
        Self {
            raw,
            is_aside,
            path: path.into(),
        }
    }

    /// Cleaned text of the element, `None` when the element has no usable text.
    pub fn text(&self) -> Option<String> {
        self.raw
            .get("Text")
            .and_then(|t| t.as_str())
            .and_then(clean_text)
    }

    /// Page the element was found on.
    pub fn page(&self) -> Option<u32> {
        self.raw
            .get("Page")
            .and_then(|p| p.as_u64())
            .and_then(|p| u32::try_from(p).ok())
    }

    /// Full extractor path (e.g. `//Document/Sect[2]/H1`).
    pub fn full_path(&self) -> Option<&str> {
        self.raw.get("Path").and_then(|p| p.as_str())
    }
}

//! Paragraph-level content of a section.
//!
//! Each paragraph remembers where its text came from in the extracted PDF.
//! Table paragraphs hold the extractor's CSV rendition of the table and are
//! presented as Markdown.

use crate::error::{Result, SectionQaError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Origin of a paragraph's text in the source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TextOrigin {
    /// Text came from the table of contents.
    Toc,
    /// A regular paragraph of text.
    Paragraph,
    /// Text came from within a list of items.
    List,
    /// Text came from a table (usually the entire table as CSV).
    Table,
    /// Text came from a figure.
    Figure,
}

impl fmt::Display for TextOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TextOrigin::Toc => "TOC",
            TextOrigin::Paragraph => "PARAGRAPH",
            TextOrigin::List => "LIST",
            TextOrigin::Table => "TABLE",
            TextOrigin::Figure => "FIGURE",
        };
        f.write_str(name)
    }
}

/// A unit of body content within a section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    /// Text as delivered by the extractor.
    pub raw_text: String,
    /// Structural origin of the text.
    pub origin: TextOrigin,
    /// Whether the paragraph sits next to a table or figure instead of body flow.
    #[serde(default)]
    pub aside: bool,
}

impl Paragraph {
    /// Create a new paragraph.
    pub fn new(raw_text: impl Into<String>, origin: TextOrigin) -> Self {
        Self {
            raw_text: raw_text.into(),
            origin,
            aside: false,
        }
    }

    /// Mark the paragraph as an aside.
    pub fn aside(mut self) -> Self {
        self.aside = true;
        self
    }

    /// Presentation text: tables become Markdown, everything else is returned as-is.
    pub fn text(&self) -> Result<String> {
        match self.origin {
            TextOrigin::Table => csv_to_markdown(&self.raw_text),
            _ => Ok(self.raw_text.clone()),
        }
    }
}

/// Render comma-separated rows (first row is the header) as a Markdown table.
pub fn csv_to_markdown(raw: &str) -> Result<String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .trim(csv::Trim::All)
        .from_reader(raw.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| SectionQaError::MalformedTable(format!("unreadable header row: {}", e)))?
        .iter()
        .map(escape_cell)
        .collect();

    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(SectionQaError::MalformedTable(
            "table has no header row".to_string(),
        ));
    }

    let mut lines = vec![
        format!("| {} |", headers.join(" | ")),
        format!("|{}", " --- |".repeat(headers.len())),
    ];

    for (i, record) in reader.records().enumerate() {
        let record = record
            .map_err(|e| SectionQaError::MalformedTable(format!("row {}: {}", i + 1, e)))?;
        let cells: Vec<String> = record.iter().map(escape_cell).collect();
        lines.push(format!("| {} |", cells.join(" | ")));
    }

    Ok(lines.join("\n"))
}

fn escape_cell(cell: &str) -> String {
    cell.replace('|', "\\|").replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_paragraph_text_is_unchanged() {
        let p = Paragraph::new("  Some text \n", TextOrigin::Paragraph);
        assert_eq!(p.text().unwrap(), "  Some text \n");
        assert!(!p.aside);
    }

    #[test]
    fn test_table_paragraph_renders_markdown() {
        let p = Paragraph::new("Year,Revenue\n2022,10\n2023,12\n", TextOrigin::Table).aside();
        let expected = "| Year | Revenue |\n| --- | --- |\n| 2022 | 10 |\n| 2023 | 12 |";
        assert_eq!(p.text().unwrap(), expected);
        assert!(p.aside);
    }

    #[test]
    fn test_table_cells_are_escaped() {
        let md = csv_to_markdown("a,b\n\"x|y\",\"multi\nline\"").unwrap();
        assert!(md.contains("x\\|y"));
        assert!(md.contains("multi line"));
    }

    #[test]
    fn test_header_only_table() {
        let md = csv_to_markdown("a,b").unwrap();
        assert_eq!(md, "| a | b |\n| --- | --- |");
    }

    #[test]
    fn test_ragged_table_is_malformed() {
        let p = Paragraph::new("a,b\n1,2,3", TextOrigin::Table);
        assert!(matches!(p.text(), Err(SectionQaError::MalformedTable(_))));
    }

    #[test]
    fn test_empty_table_is_malformed() {
        assert!(matches!(
            csv_to_markdown(""),
            Err(SectionQaError::MalformedTable(_))
        ));
    }

    #[test]
    fn test_origin_serialization() {
        let json = serde_json::to_string(&TextOrigin::Toc).unwrap();
        assert_eq!(json, "\"TOC\"");
        let origin: TextOrigin = serde_json::from_str("\"FIGURE\"").unwrap();
        assert_eq!(origin, TextOrigin::Figure);
        assert_eq!(TextOrigin::List.to_string(), "LIST");
    }
}

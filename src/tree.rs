//! Section tree for an extracted document.
//!
//! The tree is built by the extraction stage: every heading opens a
//! [`Section`], body content becomes [`Paragraph`]s, and nested headings become
//! subsections. This module only reads the tree.
//!
//! Sections own their subsections. The upward link is the parent's id, which
//! [`Document`] resolves on demand, so there is no ownership cycle.

use crate::document::Paragraph;
use crate::error::{Result, SectionQaError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

/// Id of the document root.
pub const ROOT_ID: &str = "root";

/// Section type of the document root.
pub const DOCUMENT_TYPE: &str = "document";

/// Leading section numbering such as `3.2.1` or `4.`.
static SECTION_NUMBERING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+\.?)+").expect("static regex"));

/// A heading-delimited region of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Unique id used to cross-reference summaries and tool output (e.g. "1.1.1").
    pub id: String,

    /// Heading text, numbering included.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Pages the section's content spans.
    #[serde(default)]
    pub pages: BTreeSet<u32>,

    /// Category assigned by the tree builder; `"document"` for the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_type: Option<String>,

    /// Body content in reading order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paragraphs: Vec<Paragraph>,

    /// Child sections in document order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subsections: Vec<Section>,

    #[serde(skip)]
    parent_id: Option<String>,
}

impl Section {
    /// Create a new section.
    pub fn new(id: impl Into<String>, title: Option<&str>) -> Self {
        Self {
            id: id.into(),
            title: title.map(str::to_string),
            pages: BTreeSet::new(),
            section_type: None,
            paragraphs: Vec::new(),
            subsections: Vec::new(),
            parent_id: None,
        }
    }

    /// Set the pages this section spans.
    pub fn with_pages(mut self, pages: impl IntoIterator<Item = u32>) -> Self {
        self.pages = pages.into_iter().collect();
        self
    }

    /// Set the section type.
    pub fn with_type(mut self, section_type: impl Into<String>) -> Self {
        self.section_type = Some(section_type.into());
        self
    }

    /// Append a paragraph.
    pub fn with_paragraph(mut self, paragraph: Paragraph) -> Self {
        self.paragraphs.push(paragraph);
        self
    }

    /// Append a subsection, pointing its parent link at this section.
    pub fn with_subsection(mut self, subsection: Section) -> Self {
        self.add_subsection(subsection);
        self
    }

    /// Append a subsection, pointing its parent link at this section.
    pub fn add_subsection(&mut self, mut subsection: Section) {
        subsection.parent_id = Some(self.id.clone());
        self.subsections.push(subsection);
    }

    /// Id of the owning section, if any.
    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    /// Check if this section has subsections.
    pub fn has_subsections(&self) -> bool {
        !self.subsections.is_empty()
    }

    /// First page of the section, if it spans any.
    pub fn starting_page(&self) -> Option<u32> {
        self.pages.first().copied()
    }

    /// Title without its leading numbering ("3.2.1 Introduction" -> "Introduction").
    pub fn title_clean(&self) -> Option<String> {
        self.title
            .as_deref()
            .map(|title| SECTION_NUMBERING.replace(title, "").trim_start().to_string())
    }

    /// Full presentation text of the section's own paragraphs.
    ///
    /// Fails if a table paragraph is not valid CSV.
    pub fn text(&self) -> Result<String> {
        let mut parts = Vec::with_capacity(self.paragraphs.len());
        for paragraph in &self.paragraphs {
            let text = paragraph.text()?;
            if !text.is_empty() {
                parts.push(text);
            }
        }
        Ok(parts.join("\n"))
    }

    /// Recursively count all sections in this subtree (including self).
    pub fn node_count(&self) -> usize {
        1 + self
            .subsections
            .iter()
            .map(|s| s.node_count())
            .sum::<usize>()
    }

    /// Find a section by id in this subtree.
    pub fn find(&self, id: &str) -> Option<&Section> {
        if self.id == id {
            return Some(self);
        }
        self.subsections.iter().find_map(|s| s.find(id))
    }

    fn collect_preorder<'a>(&'a self, out: &mut Vec<&'a Section>) {
        for child in &self.subsections {
            out.push(child);
            child.collect_preorder(out);
        }
    }

    fn link_parents(&mut self) {
        let id = self.id.clone();
        for child in self.subsections.iter_mut() {
            child.parent_id = Some(id.clone());
            child.link_parents();
        }
    }

    /// Format the subtree as an indented outline.
    pub fn format_tree(&self, indent: usize) -> String {
        let prefix = "  ".repeat(indent);
        let title = self.title_clean().unwrap_or_else(|| "(untitled)".to_string());
        let pages = match (self.pages.first(), self.pages.last()) {
            (Some(first), Some(last)) if first == last => format!("page {}", first),
            (Some(first), Some(last)) => format!("pages {}-{}", first, last),
            _ => "no pages".to_string(),
        };

        let mut result = format!("{}{} {} [{}]\n", prefix, self.id, title, pages);
        for child in &self.subsections {
            result.push_str(&child.format_tree(indent + 1));
        }
        result
    }
}

/// Root of a section tree.
///
/// Construction links every parent reference and rejects trees whose ids are
/// empty or not unique, since ids are the only key shared by the tree, the
/// summary mapping and the model's tool calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Section", into = "Section")]
pub struct Document {
    root: Section,
}

impl Document {
    /// Create a document from its top-level sections.
    pub fn new(title: Option<&str>, subsections: Vec<Section>) -> Result<Self> {
        let mut root = Section::new(ROOT_ID, title).with_type(DOCUMENT_TYPE);
        root.subsections = subsections;
        Self::from_root(root)
    }

    /// Wrap an already built root section.
    pub fn from_root(mut root: Section) -> Result<Self> {
        if root.id != ROOT_ID {
            return Err(SectionQaError::InvalidTree(format!(
                "root section must have id '{}', found '{}'",
                ROOT_ID, root.id
            )));
        }
        if root.section_type.as_deref() != Some(DOCUMENT_TYPE) {
            return Err(SectionQaError::InvalidTree(format!(
                "root section must have type '{}'",
                DOCUMENT_TYPE
            )));
        }

        let mut seen = HashSet::new();
        seen.insert(ROOT_ID.to_string());
        let mut all = Vec::new();
        root.collect_preorder(&mut all);
        for section in all {
            if section.id.is_empty() {
                return Err(SectionQaError::InvalidTree(format!(
                    "section {:?} has an empty id",
                    section.title
                )));
            }
            if !seen.insert(section.id.clone()) {
                return Err(SectionQaError::DuplicateSectionId(section.id.clone()));
            }
        }

        root.parent_id = None;
        root.link_parents();
        Ok(Self { root })
    }

    /// Document title.
    pub fn title(&self) -> Option<&str> {
        self.root.title.as_deref()
    }

    /// The root section (id [`ROOT_ID`], type [`DOCUMENT_TYPE`]).
    pub fn root(&self) -> &Section {
        &self.root
    }

    /// Top-level sections in document order.
    pub fn subsections(&self) -> &[Section] {
        &self.root.subsections
    }

    /// All sections below the root, parents before children, siblings in order.
    pub fn sections(&self) -> Vec<&Section> {
        let mut out = Vec::new();
        self.root.collect_preorder(&mut out);
        out
    }

    /// Find a section (or the root) by id.
    pub fn find(&self, id: &str) -> Option<&Section> {
        self.root.find(id)
    }

    /// Find a section by id, failing if it is not in the tree.
    pub fn get(&self, id: &str) -> Result<&Section> {
        self.find(id)
            .ok_or_else(|| SectionQaError::UnknownSectionId(id.to_string()))
    }

    /// The section owning `section`, `None` for the root.
    pub fn parent_of(&self, section: &Section) -> Option<&Section> {
        section.parent_id().and_then(|id| self.find(id))
    }

    /// Owners of `section` from nearest to the root.
    pub fn ancestors(&self, section: &Section) -> Vec<&Section> {
        let mut out = Vec::new();
        let mut current = self.parent_of(section);
        while let Some(parent) = current {
            out.push(parent);
            current = self.parent_of(parent);
        }
        out
    }

    /// Number of sections below the root.
    pub fn node_count(&self) -> usize {
        self.root.node_count() - 1
    }

    /// Maximum depth below the root (0 for a document without sections).
    pub fn max_depth(&self) -> usize {
        fn depth(section: &Section) -> usize {
            1 + section.subsections.iter().map(depth).max().unwrap_or(0)
        }

        self.root.subsections.iter().map(depth).max().unwrap_or(0)
    }

    /// Format the entire tree for display.
    pub fn format(&self) -> String {
        let mut result = format!(
            "Document: {} ({} sections)\n",
            self.title().unwrap_or("(untitled)"),
            self.node_count()
        );
        result.push_str(&"─".repeat(50));
        result.push('\n');

        for section in &self.root.subsections {
            result.push_str(&section.format_tree(0));
        }

        result
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.root)?)
    }

    /// Parse from JSON string, validating ids and linking parents.
    pub fn from_json(json: &str) -> Result<Self> {
        let root: Section = serde_json::from_str(json)?;
        Self::from_root(root)
    }
}

impl TryFrom<Section> for Document {
    type Error = SectionQaError;

    fn try_from(root: Section) -> Result<Self> {
        Self::from_root(root)
    }
}

impl From<Document> for Section {
    fn from(document: Document) -> Self {
        document.root
    }
}

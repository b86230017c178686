//! Structured metadata: the section tree annotated with per-section summaries.

use crate::error::{Result, SectionQaError};
use crate::tree::{Document, Section};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Section id -> summary. `None` for sections without extractable text.
pub type SummaryMapping = BTreeMap<String, Option<String>>;

/// Metadata record of the document root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredMetadata {
    pub title: Option<String>,
    pub sections: Vec<SectionMetadata>,
}

/// Metadata record of one section below the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionMetadata {
    /// Title without numbering.
    pub title: Option<String>,
    pub id: String,
    /// Pages in ascending order.
    pub pages: Vec<u32>,
    pub summary: Option<String>,
    /// Absent (not empty) for leaf sections.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<SectionMetadata>,
}

impl StructuredMetadata {
    /// Project a document and its summaries into nested metadata, pre-order.
    ///
    /// Every section below the root must have an entry in `summaries`, even
    /// if that entry is `None`.
    pub fn project(document: &Document, summaries: &SummaryMapping) -> Result<Self> {
        let sections = document
            .subsections()
            .iter()
            .map(|s| SectionMetadata::project(s, summaries))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            title: document.title().map(str::to_string),
            sections,
        })
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl SectionMetadata {
    fn project(section: &Section, summaries: &SummaryMapping) -> Result<Self> {
        let summary = summaries
            .get(&section.id)
            .ok_or_else(|| SectionQaError::MissingSummary(section.id.clone()))?
            .clone();

        let sections = section
            .subsections
            .iter()
            .map(|s| Self::project(s, summaries))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            title: section.title_clean(),
            id: section.id.clone(),
            pages: section.pages.iter().copied().collect(),
            summary,
            sections,
        })
    }

    /// Number of records in this subtree (including self).
    pub fn node_count(&self) -> usize {
        1 + self.sections.iter().map(|s| s.node_count()).sum::<usize>()
    }
}

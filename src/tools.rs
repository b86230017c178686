//! Functions the model may call while answering a question.
//!
//! The registered set is closed: [`ToolInvocation`] has one variant per
//! function, and a call naming anything else is rejected when the model's
//! output is parsed.

use crate::error::{Result, SectionQaError};
use crate::llm::{FunctionCall, FunctionSpec};
use crate::metadata::SummaryMapping;
use crate::tree::Document;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Name under which the section fetch function is declared.
pub const FETCH_SECTIONS: &str = "fetch_sections";

/// Arguments of a `fetch_sections` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSectionsArgs {
    /// Why the model picked these sections. Not used for fetching.
    pub reasoning: String,
    /// Exact ids of the sections to fetch.
    pub section_ids: Vec<String>,
}

/// Full content of one fetched section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedSection {
    /// Title without numbering.
    pub title: Option<String>,
    pub id: String,
    pub text: String,
}

/// A parsed call to one of the registered functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolInvocation {
    FetchSections(FetchSectionsArgs),
}

impl ToolInvocation {
    /// Declarations of every registered function.
    pub fn registered() -> Vec<FunctionSpec> {
        vec![FetchSectionsTool::spec()]
    }

    /// Resolve a raw function call from the model into a registered invocation.
    pub fn parse(call: &FunctionCall) -> Result<Self> {
        match call.name.as_str() {
            FETCH_SECTIONS => {
                let args: FetchSectionsArgs = serde_json::from_str(&call.arguments)
                    .map_err(|e| SectionQaError::schema(FETCH_SECTIONS, e.to_string()))?;
                Ok(ToolInvocation::FetchSections(args))
            }
            other => Err(SectionQaError::UnknownTool(other.to_string())),
        }
    }
}

/// Resolves section ids to their full text.
///
/// Ids are checked against the summary mapping's keys, i.e. the sections the
/// model was shown, and then looked up in the tree.
pub struct FetchSectionsTool<'a> {
    document: &'a Document,
    summaries: &'a SummaryMapping,
}

impl<'a> FetchSectionsTool<'a> {
    pub fn new(document: &'a Document, summaries: &'a SummaryMapping) -> Self {
        Self {
            document,
            summaries,
        }
    }

    /// Function declaration presented to the model.
    pub fn spec() -> FunctionSpec {
        FunctionSpec {
            name: FETCH_SECTIONS.to_string(),
            description: "fetches an entire section or sections from a document that might contain an answer to the question".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "reasoning": {
                        "type": "string",
                        "description": "the reasoning behind the selection of a section to fetch"
                    },
                    "section_ids": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "the exact ID(s) of the section(s) to fetch"
                    }
                },
                "required": ["reasoning", "section_ids"]
            }),
        }
    }

    /// Fetch the requested sections, ordered by id regardless of request order.
    ///
    /// A repeated id is fetched once per occurrence. Fails on the first id
    /// that is unknown; nothing is skipped.
    pub fn run(&self, args: &FetchSectionsArgs) -> Result<Vec<FetchedSection>> {
        tracing::debug!(reasoning = %args.reasoning, ids = ?args.section_ids, "fetching sections");

        let mut ids: Vec<&str> = args.section_ids.iter().map(String::as_str).collect();
        ids.sort_unstable();

        ids.into_iter()
            .map(|id| {
                if !self.summaries.contains_key(id) {
                    return Err(SectionQaError::UnknownSectionId(id.to_string()));
                }
                let section = self.document.get(id)?;
                Ok(FetchedSection {
                    title: section.title_clean(),
                    id: section.id.clone(),
                    text: section.text()?,
                })
            })
            .collect()
    }

    /// Execute a parsed invocation.
    pub fn dispatch(&self, invocation: &ToolInvocation) -> Result<Vec<FetchedSection>> {
        match invocation {
            ToolInvocation::FetchSections(args) => self.run(args),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Paragraph, TextOrigin};
    use crate::tree::Section;

    fn fixture() -> (Document, SummaryMapping) {
        let doc = Document::new(
            Some("Report"),
            vec![
                Section::new("1", Some("1 Intro")).with_subsection(
                    Section::new("1.1", Some("1.1 Background"))
                        .with_paragraph(Paragraph::new("History.", TextOrigin::Paragraph)),
                ),
                Section::new("2", Some("2 Finance")).with_subsection(
                    Section::new("2.2", Some("2.2 Revenue"))
                        .with_paragraph(Paragraph::new("Revenue was 5M.", TextOrigin::Paragraph)),
                ),
            ],
        )
        .unwrap();
        let summaries = doc
            .sections()
            .iter()
            .map(|s| (s.id.clone(), None))
            .collect();
        (doc, summaries)
    }

    fn args(ids: &[&str]) -> FetchSectionsArgs {
        FetchSectionsArgs {
            reasoning: "looks relevant".to_string(),
            section_ids: ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_fetch_orders_by_id() {
        let (doc, summaries) = fixture();
        let tool = FetchSectionsTool::new(&doc, &summaries);

        let fetched = tool.run(&args(&["2.2", "1.1"])).unwrap();
        let ids: Vec<&str> = fetched.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["1.1", "2.2"]);
        assert_eq!(fetched[1].title.as_deref(), Some("Revenue"));
        assert_eq!(fetched[1].text, "Revenue was 5M.");
    }

    #[test]
    fn test_fetch_unknown_id_fails() {
        let (doc, summaries) = fixture();
        let tool = FetchSectionsTool::new(&doc, &summaries);

        let err = tool.run(&args(&["1.1", "7.7"])).unwrap_err();
        assert!(matches!(err, SectionQaError::UnknownSectionId(id) if id == "7.7"));
    }

    #[test]
    fn test_fetch_requires_summary_entry() {
        let (doc, mut summaries) = fixture();
        summaries.remove("2.2");
        let tool = FetchSectionsTool::new(&doc, &summaries);

        assert!(matches!(
            tool.run(&args(&["2.2"])),
            Err(SectionQaError::UnknownSectionId(_))
        ));
    }

    #[test]
    fn test_fetch_keeps_repeated_ids() {
        let (doc, summaries) = fixture();
        let tool = FetchSectionsTool::new(&doc, &summaries);
        let fetched = tool.run(&args(&["2.2", "1.1", "2.2"])).unwrap();
        let ids: Vec<&str> = fetched.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["1.1", "2.2", "2.2"]);
    }

    #[test]
    fn test_parse_registered_call() {
        let call = FunctionCall {
            name: FETCH_SECTIONS.to_string(),
            arguments: r#"{"reasoning": "r", "section_ids": ["3.1"]}"#.to_string(),
        };
        let invocation = ToolInvocation::parse(&call).unwrap();
        assert_eq!(
            invocation,
            ToolInvocation::FetchSections(FetchSectionsArgs {
                reasoning: "r".to_string(),
                section_ids: vec!["3.1".to_string()],
            })
        );
    }

    #[test]
    fn test_parse_unknown_tool() {
        let call = FunctionCall {
            name: "delete_document".to_string(),
            arguments: "{}".to_string(),
        };
        assert!(matches!(
            ToolInvocation::parse(&call),
            Err(SectionQaError::UnknownTool(name)) if name == "delete_document"
        ));
    }

    #[test]
    fn test_parse_malformed_arguments() {
        let call = FunctionCall {
            name: FETCH_SECTIONS.to_string(),
            arguments: r#"{"section_ids": "1"}"#.to_string(),
        };
        assert!(matches!(
            ToolInvocation::parse(&call),
            Err(SectionQaError::SchemaViolation { .. })
        ));
    }

    #[test]
    fn test_registered_declarations() {
        let specs = ToolInvocation::registered();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, FETCH_SECTIONS);
        assert_eq!(specs[0].parameters["required"][1], "section_ids");
    }
}

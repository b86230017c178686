//! Question answering by selection and sequential refinement.
//!
//! The loop has three phases:
//!
//! 1. **Selecting**: the model sees the question and every section summary and
//!    either answers directly or calls `fetch_sections`.
//! 2. **Refining**: the fetched sections are read one at a time, in id order.
//!    Each step hands the model the previous [`RefineState`] plus one section
//!    and takes whatever state it returns as the input of the next step.
//! 3. **Done**: the last state is the answer, its `section_ids` the citations.
//!
//! Steps are strictly sequential because every step depends on the previous
//! answer. Any model or lookup failure aborts the whole question.

use crate::error::Result;
use crate::executor::{PromptExecutor, StructuredOutput};
use crate::llm::{ChatModel, FunctionSpec, Prompts};
use crate::metadata::SummaryMapping;
use crate::tools::{FetchSectionsTool, FetchedSection, ToolInvocation};
use crate::tree::Document;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::VecDeque;

/// Running answer threaded through the refine steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefineState {
    /// The answer so far.
    pub intermediate_answer: String,
    /// Ids of the sections the answer is based on.
    pub section_ids: Vec<String>,
}

impl StructuredOutput for RefineState {
    fn function_spec() -> FunctionSpec {
        FunctionSpec {
            name: "RefineIO".to_string(),
            description: "The refined intermediate answer and the sections it is based on"
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "intermediate_answer": {
                        "type": "string",
                        "description": "your previous intermediate answer that might need to be refined with the additional context"
                    },
                    "section_ids": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "the exact ID(s) of the sections that were used to generate the intermediate answer"
                    }
                },
                "required": ["intermediate_answer", "section_ids"]
            }),
        }
    }
}

/// Where a question currently is in the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QaPhase {
    Selecting,
    Refining {
        pending: VecDeque<FetchedSection>,
        state: RefineState,
    },
    Done(RefineState),
}

impl QaPhase {
    pub fn is_done(&self) -> bool {
        matches!(self, QaPhase::Done(_))
    }
}

/// Outcome of the selection call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The model answered without reading any section.
    Direct(String),
    /// The model asked for these sections, already fetched and ordered.
    Fetched(Vec<FetchedSection>),
}

/// Answers one question against one document.
pub struct RefineLoop<'a, M: ChatModel> {
    executor: &'a PromptExecutor<M>,
    tool: FetchSectionsTool<'a>,
    summaries: &'a SummaryMapping,
    question: &'a str,
}

impl<'a, M: ChatModel> RefineLoop<'a, M> {
    pub fn new(
        executor: &'a PromptExecutor<M>,
        document: &'a Document,
        summaries: &'a SummaryMapping,
        question: &'a str,
    ) -> Self {
        Self {
            executor,
            tool: FetchSectionsTool::new(document, summaries),
            summaries,
            question,
        }
    }

    /// Drive the loop from selection to its final state.
    pub async fn run(&self) -> Result<RefineState> {
        let mut phase = QaPhase::Selecting;
        loop {
            phase = match phase {
                QaPhase::Done(state) => return Ok(state),
                other => self.advance(other).await?,
            };
        }
    }

    /// Perform exactly one model call and return the next phase.
    pub async fn advance(&self, phase: QaPhase) -> Result<QaPhase> {
        match phase {
            QaPhase::Selecting => match self.select().await? {
                Selection::Direct(content) => {
                    tracing::info!("model answered without fetching sections");
                    Ok(QaPhase::Done(RefineState {
                        intermediate_answer: content,
                        section_ids: Vec::new(),
                    }))
                }
                Selection::Fetched(sections) => {
                    tracing::info!(sections = sections.len(), "refining over fetched sections");
                    Ok(Self::next_phase(sections.into(), RefineState::default()))
                }
            },
            QaPhase::Refining { mut pending, state } => match pending.pop_front() {
                Some(section) => {
                    let state = self.refine_step(state, &section).await?;
                    Ok(Self::next_phase(pending, state))
                }
                None => Ok(QaPhase::Done(state)),
            },
            done @ QaPhase::Done(_) => Ok(done),
        }
    }

    fn next_phase(pending: VecDeque<FetchedSection>, state: RefineState) -> QaPhase {
        if pending.is_empty() {
            QaPhase::Done(state)
        } else {
            QaPhase::Refining { pending, state }
        }
    }

    /// Ask the model which sections to read, fetching them if it calls the tool.
    pub async fn select(&self) -> Result<Selection> {
        let summaries = serde_json::to_string_pretty(self.summaries)?;
        let prompt = Prompts::fill(
            Prompts::select_sections(),
            &[
                ("section_summaries", summaries.as_str()),
                ("question", self.question),
            ],
        );

        let response = self
            .executor
            .invoke_with_tools(prompt, ToolInvocation::registered())
            .await?;

        match response.function_calls.first() {
            Some(call) if response.content.is_empty() => {
                if response.function_calls.len() > 1 {
                    tracing::warn!(
                        calls = response.function_calls.len(),
                        "model emitted several function calls, using the first"
                    );
                }
                let invocation = ToolInvocation::parse(call)?;
                Ok(Selection::Fetched(self.tool.dispatch(&invocation)?))
            }
            _ => Ok(Selection::Direct(response.content)),
        }
    }

    /// Fold one section into the running answer.
    pub async fn refine_step(
        &self,
        state: RefineState,
        section: &FetchedSection,
    ) -> Result<RefineState> {
        tracing::debug!(section = %section.id, "refining answer");

        let refine_io = serde_json::to_string(&state)?;
        let section_json = serde_json::to_string(section)?;
        let prompt = Prompts::fill(
            Prompts::refine_answer(),
            &[
                ("refine_io", refine_io.as_str()),
                ("section", section_json.as_str()),
                ("question", self.question),
            ],
        );

        self.executor.invoke_structured::<RefineState>(prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Paragraph, TextOrigin};
    use crate::error::SectionQaError;
    use crate::executor::Pricing;
    use crate::llm::LlmResponse;
    use crate::llm::mock::ScriptedModel;
    use crate::tools::FETCH_SECTIONS;
    use crate::tree::Section;

    const QUESTION: &str = "What was total revenue?";

    fn fixture() -> (Document, SummaryMapping) {
        let doc = Document::new(
            Some("Annual report"),
            vec![
                Section::new("1", Some("1 Letter")).with_subsection(
                    Section::new("1.1", Some("1.1 Highlights"))
                        .with_paragraph(Paragraph::new("A good year.", TextOrigin::Paragraph)),
                ),
                Section::new("3", Some("3 Financials")).with_subsection(
                    Section::new("3.1", Some("3.1 Revenue"))
                        .with_paragraph(Paragraph::new("Revenue: 12M.", TextOrigin::Paragraph)),
                ),
            ],
        )
        .unwrap();
        let summaries = SummaryMapping::from([
            ("1".to_string(), None),
            ("1.1".to_string(), Some("Highlights of the year".to_string())),
            ("3".to_string(), None),
            ("3.1".to_string(), Some("Revenue figures".to_string())),
        ]);
        (doc, summaries)
    }

    fn fetch(ids: &[&str]) -> LlmResponse {
        let args = json!({"reasoning": "revenue lives in financials", "section_ids": ids});
        LlmResponse::call(FETCH_SECTIONS, args.to_string())
    }

    fn refined(answer: &str, ids: &[&str]) -> LlmResponse {
        let args = json!({"intermediate_answer": answer, "section_ids": ids});
        LlmResponse::call("RefineIO", args.to_string())
    }

    #[tokio::test]
    async fn test_direct_answer_skips_refinement() {
        let (doc, summaries) = fixture();
        let executor =
            PromptExecutor::new(ScriptedModel::new([LlmResponse::text("I don't know")]), Pricing::free());

        let state = RefineLoop::new(&executor, &doc, &summaries, QUESTION)
            .run()
            .await
            .unwrap();

        assert_eq!(
            state,
            RefineState {
                intermediate_answer: "I don't know".to_string(),
                section_ids: vec![],
            }
        );
        assert_eq!(executor.model().call_count(), 1);
    }

    #[tokio::test]
    async fn test_single_section_refinement() {
        let (doc, summaries) = fixture();
        let executor = PromptExecutor::new(
            ScriptedModel::new([fetch(&["3.1"]), refined("Total revenue was 12M.", &["3.1"])]),
            Pricing::free(),
        );

        let state = RefineLoop::new(&executor, &doc, &summaries, QUESTION)
            .run()
            .await
            .unwrap();

        assert_eq!(state.intermediate_answer, "Total revenue was 12M.");
        assert_eq!(state.section_ids, vec!["3.1".to_string()]);

        let requests = executor.model().requests();
        assert_eq!(requests.len(), 2);
        let refine_prompt = &requests[1].messages.last().unwrap().content;
        assert!(refine_prompt.contains("Revenue: 12M."));
        assert!(refine_prompt.contains(r#"{"intermediate_answer":"","section_ids":[]}"#));
    }

    #[tokio::test]
    async fn test_result_is_last_step_output() {
        let (doc, summaries) = fixture();
        let executor = PromptExecutor::new(
            ScriptedModel::new([
                fetch(&["3.1", "1.1"]),
                refined("A good year.", &["1.1"]),
                refined("Revenue was 12M in a good year.", &["3.1"]),
            ]),
            Pricing::free(),
        );

        let state = RefineLoop::new(&executor, &doc, &summaries, QUESTION)
            .run()
            .await
            .unwrap();

        // The loop never merges provenance itself.
        assert_eq!(state.intermediate_answer, "Revenue was 12M in a good year.");
        assert_eq!(state.section_ids, vec!["3.1".to_string()]);

        // Sections are read in id order and each step sees the previous state.
        let requests = executor.model().requests();
        let second = &requests[1].messages.last().unwrap().content;
        let third = &requests[2].messages.last().unwrap().content;
        assert!(second.contains("A good year."));
        assert!(third.contains("Revenue: 12M."));
        assert!(third.contains(r#""intermediate_answer":"A good year.""#));
    }

    #[tokio::test]
    async fn test_advance_walks_each_phase() {
        let (doc, summaries) = fixture();
        let executor = PromptExecutor::new(
            ScriptedModel::new([fetch(&["3.1"]), refined("12M", &["3.1"])]),
            Pricing::free(),
        );
        let qa = RefineLoop::new(&executor, &doc, &summaries, QUESTION);

        let phase = qa.advance(QaPhase::Selecting).await.unwrap();
        match &phase {
            QaPhase::Refining { pending, state } => {
                assert_eq!(pending.len(), 1);
                assert_eq!(state, &RefineState::default());
            }
            other => panic!("unexpected phase {:?}", other),
        }

        let phase = qa.advance(phase).await.unwrap();
        assert!(phase.is_done());

        let again = qa.advance(phase.clone()).await.unwrap();
        assert_eq!(again, phase);
        assert_eq!(executor.model().call_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_fetch_finishes_with_empty_state() {
        let (doc, summaries) = fixture();
        let executor = PromptExecutor::new(ScriptedModel::new([fetch(&[])]), Pricing::free());

        let state = RefineLoop::new(&executor, &doc, &summaries, QUESTION)
            .run()
            .await
            .unwrap();
        assert_eq!(state, RefineState::default());
    }

    #[tokio::test]
    async fn test_text_alongside_call_is_direct_answer() {
        let (doc, summaries) = fixture();
        let mut response = fetch(&["3.1"]);
        response.content = "Probably 12M.".to_string();
        let executor = PromptExecutor::new(ScriptedModel::new([response]), Pricing::free());

        let qa = RefineLoop::new(&executor, &doc, &summaries, QUESTION);
        assert_eq!(
            qa.select().await.unwrap(),
            Selection::Direct("Probably 12M.".to_string())
        );
    }

    #[tokio::test]
    async fn test_unknown_section_aborts() {
        let (doc, summaries) = fixture();
        let executor = PromptExecutor::new(ScriptedModel::new([fetch(&["9.9"])]), Pricing::free());

        let err = RefineLoop::new(&executor, &doc, &summaries, QUESTION)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, SectionQaError::UnknownSectionId(id) if id == "9.9"));
    }

    #[tokio::test]
    async fn test_unregistered_tool_aborts() {
        let (doc, summaries) = fixture();
        let executor = PromptExecutor::new(
            ScriptedModel::new([LlmResponse::call("search_web", "{}")]),
            Pricing::free(),
        );

        let err = RefineLoop::new(&executor, &doc, &summaries, QUESTION)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, SectionQaError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn test_malformed_refine_output_aborts() {
        let (doc, summaries) = fixture();
        let executor = PromptExecutor::new(
            ScriptedModel::new([
                fetch(&["3.1"]),
                LlmResponse::call("RefineIO", r#"{"intermediate_answer": 5}"#),
            ]),
            Pricing::free(),
        );

        let err = RefineLoop::new(&executor, &doc, &summaries, QUESTION)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, SectionQaError::SchemaViolation { .. }));
    }
}

//! Prompt executor: every model call made on behalf of a document goes
//! through here.
//!
//! The executor exposes the two public operations, [`PromptExecutor::summarize`]
//! and [`PromptExecutor::answer`], plus the two invocation contracts they are
//! built on: structured output (a forced call of one declared function whose
//! arguments are the output record) and tool calling (free text or a call of
//! any registered function). Each successful model call is added to the
//! executor's own usage counters.

use crate::config::LlmConfig;
use crate::error::{Result, SectionQaError};
use crate::llm::{
    ChatModel, ChatRequest, FunctionSpec, LlmResponse, Message, Prompts, ToolChoice,
};
use crate::metadata::SummaryMapping;
use crate::refine::{RefineLoop, RefineState};
use crate::tree::{Document, Section};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};

/// A record the model can be asked to produce through a forced function call.
pub trait StructuredOutput: DeserializeOwned {
    /// Declaration of the function whose arguments form the record.
    fn function_spec() -> FunctionSpec;
}

/// Output of the section summarization call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSummaryOutput {
    /// The summary of the section.
    #[serde(default)]
    pub summary: Option<String>,
}

impl StructuredOutput for SectionSummaryOutput {
    fn function_spec() -> FunctionSpec {
        FunctionSpec {
            name: "SectionSummaryOutput".to_string(),
            description: "Contains summary of a given section".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "summary": {
                        "type": ["string", "null"],
                        "description": "the summary of the section"
                    }
                }
            }),
        }
    }
}

/// Token prices used to turn usage into cost.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pricing {
    /// USD per 1000 prompt tokens.
    pub prompt_cost_per_1k: f64,
    /// USD per 1000 completion tokens.
    pub completion_cost_per_1k: f64,
}

impl Pricing {
    /// Zero prices; costs stay at 0.
    pub fn free() -> Self {
        Self::default()
    }

    /// Cost in USD of a single call with the given token counts.
    pub fn cost_of(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 / 1000.0) * self.prompt_cost_per_1k
            + (completion_tokens as f64 / 1000.0) * self.completion_cost_per_1k
    }
}

impl From<&LlmConfig> for Pricing {
    fn from(config: &LlmConfig) -> Self {
        Self {
            prompt_cost_per_1k: config.prompt_cost_per_1k,
            completion_cost_per_1k: config.completion_cost_per_1k,
        }
    }
}

/// Snapshot of accumulated model usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct UsageStats {
    /// Number of model calls that returned a response.
    pub successful_requests: u64,
    /// Total input tokens fed into the model.
    pub prompt_tokens: u64,
    /// Total output tokens generated by the model.
    pub completion_tokens: u64,
    /// Total cost in USD.
    pub total_cost: f64,
}

impl UsageStats {
    /// Usage accumulated between `earlier` and this snapshot.
    pub fn since(&self, earlier: &UsageStats) -> UsageStats {
        UsageStats {
            successful_requests: self.successful_requests - earlier.successful_requests,
            prompt_tokens: self.prompt_tokens - earlier.prompt_tokens,
            completion_tokens: self.completion_tokens - earlier.completion_tokens,
            total_cost: self.total_cost - earlier.total_cost,
        }
    }
}

/// Lock-free usage counters owned by one executor.
#[derive(Debug, Default)]
struct UsageCounters {
    successful_requests: AtomicU64,
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
    /// f64 bit pattern.
    total_cost: AtomicU64,
}

impl UsageCounters {
    fn record(&self, prompt_tokens: u64, completion_tokens: u64, cost: f64) {
        self.successful_requests.fetch_add(1, Ordering::Relaxed);
        self.prompt_tokens.fetch_add(prompt_tokens, Ordering::Relaxed);
        self.completion_tokens
            .fetch_add(completion_tokens, Ordering::Relaxed);
        // The closure always returns Some, so the update cannot fail.
        let _ = self
            .total_cost
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f64::from_bits(bits) + cost).to_bits())
            });
    }

    fn snapshot(&self) -> UsageStats {
        UsageStats {
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
            completion_tokens: self.completion_tokens.load(Ordering::Relaxed),
            total_cost: f64::from_bits(self.total_cost.load(Ordering::Relaxed)),
        }
    }
}

/// Runs the summarization and question-answering prompts against a model.
pub struct PromptExecutor<M: ChatModel> {
    model: M,
    pricing: Pricing,
    usage: UsageCounters,
}

impl<M: ChatModel> PromptExecutor<M> {
    /// Create an executor with fresh usage counters.
    pub fn new(model: M, pricing: Pricing) -> Self {
        Self {
            model,
            pricing,
            usage: UsageCounters::default(),
        }
    }

    /// The underlying model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Usage accumulated since this executor was created.
    pub fn usage(&self) -> UsageStats {
        self.usage.snapshot()
    }

    /// Summarize every given section, in order.
    ///
    /// Sections without text get a `None` summary and cost no model call.
    /// The returned mapping has an entry for every input section.
    pub async fn summarize<'s>(
        &self,
        sections: impl IntoIterator<Item = &'s Section>,
    ) -> Result<SummaryMapping> {
        let before = self.usage();
        let mut summaries = SummaryMapping::new();

        for section in sections {
            let text = section.text()?;
            let summary = if text.is_empty() {
                tracing::debug!(section = %section.id, "no text, skipping summary");
                None
            } else {
                let title = section.title_clean().unwrap_or_default();
                let prompt = Prompts::fill(
                    Prompts::summarize_section(),
                    &[("section_title", title.as_str()), ("section_text", text.as_str())],
                );
                self.invoke_structured::<SectionSummaryOutput>(prompt)
                    .await?
                    .summary
            };
            summaries.insert(section.id.clone(), summary);
        }

        self.log_usage("summarize", &before);
        Ok(summaries)
    }

    /// Answer a question about `document` from its section summaries.
    pub async fn answer(
        &self,
        document: &Document,
        summaries: &SummaryMapping,
        question: &str,
    ) -> Result<RefineState> {
        let before = self.usage();
        let state = RefineLoop::new(self, document, summaries, question)
            .run()
            .await?;
        self.log_usage("answer", &before);
        Ok(state)
    }

    /// Structured-output contract: the model must call `T`'s function and its
    /// arguments must deserialize into `T`.
    pub async fn invoke_structured<T: StructuredOutput>(&self, prompt: String) -> Result<T> {
        let spec = T::function_spec();
        let request = ChatRequest::new(Self::messages(prompt))
            .with_functions(vec![spec.clone()], ToolChoice::Function(spec.name.clone()));

        let response = self.invoke(request).await?;

        let call = response
            .function_calls
            .iter()
            .find(|call| call.name == spec.name)
            .ok_or_else(|| {
                SectionQaError::schema(&spec.name, "response carries no call of the output function")
            })?;

        serde_json::from_str(&call.arguments)
            .map_err(|e| SectionQaError::schema(&spec.name, e.to_string()))
    }

    /// Tool-calling contract: the model answers in text or calls one of `functions`.
    pub async fn invoke_with_tools(
        &self,
        prompt: String,
        functions: Vec<FunctionSpec>,
    ) -> Result<LlmResponse> {
        let request =
            ChatRequest::new(Self::messages(prompt)).with_functions(functions, ToolChoice::Auto);
        self.invoke(request).await
    }

    async fn invoke(&self, request: ChatRequest) -> Result<LlmResponse> {
        let response = self.model.chat(request).await?;

        let (prompt_tokens, completion_tokens) = response
            .usage
            .map(|u| (u64::from(u.prompt_tokens), u64::from(u.completion_tokens)))
            .unwrap_or((0, 0));
        let cost = self.pricing.cost_of(prompt_tokens, completion_tokens);
        self.usage.record(prompt_tokens, completion_tokens, cost);

        tracing::debug!(prompt_tokens, completion_tokens, cost, "model call completed");
        Ok(response)
    }

    fn messages(prompt: String) -> Vec<Message> {
        vec![
            Message::system(Prompts::system_document_analyst()),
            Message::user(prompt),
        ]
    }

    fn log_usage(&self, operation: &str, before: &UsageStats) {
        let delta = self.usage().since(before);
        tracing::info!(
            operation,
            requests = delta.successful_requests,
            prompt_tokens = delta.prompt_tokens,
            completion_tokens = delta.completion_tokens,
            total_cost = delta.total_cost,
            "model usage"
        );
    }
}

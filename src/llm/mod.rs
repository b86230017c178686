//! LLM integration module.
//!
//! Provides the [`ChatModel`] seam, an OpenAI-compatible client implementing
//! it, and the prompts used for summarization and question answering.

mod client;
#[cfg(test)]
pub(crate) mod mock;
mod model;
mod prompts;

pub use client::LlmClient;
pub use model::{
    ChatModel, ChatRequest, FunctionCall, FunctionSpec, LlmResponse, Message, Role, TokenUsage,
    ToolChoice,
};
pub use prompts::Prompts;

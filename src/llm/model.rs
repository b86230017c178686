//! Provider-neutral chat types and the [`ChatModel`] seam.
//!
//! Everything above this layer talks to a model through [`ChatModel::chat`],
//! which lets tests swap the HTTP client for a scripted double.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Message role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A function the model may call, with JSON-schema parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// How the model should pick among the declared functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolChoice {
    /// The model answers in text or calls any declared function.
    Auto,
    /// The model must call the named function.
    Function(String),
}

/// A single chat completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub functions: Vec<FunctionSpec>,
    pub tool_choice: Option<ToolChoice>,
}

impl ChatRequest {
    /// Plain text request without functions.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            functions: Vec::new(),
            tool_choice: None,
        }
    }

    /// Declare functions and how the model should choose among them.
    pub fn with_functions(mut self, functions: Vec<FunctionSpec>, choice: ToolChoice) -> Self {
        self.functions = functions;
        self.tool_choice = Some(choice);
        self
    }
}

/// A function call emitted by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Raw JSON arguments as produced by the model.
    pub arguments: String,
}

/// Token usage reported for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Response from an LLM call including metadata.
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    /// The generated text; empty when the model only called functions.
    pub content: String,
    /// Function calls in the order the model emitted them.
    pub function_calls: Vec<FunctionCall>,
    /// Reason the model stopped generating.
    pub finish_reason: Option<String>,
    /// Token usage (if available).
    pub usage: Option<TokenUsage>,
}

impl LlmResponse {
    /// A text-only response.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// A response consisting of a single function call.
    pub fn call(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            function_calls: vec![FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            }],
            ..Default::default()
        }
    }

    /// Attach token usage.
    pub fn with_usage(mut self, prompt_tokens: u32, completion_tokens: u32) -> Self {
        self.usage = Some(TokenUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        });
        self
    }
}

/// A chat model reachable over some transport.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send one chat request and return the model's response.
    async fn chat(&self, request: ChatRequest) -> Result<LlmResponse>;
}

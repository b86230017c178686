//! Scripted [`ChatModel`] for tests.

use super::model::{ChatModel, ChatRequest, LlmResponse};
use crate::error::{Result, SectionQaError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Replays queued responses in order and records every request it receives.
#[derive(Default)]
pub struct ScriptedModel {
    responses: Mutex<VecDeque<LlmResponse>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new(responses: impl IntoIterator<Item = LlmResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests received so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn chat(&self, request: ChatRequest) -> Result<LlmResponse> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| SectionQaError::LlmApi("script exhausted".to_string()))
    }
}

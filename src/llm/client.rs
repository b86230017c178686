//! OpenAI-compatible LLM client.
//!
//! This client works with any endpoint that speaks the OpenAI chat
//! completions protocol, including function ("tool") calling.

use super::model::{
    ChatModel, ChatRequest, FunctionCall, FunctionSpec, LlmResponse, Message, TokenUsage,
    ToolChoice,
};
use crate::config::LlmConfig;
use crate::error::{Result, SectionQaError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Request body for chat completion.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<serde_json::Value>,
}

/// Response from chat completion.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<RawToolCall>>,
}

#[derive(Debug, Deserialize)]
struct RawToolCall {
    function: RawFunction,
}

#[derive(Debug, Deserialize)]
struct RawFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// OpenAI API error response.
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

fn tool_declaration(function: &FunctionSpec) -> serde_json::Value {
    json!({
        "type": "function",
        "function": {
            "name": function.name,
            "description": function.description,
            "parameters": function.parameters,
        }
    })
}

fn tool_choice_value(choice: &ToolChoice) -> serde_json::Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::Function(name) => json!({"type": "function", "function": {"name": name}}),
    }
}

/// OpenAI-compatible LLM client.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
}

impl LlmClient {
    /// Create a new LLM client with the given configuration.
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Get the API endpoint URL.
    fn endpoint(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        format!("{}/v1/chat/completions", base)
    }

    fn request_body<'a>(&'a self, request: &'a ChatRequest) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.config.model,
            messages: &request.messages,
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
            tools: request.functions.iter().map(tool_declaration).collect(),
            tool_choice: request
                .tool_choice
                .as_ref()
                .filter(|_| !request.functions.is_empty())
                .map(tool_choice_value),
        }
    }

    fn parse_completion(body: &str) -> Result<LlmResponse> {
        let completion: ChatCompletionResponse = serde_json::from_str(body)
            .map_err(|e| SectionQaError::LlmApi(format!("Unreadable completion: {}", e)))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| SectionQaError::LlmApi("No choices in response".to_string()))?;

        Ok(LlmResponse {
            content: choice.message.content.unwrap_or_default(),
            function_calls: choice
                .message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|call| FunctionCall {
                    name: call.function.name,
                    arguments: call.function.arguments,
                })
                .collect(),
            finish_reason: choice.finish_reason,
            usage: completion.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }

    /// Convenience method: single user message with optional system prompt.
    pub async fn complete(&self, system: Option<&str>, user: &str) -> Result<String> {
        let mut messages = Vec::new();

        if let Some(sys) = system {
            messages.push(Message::system(sys));
        }
        messages.push(Message::user(user));

        let response = self.chat(ChatRequest::new(messages)).await?;
        Ok(response.content)
    }

    /// Test connectivity to the API.
    pub async fn test_connection(&self) -> Result<()> {
        let response = self
            .complete(None, "Say 'hello' and nothing else.")
            .await?;

        if response.to_lowercase().contains("hello") {
            Ok(())
        } else {
            Err(SectionQaError::LlmApi(format!(
                "Unexpected response: {}",
                response
            )))
        }
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn chat(&self, request: ChatRequest) -> Result<LlmResponse> {
        let body = self.request_body(&request);

        tracing::debug!(
            model = %self.config.model,
            messages = request.messages.len(),
            functions = request.functions.len(),
            "sending chat completion"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            if let Ok(api_error) = serde_json::from_str::<ApiError>(&text) {
                return Err(SectionQaError::LlmApi(format!(
                    "API error ({}): {}",
                    status, api_error.error.message
                )));
            }
            return Err(SectionQaError::LlmApi(format!(
                "Request failed ({}): {}",
                status, text
            )));
        }

        Self::parse_completion(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client(api_base: &str) -> LlmClient {
        LlmClient::new(LlmConfig {
            api_base: api_base.to_string(),
            api_key: "test".to_string(),
            model: "gpt-4".to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_endpoint_construction() {
        let client = test_client("https://api.example.com/");
        assert_eq!(client.endpoint(), "https://api.example.com/v1/chat/completions");

        let client2 = test_client("https://api.example.com");
        assert_eq!(client2.endpoint(), "https://api.example.com/v1/chat/completions");
    }

    #[test]
    fn test_request_body_with_forced_function() {
        let client = test_client("https://api.example.com");
        let request = ChatRequest::new(vec![Message::user("hi")]).with_functions(
            vec![FunctionSpec {
                name: "record".to_string(),
                description: "records".to_string(),
                parameters: json!({"type": "object"}),
            }],
            ToolChoice::Function("record".to_string()),
        );

        let body = serde_json::to_value(client.request_body(&request)).unwrap();
        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "record");
        assert_eq!(body["tool_choice"]["function"]["name"], "record");
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn test_request_body_without_functions_omits_tools() {
        let client = test_client("https://api.example.com");
        let request = ChatRequest::new(vec![Message::user("hi")]);
        let body = serde_json::to_value(client.request_body(&request)).unwrap();
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn test_parse_tool_call_completion() {
        let body = r#"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "fetch_sections", "arguments": "{\"reasoning\":\"r\",\"section_ids\":[\"1\"]}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17}
        }"#;

        let response = LlmClient::parse_completion(body).unwrap();
        assert_eq!(response.content, "");
        assert_eq!(response.function_calls.len(), 1);
        assert_eq!(response.function_calls[0].name, "fetch_sections");
        assert_eq!(response.finish_reason.as_deref(), Some("tool_calls"));
        assert_eq!(response.usage.unwrap().total_tokens, 17);
    }

    #[test]
    fn test_parse_text_completion() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "hello", "tool_calls": null}}]}"#;
        let response = LlmClient::parse_completion(body).unwrap();
        assert_eq!(response.content, "hello");
        assert!(response.function_calls.is_empty());
        assert!(response.usage.is_none());
    }

    #[test]
    fn test_parse_empty_choices() {
        let result = LlmClient::parse_completion(r#"{"choices": []}"#);
        assert!(matches!(result, Err(SectionQaError::LlmApi(_))));
    }
}

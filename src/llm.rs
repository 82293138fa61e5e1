//! Language-model clients with tool calling.
//!
//! The orchestrator talks to a [`LanguageModel`]: it sends a system prompt,
//! the conversation so far, and the tool schemas, and gets back either a
//! final answer or a set of tool calls.
//!
//! Two HTTP backends are provided:
//! - **[`AnthropicModel`]**: the Anthropic Messages API with native
//!   `tool_use` / `tool_result` content blocks.
//! - **[`OpenAiCompatibleModel`]**: any OpenAI-compatible
//!   `/chat/completions` endpoint with `tool_calls`.
//!
//! All transport and protocol failures become
//! [`RagError::Generation`](course_rag_core::RagError::Generation).

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use course_rag_core::{RagError, Result};

use crate::config::LlmConfig;

/// A tool the model may call, with a JSON Schema for its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolUse {
    /// Provider-assigned id used to correlate the result.
    pub id: String,
    pub name: String,
    /// Raw arguments as sent by the model. Not yet validated.
    pub arguments: Value,
}

/// The outcome of one tool invocation, fed back to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub tool_use_id: String,
    pub content: String,
    pub is_error: bool,
}

/// A message in the conversation sent to the model.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatMessage {
    User(String),
    Assistant {
        text: String,
        tool_calls: Vec<ToolUse>,
    },
    ToolResults(Vec<ToolResult>),
}

impl ChatMessage {
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }
}

/// What the model returned for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// A final answer.
    Answer(String),
    /// The model wants tools executed before it answers.
    ToolUse { text: String, calls: Vec<ToolUse> },
}

/// Whether the model may call tools on this request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolChoice {
    Auto,
    /// Tools stay declared (earlier turns reference them) but must not be called.
    None,
}

/// One model request.
#[derive(Debug, Clone, Copy)]
pub struct GenerateRequest<'a> {
    pub system: &'a str,
    pub messages: &'a [ChatMessage],
    pub tools: &'a [ToolDefinition],
    pub tool_choice: ToolChoice,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier, for logs.
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerateRequest<'_>) -> Result<ModelReply>;
}

#[derive(Debug, Clone)]
struct Sampling {
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl Sampling {
    fn from_config(config: &LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

fn http_client(config: &LlmConfig) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

async fn post_json(provider: &str, request: reqwest::RequestBuilder, body: &Value) -> Result<Value> {
    let resp = request
        .header("Content-Type", "application/json")
        .json(body)
        .send()
        .await
        .map_err(|e| RagError::generation(format!("{} connection failed: {}", provider, e)))?;

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(RagError::generation(format!(
            "{} API error {}: {}",
            provider, status, text
        )));
    }

    resp.json()
        .await
        .map_err(|e| RagError::generation(format!("{} returned invalid JSON: {}", provider, e)))
}

// ============ Anthropic ============

/// Client for the Anthropic Messages API.
pub struct AnthropicModel {
    sampling: Sampling,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicModel {
    pub fn new(config: &LlmConfig, api_key: String) -> anyhow::Result<Self> {
        Ok(Self {
            sampling: Sampling::from_config(config),
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.anthropic.com/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl LanguageModel for AnthropicModel {
    fn name(&self) -> &str {
        &self.sampling.model
    }

    async fn generate(&self, request: &GenerateRequest<'_>) -> Result<ModelReply> {
        let body = anthropic_request_body(&self.sampling, request);
        let req = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01");
        let json = post_json("anthropic", req, &body).await?;
        parse_anthropic_response(&json)
    }
}

fn anthropic_request_body(sampling: &Sampling, request: &GenerateRequest<'_>) -> Value {
    let messages: Vec<Value> = request
        .messages
        .iter()
        .map(|m| match m {
            ChatMessage::User(text) => json!({ "role": "user", "content": text }),
            ChatMessage::Assistant { text, tool_calls } => {
                let mut blocks = Vec::new();
                if !text.trim().is_empty() {
                    blocks.push(json!({ "type": "text", "text": text }));
                }
                for call in tool_calls {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.arguments,
                    }));
                }
                json!({ "role": "assistant", "content": blocks })
            }
            ChatMessage::ToolResults(results) => {
                let blocks: Vec<Value> = results
                    .iter()
                    .map(|r| {
                        json!({
                            "type": "tool_result",
                            "tool_use_id": r.tool_use_id,
                            "content": r.content,
                            "is_error": r.is_error,
                        })
                    })
                    .collect();
                json!({ "role": "user", "content": blocks })
            }
        })
        .collect();

    let mut body = json!({
        "model": sampling.model,
        "max_tokens": sampling.max_tokens,
        "temperature": sampling.temperature,
        "system": request.system,
        "messages": messages,
    });

    if !request.tools.is_empty() {
        let tools: Vec<Value> = request
            .tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.parameters,
                })
            })
            .collect();
        body["tools"] = Value::Array(tools);
        body["tool_choice"] = match request.tool_choice {
            ToolChoice::Auto => json!({ "type": "auto" }),
            ToolChoice::None => json!({ "type": "none" }),
        };
    }

    body
}

fn parse_anthropic_response(json: &Value) -> Result<ModelReply> {
    let blocks = json["content"]
        .as_array()
        .ok_or_else(|| RagError::generation("anthropic response has no content array"))?;

    let mut text = String::new();
    let mut calls = Vec::new();

    for block in blocks {
        match block["type"].as_str() {
            Some("text") => {
                if let Some(t) = block["text"].as_str() {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(t);
                }
            }
            Some("tool_use") => calls.push(ToolUse {
                id: block["id"].as_str().unwrap_or_default().to_string(),
                name: block["name"].as_str().unwrap_or_default().to_string(),
                arguments: block["input"].clone(),
            }),
            _ => {}
        }
    }

    if calls.is_empty() {
        Ok(ModelReply::Answer(text))
    } else {
        Ok(ModelReply::ToolUse { text, calls })
    }
}

// ============ OpenAI-compatible ============

/// Client for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiCompatibleModel {
    sampling: Sampling,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleModel {
    pub fn new(config: &LlmConfig, api_key: String) -> anyhow::Result<Self> {
        Ok(Self {
            sampling: Sampling::from_config(config),
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleModel {
    fn name(&self) -> &str {
        &self.sampling.model
    }

    async fn generate(&self, request: &GenerateRequest<'_>) -> Result<ModelReply> {
        let body = openai_request_body(&self.sampling, request);
        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.base_url));
        if !self.api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.api_key));
        }
        let json = post_json("openai", req, &body).await?;
        parse_openai_response(&json)
    }
}

fn openai_request_body(sampling: &Sampling, request: &GenerateRequest<'_>) -> Value {
    let mut messages = vec![json!({ "role": "system", "content": request.system })];

    for m in request.messages {
        match m {
            ChatMessage::User(text) => messages.push(json!({ "role": "user", "content": text })),
            ChatMessage::Assistant { text, tool_calls } => {
                let mut msg = json!({
                    "role": "assistant",
                    "content": if text.is_empty() { Value::Null } else { json!(text) },
                });
                if !tool_calls.is_empty() {
                    let calls: Vec<Value> = tool_calls
                        .iter()
                        .map(|c| {
                            json!({
                                "id": c.id,
                                "type": "function",
                                "function": {
                                    "name": c.name,
                                    "arguments": c.arguments.to_string(),
                                }
                            })
                        })
                        .collect();
                    msg["tool_calls"] = Value::Array(calls);
                }
                messages.push(msg);
            }
            ChatMessage::ToolResults(results) => {
                for r in results {
                    messages.push(json!({
                        "role": "tool",
                        "tool_call_id": r.tool_use_id,
                        "content": r.content,
                    }));
                }
            }
        }
    }

    let mut body = json!({
        "model": sampling.model,
        "temperature": sampling.temperature,
        "max_tokens": sampling.max_tokens,
        "messages": messages,
    });

    if !request.tools.is_empty() {
        let tools: Vec<Value> = request
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();
        body["tools"] = Value::Array(tools);
        body["tool_choice"] = match request.tool_choice {
            ToolChoice::Auto => json!("auto"),
            ToolChoice::None => json!("none"),
        };
    }

    body
}

fn parse_openai_response(json: &Value) -> Result<ModelReply> {
    let message = &json["choices"]
        .get(0)
        .ok_or_else(|| RagError::generation("openai response has no choices"))?["message"];

    let text = message["content"].as_str().unwrap_or_default().to_string();

    let calls: Vec<ToolUse> = message["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .filter_map(|c| {
                    let name = c["function"]["name"].as_str()?.to_string();
                    let raw = c["function"]["arguments"].as_str().unwrap_or("{}");
                    // Unparseable arguments are passed through as a string so
                    // validation reports them back to the model.
                    let arguments = serde_json::from_str(raw)
                        .unwrap_or_else(|_| Value::String(raw.to_string()));
                    Some(ToolUse {
                        id: c["id"].as_str().unwrap_or_default().to_string(),
                        name,
                        arguments,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    if calls.is_empty() {
        Ok(ModelReply::Answer(text))
    } else {
        Ok(ModelReply::ToolUse { text, calls })
    }
}

/// Create the configured [`LanguageModel`].
///
/// The API key is read from the environment variable named by
/// [`LlmConfig::api_key_var`]. OpenAI-compatible endpoints with a custom
/// `base_url` may run without a key (e.g. a local server).
pub fn create_model(config: &LlmConfig) -> anyhow::Result<Arc<dyn LanguageModel>> {
    let var = config.api_key_var();
    let key = std::env::var(var).ok().filter(|k| !k.is_empty());

    match config.provider.as_str() {
        "anthropic" => {
            let key = key.ok_or_else(|| anyhow::anyhow!("{} environment variable not set", var))?;
            Ok(Arc::new(AnthropicModel::new(config, key)?))
        }
        "openai" => {
            let key = match key {
                Some(k) => k,
                None if config.base_url.is_some() => String::new(),
                None => anyhow::bail!("{} environment variable not set", var),
            };
            Ok(Arc::new(OpenAiCompatibleModel::new(config, key)?))
        }
        other => anyhow::bail!("Unknown llm provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampling() -> Sampling {
        Sampling {
            model: "m".into(),
            max_tokens: 800,
            temperature: 0.0,
        }
    }

    fn tool() -> ToolDefinition {
        ToolDefinition {
            name: "search_course_content".into(),
            description: "Search".into(),
            parameters: json!({ "type": "object" }),
        }
    }

    fn conversation() -> Vec<ChatMessage> {
        vec![
            ChatMessage::User("What is in lesson 1?".into()),
            ChatMessage::Assistant {
                text: String::new(),
                tool_calls: vec![ToolUse {
                    id: "tu_1".into(),
                    name: "search_course_content".into(),
                    arguments: json!({ "query": "lesson 1" }),
                }],
            },
            ChatMessage::ToolResults(vec![ToolResult {
                tool_use_id: "tu_1".into(),
                content: "[Intro - Lesson 1]\nLoops.".into(),
                is_error: false,
            }]),
        ]
    }

    #[test]
    fn test_anthropic_body_shape() {
        let messages = conversation();
        let tools = [tool()];
        let req = GenerateRequest {
            system: "sys",
            messages: &messages,
            tools: &tools,
            tool_choice: ToolChoice::Auto,
        };
        let body = anthropic_request_body(&sampling(), &req);
        assert_eq!(body["system"], "sys");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
        assert_eq!(body["tool_choice"]["type"], "auto");
        assert_eq!(body["messages"][1]["content"][0]["type"], "tool_use");
        assert_eq!(body["messages"][2]["role"], "user");
        assert_eq!(body["messages"][2]["content"][0]["tool_use_id"], "tu_1");
    }

    #[test]
    fn test_anthropic_body_without_tools() {
        let messages = vec![ChatMessage::User("hi".into())];
        let req = GenerateRequest {
            system: "sys",
            messages: &messages,
            tools: &[],
            tool_choice: ToolChoice::Auto,
        };
        let body = anthropic_request_body(&sampling(), &req);
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn test_parse_anthropic_tool_use() {
        let json = json!({
            "stop_reason": "tool_use",
            "content": [
                { "type": "text", "text": "Let me look." },
                { "type": "tool_use", "id": "tu_9", "name": "get_course_outline",
                  "input": { "course_title": "Intro" } }
            ]
        });
        match parse_anthropic_response(&json).unwrap() {
            ModelReply::ToolUse { text, calls } => {
                assert_eq!(text, "Let me look.");
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].id, "tu_9");
                assert_eq!(calls[0].arguments["course_title"], "Intro");
            }
            other => panic!("expected tool use, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_anthropic_answer() {
        let json = json!({ "content": [{ "type": "text", "text": "Four." }] });
        assert_eq!(
            parse_anthropic_response(&json).unwrap(),
            ModelReply::Answer("Four.".into())
        );
        assert!(parse_anthropic_response(&json!({})).is_err());
    }

    #[test]
    fn test_openai_body_shape() {
        let messages = conversation();
        let tools = [tool()];
        let req = GenerateRequest {
            system: "sys",
            messages: &messages,
            tools: &tools,
            tool_choice: ToolChoice::Auto,
        };
        let body = openai_request_body(&sampling(), &req);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][2]["content"], Value::Null);
        assert_eq!(
            body["messages"][2]["tool_calls"][0]["function"]["arguments"],
            r#"{"query":"lesson 1"}"#
        );
        assert_eq!(body["messages"][3]["role"], "tool");
        assert_eq!(body["tools"][0]["function"]["name"], "search_course_content");
        assert_eq!(body["tool_choice"], "auto");
    }

    #[test]
    fn test_tool_choice_none_keeps_definitions() {
        let messages = conversation();
        let tools = [tool()];
        let req = GenerateRequest {
            system: "sys",
            messages: &messages,
            tools: &tools,
            tool_choice: ToolChoice::None,
        };
        let anthropic = anthropic_request_body(&sampling(), &req);
        assert_eq!(anthropic["tool_choice"]["type"], "none");
        assert!(anthropic["tools"].is_array());
        let openai = openai_request_body(&sampling(), &req);
        assert_eq!(openai["tool_choice"], "none");
    }

    #[test]
    fn test_parse_openai_tool_calls() {
        let json = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [
                        { "id": "c1", "type": "function",
                          "function": { "name": "search_course_content", "arguments": "{\"query\":\"x\"}" } },
                        { "id": "c2", "type": "function",
                          "function": { "name": "search_course_content", "arguments": "not json" } }
                    ]
                }
            }]
        });
        match parse_openai_response(&json).unwrap() {
            ModelReply::ToolUse { calls, .. } => {
                assert_eq!(calls[0].arguments["query"], "x");
                assert_eq!(calls[1].arguments, Value::String("not json".into()));
            }
            other => panic!("expected tool use, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_openai_answer() {
        let json = json!({ "choices": [{ "message": { "content": "Hello" } }] });
        assert_eq!(
            parse_openai_response(&json).unwrap(),
            ModelReply::Answer("Hello".into())
        );
        assert_eq!(
            parse_openai_response(&json!({ "choices": [] }))
                .unwrap_err()
                .code(),
            "generation_failed"
        );
    }
}

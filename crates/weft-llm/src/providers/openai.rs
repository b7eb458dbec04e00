use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use weft_core::config::ModelConfig;
use weft_core::error::{Result, WeftError};
use weft_core::traits::LlmClient;
use weft_core::types::*;

use crate::streaming::{SseEvent, SseStream};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-compatible chat-completions client. Also works with Ollama, vLLM,
/// Groq and OpenRouter through `base_url`.
pub struct OpenAiClient {
    http: Client,
}

impl OpenAiClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
    stream_options: StreamOptions,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OaiTool>,
}

#[derive(Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Serialize, Debug, PartialEq)]
pub(crate) struct OaiMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct OaiToolCall {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<OaiFunction>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct OaiFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct OaiTool {
    r#type: &'static str,
    function: OaiToolDef,
}

#[derive(Serialize)]
pub(crate) struct OaiToolDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Deserialize, Debug)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<StreamUsage>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDeltaContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamDeltaContent {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OaiToolCall>>,
}

#[derive(Deserialize, Debug)]
struct StreamUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

pub(crate) fn convert_tools(tools: &[ToolDefinition]) -> Vec<OaiTool> {
    tools
        .iter()
        .map(|t| OaiTool {
            r#type: "function",
            function: OaiToolDef {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.input_schema.clone(),
            },
        })
        .collect()
}

pub(crate) fn convert_messages(messages: Vec<ChatMessage>) -> Vec<OaiMessage> {
    messages
        .into_iter()
        .map(|msg| OaiMessage {
            role: match msg.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: msg.content,
        })
        .collect()
}

fn map_finish_reason(reason: &str) -> StopReason {
    match reason {
        "tool_calls" | "function_call" => StopReason::ToolUse,
        "length" => StopReason::MaxTokens,
        "stop" => StopReason::EndTurn,
        _ => StopReason::EndTurn,
    }
}

pub(crate) fn parse_chunk(event: SseEvent) -> Vec<Result<StreamDelta>> {
    if event.data.trim() == "[DONE]" {
        return vec![];
    }

    let chunk: StreamChunk = match serde_json::from_str(&event.data) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!(data = %event.data, error = %e, "Failed to parse SSE chunk");
            return vec![];
        }
    };

    let mut deltas = Vec::new();

    for choice in chunk.choices.into_iter().take(1) {
        if let Some(delta) = choice.delta {
            if let Some(text) = delta.content.filter(|t| !t.is_empty()) {
                deltas.push(Ok(StreamDelta::TextDelta(text)));
            }
            // Some providers send the name and the arguments in one chunk
            for tc in delta.tool_calls.unwrap_or_default() {
                let Some(func) = tc.function else { continue };
                if let Some(name) = func.name {
                    deltas.push(Ok(StreamDelta::ToolUseStart {
                        index: tc.index,
                        id: tc.id.unwrap_or_default(),
                        name,
                    }));
                }
                if let Some(args) = func.arguments.filter(|a| !a.is_empty()) {
                    deltas.push(Ok(StreamDelta::ToolInputDelta {
                        index: tc.index,
                        delta: args,
                    }));
                }
            }
        }
        if let Some(reason) = choice.finish_reason {
            deltas.push(Ok(StreamDelta::Stop(map_finish_reason(&reason))));
        }
    }

    if let Some(usage) = chunk.usage {
        deltas.push(Ok(StreamDelta::Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        }));
    }

    deltas
}

impl LlmClient for OpenAiClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();
        let tools = convert_tools(tools);

        Box::pin(async move {
            let url = config.base_url.as_deref().unwrap_or(OPENAI_API_URL);

            let body = ChatRequest {
                model: config.model_id.clone(),
                messages: convert_messages(messages),
                max_tokens: config.max_tokens,
                temperature: Some(config.temperature),
                stream: true,
                stream_options: StreamOptions {
                    include_usage: true,
                },
                tools,
            };

            debug!(
                model = %config.model_id,
                messages = body.messages.len(),
                tools = body.tools.len(),
                "Sending chat completion request"
            );

            let mut req = self.http.post(url).json(&body);
            if let Some(api_key) = &config.api_key {
                req = req.bearer_auth(api_key);
            }

            let response = req
                .send()
                .await
                .map_err(|e| WeftError::LlmRequest(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(WeftError::LlmRequest(format!("HTTP {}: {}", status.as_u16(), text)));
            }

            let deltas = SseStream::new(response.bytes_stream())
                .map(|event| match event {
                    Ok(event) => futures::stream::iter(parse_chunk(event)),
                    Err(e) => futures::stream::iter(vec![Err(e)]),
                })
                .flatten();

            Ok(Box::pin(deltas) as BoxStream<'_, Result<StreamDelta>>)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(data: &str) -> SseEvent {
        SseEvent {
            event_type: None,
            data: data.to_string(),
        }
    }

    #[test]
    fn test_parse_text_chunk() {
        let deltas = parse_chunk(event(r#"{"choices":[{"delta":{"content":"Hel"}}]}"#));
        assert_eq!(deltas.len(), 1);
        assert!(matches!(&deltas[0], Ok(StreamDelta::TextDelta(t)) if t == "Hel"));
    }

    #[test]
    fn test_parse_tool_call_with_args_in_one_chunk() {
        let data = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"search_tool","arguments":"{\"query\":\"ai\"}"}}]}}]}"#;
        let deltas = parse_chunk(event(data));
        assert_eq!(deltas.len(), 2);
        assert!(matches!(&deltas[0], Ok(StreamDelta::ToolUseStart { name, .. }) if name == "search_tool"));
        assert!(matches!(&deltas[1], Ok(StreamDelta::ToolInputDelta { index: 0, .. })));
    }

    #[test]
    fn test_parse_finish_and_usage() {
        let deltas = parse_chunk(event(
            r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
        ));
        assert!(matches!(&deltas[0], Ok(StreamDelta::Stop(StopReason::ToolUse))));

        let deltas = parse_chunk(event(
            r#"{"choices":[],"usage":{"prompt_tokens":12,"completion_tokens":5}}"#,
        ));
        assert!(matches!(
            &deltas[0],
            Ok(StreamDelta::Usage { input_tokens: 12, output_tokens: 5 })
        ));
    }

    #[test]
    fn test_done_and_garbage_yield_nothing() {
        assert!(parse_chunk(event("[DONE]")).is_empty());
        assert!(parse_chunk(event("not json")).is_empty());
    }

    #[test]
    fn test_convert_messages_keeps_roles_and_text() {
        let msgs = vec![ChatMessage::user("be brief"), ChatMessage::assistant_text("ok")];
        let converted = convert_messages(msgs);
        assert_eq!(converted.len(), 2);
        assert_eq!(converted[0].role, "user");
        assert_eq!(converted[1].role, "assistant");
        assert_eq!(converted[1].content, "ok");
        let json = serde_json::to_value(&converted[0]).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "be brief"}));
    }
}

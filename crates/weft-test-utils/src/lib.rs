//! Mocks and fixtures shared by the weft test suites.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::stream::BoxStream;

use weft_core::config::{AppConfig, ModelConfig};
use weft_core::error::{Result, WeftError};
use weft_core::traits::{LlmClient, Tool};
use weft_core::types::*;

type Responder = dyn Fn(&[ChatMessage], &[ToolDefinition]) -> Result<ModelOutcome> + Send + Sync;

/// One request as the mock saw it.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model_id: String,
    pub temperature: f32,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<String>,
}

impl RecordedCall {
    /// Concatenated text of every message, for substring assertions.
    pub fn prompt(&self) -> String {
        self.messages
            .iter()
            .map(ChatMessage::text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Scripted LLM client.
///
/// Queued outcomes are served first, in order. Once the queue is empty the
/// responder (if any) answers, otherwise the default text is returned.
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<ModelOutcome>>>,
    responder: Option<Box<Responder>>,
    default_text: String,
    calls: Mutex<Vec<RecordedCall>>,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            responder: None,
            default_text: String::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer every unscripted request with `respond(messages, tools)`.
    pub fn with_responder(
        mut self,
        respond: impl Fn(&[ChatMessage], &[ToolDefinition]) -> Result<ModelOutcome> + Send + Sync + 'static,
    ) -> Self {
        self.responder = Some(Box::new(respond));
        self
    }

    pub fn with_default_text(mut self, text: impl Into<String>) -> Self {
        self.default_text = text.into();
        self
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.push(Ok(ModelOutcome::DirectAnswer(text.into())));
        self
    }

    pub fn with_tool_call(self, name: &str, arguments: serde_json::Value) -> Self {
        let idx = self.script.lock().unwrap().len();
        self.push(Ok(ModelOutcome::ToolInvocations {
            text: String::new(),
            calls: vec![ToolCall {
                id: format!("call_{}", idx),
                name: name.to_string(),
                arguments,
            }],
        }));
        self
    }

    pub fn with_error(self, message: impl Into<String>) -> Self {
        self.push(Err(WeftError::LlmRequest(message.into())));
        self
    }

    fn push(&self, item: Result<ModelOutcome>) {
        self.script.lock().unwrap().push_back(item);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn next_outcome(&self, messages: &[ChatMessage], tools: &[ToolDefinition]) -> Result<ModelOutcome> {
        if let Some(item) = self.script.lock().unwrap().pop_front() {
            return item;
        }
        match &self.responder {
            Some(respond) => respond(messages, tools),
            None => Ok(ModelOutcome::DirectAnswer(self.default_text.clone())),
        }
    }
}

/// Render an outcome as the delta sequence a provider would stream.
pub fn outcome_to_deltas(outcome: ModelOutcome) -> Vec<StreamDelta> {
    let mut deltas = Vec::new();
    let stop = match outcome {
        ModelOutcome::DirectAnswer(text) => {
            deltas.push(StreamDelta::TextDelta(text));
            StopReason::EndTurn
        }
        ModelOutcome::ToolInvocations { text, calls } => {
            if !text.is_empty() {
                deltas.push(StreamDelta::TextDelta(text));
            }
            for (index, call) in calls.into_iter().enumerate() {
                deltas.push(StreamDelta::ToolUseStart {
                    index,
                    id: call.id,
                    name: call.name,
                });
                deltas.push(StreamDelta::ToolInputDelta {
                    index,
                    delta: call.arguments.to_string(),
                });
            }
            StopReason::ToolUse
        }
    };
    deltas.push(StreamDelta::Stop(stop));
    deltas.push(StreamDelta::Usage {
        input_tokens: 100,
        output_tokens: 50,
    });
    deltas
}

impl LlmClient for MockLlmClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let outcome = self.next_outcome(&messages, tools);
        self.calls.lock().unwrap().push(RecordedCall {
            model_id: config.model_id.clone(),
            temperature: config.temperature,
            messages,
            tools: tools.iter().map(|t| t.name.clone()).collect(),
        });
        Box::pin(async move {
            let deltas = outcome?;
            let items: Vec<Result<StreamDelta>> = outcome_to_deltas(deltas).into_iter().map(Ok).collect();
            Ok(Box::pin(futures::stream::iter(items)) as BoxStream<'_, Result<StreamDelta>>)
        })
    }
}

/// Tool that always fails with `ToolExecution`.
pub struct FailingTool {
    name: String,
    pub invocations: Arc<AtomicUsize>,
}

impl FailingTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            invocations: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Tool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        "Always fails."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }
    fn execute(&self, _input: serde_json::Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            Err(WeftError::ToolExecution {
                tool: self.name.clone(),
                message: "simulated failure".into(),
            })
        })
    }
}

/// Tool that echoes its input as a string.
pub struct EchoTool(pub String);

impl Tool for EchoTool {
    fn name(&self) -> &str {
        &self.0
    }
    fn description(&self) -> &str {
        "Echoes its input."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }
    fn execute(&self, input: serde_json::Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move { Ok(ToolResult::success(input.to_string())) })
    }
}

pub const TEST_CONFIG_TOML: &str = r#"
[model]
provider = "openai"
model_id = "test-model"
api_key = "sk-test"
temperature = 0.0

[model.creative]
temperature = 0.7

[pipeline]
fact_check_max_revisions = 2
compliance_max_revisions = 2
quality_max_revisions = 1
quality_threshold = 0.8
max_steps = 60

[react]
max_steps = 5
"#;

/// Parsed [`TEST_CONFIG_TOML`].
pub fn test_config() -> AppConfig {
    toml::from_str(TEST_CONFIG_TOML).expect("test config parses")
}

/// Write `contents` to `weft.toml` in a fresh temp dir.
pub fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("weft.toml");
    std::fs::write(&path, contents).expect("write config");
    (dir, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_script_then_default() {
        let llm = MockLlmClient::new().with_text("first").with_default_text("later");
        let cfg = ModelConfig::new("m");

        let mut first = llm.chat_stream(&cfg, vec![ChatMessage::user("a")], &[]).await.unwrap();
        assert!(matches!(first.next().await, Some(Ok(StreamDelta::TextDelta(t))) if t == "first"));
        drop(first);

        let mut second = llm.chat_stream(&cfg, vec![ChatMessage::user("b")], &[]).await.unwrap();
        assert!(matches!(second.next().await, Some(Ok(StreamDelta::TextDelta(t))) if t == "later"));
        drop(second);

        assert_eq!(llm.call_count(), 2);
        assert_eq!(llm.calls()[1].prompt(), "b");
    }

    #[tokio::test]
    async fn test_scripted_error() {
        let llm = MockLlmClient::new().with_error("HTTP 500: down");
        let err = match llm.chat_stream(&ModelConfig::new("m"), vec![], &[]).await {
            Err(e) => e,
            Ok(_) => panic!("expected error"),
        };
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[test]
    fn test_config_fixture() {
        let cfg = test_config();
        assert_eq!(cfg.model.model_id, "test-model");
        assert_eq!(cfg.react.max_steps, 5);
    }
}

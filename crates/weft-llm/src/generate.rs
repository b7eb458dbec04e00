use std::sync::atomic::{AtomicU64, Ordering};

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use weft_core::config::ModelConfig;
use weft_core::error::{Result, WeftError};
use weft_core::traits::LlmClient;
use weft_core::types::*;

/// Token usage accumulated across every model call of one run.
#[derive(Debug, Default)]
pub struct UsageMeter {
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
    calls: AtomicU64,
}

impl UsageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, input_tokens: u64, output_tokens: u64) {
        self.input_tokens.fetch_add(input_tokens, Ordering::Relaxed);
        self.output_tokens.fetch_add(output_tokens, Ordering::Relaxed);
    }

    fn count_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn input_tokens(&self) -> u64 {
        self.input_tokens.load(Ordering::Relaxed)
    }

    pub fn output_tokens(&self) -> u64 {
        self.output_tokens.load(Ordering::Relaxed)
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Estimated spend given per-million-token prices.
    pub fn cost_usd(&self, input_per_mtok: f64, output_per_mtok: f64) -> f64 {
        (self.input_tokens() as f64 * input_per_mtok + self.output_tokens() as f64 * output_per_mtok)
            / 1_000_000.0
    }
}

#[derive(Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    input_json: String,
}

impl ToolCallAccumulator {
    fn finish(self, index: usize) -> Option<ToolCall> {
        if self.name.is_empty() {
            return None;
        }
        let arguments = if self.input_json.trim().is_empty() {
            serde_json::json!({})
        } else {
            match serde_json::from_str(&self.input_json) {
                Ok(value) => value,
                Err(e) => {
                    warn!(tool = %self.name, error = %e, "Tool arguments are not valid JSON");
                    serde_json::Value::String(self.input_json)
                }
            }
        };
        let id = if self.id.is_empty() {
            format!("call_{}", index)
        } else {
            self.id
        };
        Some(ToolCall {
            id,
            name: self.name,
            arguments,
        })
    }
}

/// Send one request and collect the streamed response into a `ModelOutcome`.
///
/// A response that carries at least one named tool call becomes
/// `ToolInvocations`; anything else is a `DirectAnswer` with the full text.
/// The request and every stream item are raced against `cancel`.
pub async fn generate(
    llm: &dyn LlmClient,
    config: &ModelConfig,
    messages: Vec<ChatMessage>,
    tools: &[ToolDefinition],
    cancel: &CancellationToken,
) -> Result<ModelOutcome> {
    generate_metered(llm, config, messages, tools, cancel, None).await
}

/// Like [`generate`], also recording token usage into `meter`.
pub async fn generate_metered(
    llm: &dyn LlmClient,
    config: &ModelConfig,
    messages: Vec<ChatMessage>,
    tools: &[ToolDefinition],
    cancel: &CancellationToken,
    meter: Option<&UsageMeter>,
) -> Result<ModelOutcome> {
    if cancel.is_cancelled() {
        return Err(WeftError::Cancelled);
    }
    if let Some(m) = meter {
        m.count_call();
    }

    let mut stream = tokio::select! {
        result = llm.chat_stream(config, messages, tools) => result?,
        _ = cancel.cancelled() => return Err(WeftError::Cancelled),
    };

    let mut text = String::new();
    let mut tool_calls: Vec<ToolCallAccumulator> = Vec::new();
    let mut stop_reason = None;

    loop {
        let delta = tokio::select! {
            next = stream.next() => next,
            _ = cancel.cancelled() => return Err(WeftError::Cancelled),
        };
        let Some(delta) = delta else { break };

        match delta? {
            StreamDelta::TextDelta(chunk) => text.push_str(&chunk),
            StreamDelta::ToolUseStart { index, id, name } => {
                while tool_calls.len() <= index {
                    tool_calls.push(ToolCallAccumulator::default());
                }
                tool_calls[index].id = id;
                tool_calls[index].name = name;
            }
            StreamDelta::ToolInputDelta { index, delta } => {
                if let Some(tc) = tool_calls.get_mut(index) {
                    tc.input_json.push_str(&delta);
                }
            }
            StreamDelta::Stop(reason) => stop_reason = Some(reason),
            StreamDelta::Usage {
                input_tokens,
                output_tokens,
            } => {
                if let Some(m) = meter {
                    m.record(input_tokens, output_tokens);
                }
            }
        }
    }

    if stop_reason == Some(StopReason::MaxTokens) {
        warn!(model = %config.model_id, "Response truncated at max_tokens");
    }

    let calls: Vec<ToolCall> = tool_calls
        .into_iter()
        .enumerate()
        .filter_map(|(i, tc)| tc.finish(i))
        .collect();

    debug!(
        model = %config.model_id,
        text_len = text.len(),
        tool_calls = calls.len(),
        "Model response collected"
    );

    if calls.is_empty() {
        Ok(ModelOutcome::DirectAnswer(text))
    } else {
        Ok(ModelOutcome::ToolInvocations { text, calls })
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of one graph run.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A chat message in the conversation.
///
/// Every model call is a single self-contained prompt; tool results are fed
/// back as text by the caller, never as structured turns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn text(&self) -> String {
        self.content.clone()
    }
}

/// Stop reason from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
}

/// A streaming delta from the LLM.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    /// A chunk of text content.
    TextDelta(String),

    /// Start of a tool use block.
    ToolUseStart {
        index: usize,
        id: String,
        name: String,
    },

    /// A chunk of tool use input JSON.
    ToolInputDelta { index: usize, delta: String },

    /// The response is complete.
    Stop(StopReason),

    /// Usage information.
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },
}

/// One tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// What a model call produced.
///
/// Nodes that bind tools match on this instead of poking at an untyped
/// response; a response with no tool calls is always a `DirectAnswer`.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutcome {
    DirectAnswer(String),
    ToolInvocations {
        /// Any text the model emitted alongside its tool calls.
        text: String,
        calls: Vec<ToolCall>,
    },
}

impl ModelOutcome {
    /// The text part of the response, whichever variant it is.
    pub fn text(&self) -> &str {
        match self {
            Self::DirectAnswer(text) => text,
            Self::ToolInvocations { text, .. } => text,
        }
    }

    /// Consume the outcome, keeping only its text.
    pub fn into_text(self) -> String {
        match self {
            Self::DirectAnswer(text) => text,
            Self::ToolInvocations { text, .. } => text,
        }
    }
}

/// Result of a tool execution. Failures travel as `WeftError`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub content: String,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Tool definition for sending to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Context passed to tools during execution.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub run_id: RunId,
    /// Upper bound on any single text argument; longer inputs are cut.
    pub max_input_chars: Option<usize>,
}

impl ToolContext {
    pub fn for_run(run_id: RunId) -> Self {
        Self {
            run_id,
            max_input_chars: None,
        }
    }

    pub fn with_max_input_chars(mut self, max: usize) -> Self {
        self.max_input_chars = Some(max);
        self
    }
}

/// A named evaluation score in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub name: String,
    pub value: f64,
    pub reason: String,
}

impl Score {
    pub fn new(name: impl Into<String>, value: f64, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.clamp(0.0, 1.0),
            reason: reason.into(),
        }
    }
}

/// Run event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// A graph walk started.
    RunStarted { run_id: RunId, entry: String },
    /// A node is about to run.
    NodeStarted { run_id: RunId, node: String, step: usize },
    /// A node's update has been merged.
    NodeCompleted {
        run_id: RunId,
        node: String,
        step: usize,
        /// Trace entries the node appended, in order.
        trace: Vec<String>,
        elapsed_ms: u64,
    },
    /// A router picked the next node.
    RouteChosen {
        run_id: RunId,
        node: String,
        label: String,
        target: String,
        exhausted: bool,
    },
    /// A node returned an error; the walk halts.
    NodeFailed { run_id: RunId, node: String, error: String },
    /// Tool execution started.
    ToolStart { run_id: RunId, name: String },
    /// Tool execution completed.
    ToolEnd { run_id: RunId, name: String, is_error: bool },
    /// An evaluation score was recorded against the run.
    ScoreRecorded { run_id: RunId, score: Score },
    /// The walk reached the terminal marker.
    RunComplete { run_id: RunId, steps: usize, elapsed_ms: u64 },
    /// The walk halted with an error.
    RunError { run_id: RunId, error: String },
}

impl RunEvent {
    pub fn run_id(&self) -> &RunId {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::NodeStarted { run_id, .. }
            | Self::NodeCompleted { run_id, .. }
            | Self::RouteChosen { run_id, .. }
            | Self::NodeFailed { run_id, .. }
            | Self::ToolStart { run_id, .. }
            | Self::ToolEnd { run_id, .. }
            | Self::ScoreRecorded { run_id, .. }
            | Self::RunComplete { run_id, .. }
            | Self::RunError { run_id, .. } => run_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_is_clamped() {
        assert_eq!(Score::new("x", 1.7, "").value, 1.0);
        assert_eq!(Score::new("x", -0.2, "").value, 0.0);
    }

    #[test]
    fn test_model_outcome_text() {
        let direct = ModelOutcome::DirectAnswer("hello".into());
        assert_eq!(direct.text(), "hello");

        let tools = ModelOutcome::ToolInvocations {
            text: String::new(),
            calls: vec![ToolCall {
                id: "c1".into(),
                name: "search_tool".into(),
                arguments: serde_json::json!({"query": "edge"}),
            }],
        };
        assert_eq!(tools.text(), "");
    }

    #[test]
    fn test_user_message_round_trips() {
        let msg = ChatMessage::user("hello");
        assert_eq!(msg.text(), "hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        let back: ChatMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_tool_context_limit() {
        let ctx = ToolContext::for_run(RunId::from_str("r")).with_max_input_chars(40);
        assert_eq!(ctx.max_input_chars, Some(40));
        assert_eq!(ctx.run_id.0, "r");
        assert_eq!(ToolContext::default().max_input_chars, None);
    }
}

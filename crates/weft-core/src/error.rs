use thiserror::Error;

#[derive(Debug, Error)]
pub enum WeftError {
    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    // Tool errors
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Tool timeout after {timeout_secs}s: {tool}")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    #[error("Tool input validation failed: {0}")]
    ToolValidation(String),

    // Graph errors
    #[error("Invalid graph: {0}")]
    GraphConfig(String),

    #[error("Step ceiling of {0} exceeded; the graph did not reach a terminal node")]
    StepCeilingExceeded(usize),

    #[error("Router at '{node}' returned unknown label '{label}'")]
    UnknownRoute { node: String, label: String },

    #[error("Node '{node}' failed: {source}")]
    NodeFailed {
        node: String,
        #[source]
        source: Box<WeftError>,
    },

    #[error("Run cancelled")]
    Cancelled,

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WeftError {
    /// Whether the error came from a model or tool call rather than from
    /// graph wiring or control flow.
    pub fn is_external(&self) -> bool {
        match self {
            Self::LlmRequest(_)
            | Self::LlmStream(_)
            | Self::LlmParse(_)
            | Self::ToolNotFound(_)
            | Self::ToolExecution { .. }
            | Self::ToolTimeout { .. }
            | Self::ToolValidation(_) => true,
            Self::NodeFailed { source, .. } => source.is_external(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, WeftError>;

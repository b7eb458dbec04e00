use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use weft_core::error::{Result, WeftError};
use weft_core::traits::Tool;
use weft_core::types::{ToolContext, ToolDefinition, ToolResult};

use crate::truncate_chars;

/// Registry of available tools, keyed by name.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn register(&mut self, tool: impl Tool) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names, sorted.
    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Tool definitions for sending to the LLM.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| definition_of(t.as_ref())).collect()
    }

    /// Definitions for a subset of tools, in the order given. Unknown names
    /// are skipped.
    pub fn definitions_for(&self, names: &[&str]) -> Vec<ToolDefinition> {
        names
            .iter()
            .filter_map(|n| self.tools.get(*n))
            .map(|t| definition_of(t.as_ref()))
            .collect()
    }

    /// Execute a tool by name under its timeout.
    ///
    /// When `ctx.max_input_chars` is set, every top-level string argument is
    /// cut to that many characters first.
    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<ToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| WeftError::ToolNotFound(name.to_string()))?;

        let input = match ctx.max_input_chars {
            Some(max) => clip_string_args(input, max),
            None => input,
        };

        let timeout_secs = tool.timeout_secs();
        debug!(tool = name, timeout_secs, "Executing tool");

        match tokio::time::timeout(
            std::time::Duration::from_secs(timeout_secs),
            tool.execute(input, ctx),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(WeftError::ToolTimeout {
                tool: name.to_string(),
                timeout_secs,
            }),
        }
    }

    /// Research-report tools: search, scrape and the text heuristics.
    pub fn with_research_tools() -> Self {
        let mut registry = Self::new();

        // ── Research ────────────────────────────────────────────
        registry.register(crate::builtin::research::SearchTool);
        registry.register(crate::builtin::research::ScrapeTool);

        // ── Text analysis ───────────────────────────────────────
        registry.register(crate::builtin::text::KeywordExtractionTool);
        registry.register(crate::builtin::text::WordCountTool);
        registry.register(crate::builtin::text::SentimentAnalysisTool);
        registry.register(crate::builtin::text::ReadabilityScoreTool);
        registry.register(crate::builtin::text::TextSummarizerTool);
        registry.register(crate::builtin::text::HeadlineGeneratorTool);
        registry.register(crate::builtin::text::StatisticsExtractorTool);

        // ── Review ──────────────────────────────────────────────
        registry.register(crate::builtin::review::PlagiarismCheckTool);
        registry.register(crate::builtin::review::CitationFormatterTool);
        registry.register(crate::builtin::review::TranslationQualityTool);

        registry
    }

    /// The single-string tools the ReAct agent can name in `Action:`.
    pub fn with_react_tools() -> Self {
        let mut registry = Self::new();
        registry.register(crate::builtin::react::CalculatorTool);
        registry.register(crate::builtin::react::CurrentTimeTool);
        registry.register(crate::builtin::react::ReverseTextTool);
        registry.register(crate::builtin::react::MockSearchTool);
        registry
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn definition_of(tool: &dyn Tool) -> ToolDefinition {
    ToolDefinition {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        input_schema: tool.input_schema(),
    }
}

fn clip_string_args(input: serde_json::Value, max: usize) -> serde_json::Value {
    match input {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .map(|(k, v)| match v {
                    serde_json::Value::String(s) => {
                        (k, serde_json::Value::String(truncate_chars(&s, max).to_string()))
                    }
                    other => (k, other),
                })
                .collect(),
        ),
        serde_json::Value::String(s) => serde_json::Value::String(truncate_chars(&s, max).to_string()),
        other => other,
    }
}

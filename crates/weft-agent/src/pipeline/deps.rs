use std::sync::Arc;

use tracing::debug;

use weft_core::config::{ModelConfig, PipelineConfig};
use weft_core::error::Result;
use weft_core::event::EventBus;
use weft_core::traits::LlmClient;
use weft_core::types::{ChatMessage, ModelOutcome, RunEvent, ToolContext};
use weft_llm::{generate_metered, UsageMeter};
use weft_tools::ToolRegistry;

use crate::graph::NodeContext;

/// Collaborators injected into every pipeline node.
pub struct PipelineDeps {
    pub llm: Arc<dyn LlmClient>,
    /// Deterministic profile for analysis and review.
    pub precise: ModelConfig,
    /// Sampling profile for drafting and research.
    pub creative: ModelConfig,
    pub tools: Arc<ToolRegistry>,
    pub limits: PipelineConfig,
    pub meter: Arc<UsageMeter>,
    pub events: Option<Arc<EventBus>>,
}

impl PipelineDeps {
    pub fn new(llm: Arc<dyn LlmClient>, model: &ModelConfig, limits: PipelineConfig) -> Self {
        Self {
            llm,
            precise: model.clone(),
            creative: model.creative(),
            tools: Arc::new(ToolRegistry::with_research_tools()),
            limits,
            meter: Arc::new(UsageMeter::new()),
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    /// One model call with `prompt` as the only user message, optionally
    /// binding the named tools.
    pub async fn ask(
        &self,
        model: &ModelConfig,
        prompt: String,
        tools: &[&str],
        ctx: &NodeContext,
    ) -> Result<ModelOutcome> {
        let defs = self.tools.definitions_for(tools);
        generate_metered(
            self.llm.as_ref(),
            model,
            vec![ChatMessage::user(prompt)],
            &defs,
            &ctx.cancel,
            Some(&self.meter),
        )
        .await
    }

    /// Run a registry tool and return its text output. String arguments
    /// longer than `max_tool_input_chars` are cut before the tool sees them.
    pub async fn tool(&self, name: &str, input: serde_json::Value, ctx: &NodeContext) -> Result<String> {
        self.emit(RunEvent::ToolStart {
            run_id: ctx.run_id.clone(),
            name: name.to_string(),
        });
        let tool_ctx = ToolContext::for_run(ctx.run_id.clone()).with_max_input_chars(self.limits.max_tool_input_chars);
        let result = tokio::select! {
            r = self.tools.execute(name, input, tool_ctx) => r,
            _ = ctx.cancel.cancelled() => Err(weft_core::WeftError::Cancelled),
        };
        self.emit(RunEvent::ToolEnd {
            run_id: ctx.run_id.clone(),
            name: name.to_string(),
            is_error: result.is_err(),
        });
        let output = result?;
        debug!(tool = name, len = output.content.len(), "Tool finished");
        Ok(output.content)
    }

    /// Shorthand for tools taking `{"text": ...}`.
    pub async fn text_tool(&self, name: &str, text: &str, ctx: &NodeContext) -> Result<String> {
        self.tool(name, serde_json::json!({ "text": text }), ctx).await
    }

    fn emit(&self, event: RunEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

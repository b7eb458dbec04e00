//! Reason-act-observe agent driven by a plain-text protocol.
//!
//! The model answers with either
//!
//! ```text
//! Thought: ...
//! Action: <tool>
//! Action Input: <text>
//! ```
//!
//! or `Final Answer: <text>`. The agent is a single graph node looping on
//! itself until a final answer appears or the step ceiling is hit; each loop
//! is exactly one model call.

use std::sync::{Arc, OnceLock};

use futures::future::BoxFuture;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use weft_core::config::{ModelConfig, ReactConfig};
use weft_core::error::{Result, WeftError};
use weft_core::event::EventBus;
use weft_core::traits::LlmClient;
use weft_core::types::{ChatMessage, RunId, ToolContext};
use weft_llm::{generate, generate_metered, UsageMeter};
use weft_tools::ToolRegistry;

use crate::graph::{
    router_fn, Append, CompiledGraph, Decision, Executor, GraphBuilder, GraphState, Node,
    NodeContext, Replace, StepRecord, END,
};

pub const TIMED_OUT: &str = "Agent timed out or failed to parse response.";
pub const INVALID_FORMAT: &str = "Invalid format. Please use Thought, Action, Action Input.";

/// One parsed model turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ReactTurn {
    Final { thought: String, answer: String },
    Act { thought: String, tool: String, input: String },
    Invalid { thought: String },
}

struct Patterns {
    thought: Regex,
    action: Regex,
    input: Regex,
}

fn patterns() -> Option<&'static Patterns> {
    static P: OnceLock<Option<Patterns>> = OnceLock::new();
    P.get_or_init(|| {
        Some(Patterns {
            thought: Regex::new(r"(?s)Thought:(.*?)(Action:|Final Answer:|$)").ok()?,
            action: Regex::new(r"Action:\s*(.*)").ok()?,
            input: Regex::new(r"Action Input:\s*(.*)").ok()?,
        })
    })
    .as_ref()
}

/// Parse a model response. `Final Answer:` wins over an action; the answer
/// is whatever follows its last occurrence.
pub fn parse_turn(response: &str) -> ReactTurn {
    let Some(p) = patterns() else {
        return ReactTurn::Invalid {
            thought: String::new(),
        };
    };
    let capture = |re: &Regex| {
        re.captures(response)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
    };
    let thought = capture(&p.thought).unwrap_or_default();

    if let Some((_, answer)) = response.rsplit_once("Final Answer:") {
        return ReactTurn::Final {
            thought,
            answer: answer.trim().to_string(),
        };
    }
    match (capture(&p.action), capture(&p.input)) {
        (Some(tool), Some(input)) => ReactTurn::Act { thought, tool, input },
        _ => ReactTurn::Invalid { thought },
    }
}

pub fn system_prompt(tools: &ToolRegistry) -> String {
    let listing: String = tools
        .list()
        .iter()
        .enumerate()
        .filter_map(|(i, name)| {
            tools
                .get(name)
                .map(|t| format!("{}. {}: {}\n", i + 1, name, t.description()))
        })
        .collect();
    format!(
        r#"You are a helpful AI assistant that uses tools to answer questions.
You utilize a ReAct (Reasoning and Acting) loop.

Available Tools:
{listing}
Format your response exactly as follows:

Thought: <your reasoning>
Action: <tool_name>
Action Input: <input_string>
Observation: <result_of_tool>
... (repeat Thought/Action/Observation as needed)
Final Answer: <the final answer to the user>

If you already know the answer or don't need tools, go straight to Final Answer.
"#
    )
}

/// Conversation state of one agent run.
#[derive(Debug, Clone, Default)]
pub struct ReactState {
    pub input: String,
    /// Model responses and their observations, in order.
    pub transcript: Vec<String>,
    pub thoughts: Vec<String>,
    pub final_answer: Option<String>,
    pub trace: Vec<String>,
}

impl ReactState {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            ..Default::default()
        }
    }

    /// Full prompt for the next model call.
    pub fn prompt(&self, system: &str) -> String {
        format!("{}\nUser: {}\n{}", system, self.input, self.transcript.concat())
    }
}

#[derive(Debug, Default)]
pub struct ReactUpdate {
    pub transcript: Append<String>,
    pub thoughts: Append<String>,
    pub final_answer: Replace<Option<String>>,
    pub trace: Append<String>,
}

impl GraphState for ReactState {
    type Update = ReactUpdate;

    fn merge(&mut self, u: ReactUpdate) {
        u.transcript.apply(&mut self.transcript);
        u.thoughts.apply(&mut self.thoughts);
        u.final_answer.apply(&mut self.final_answer);
        u.trace.apply(&mut self.trace);
    }

    fn trace(&self) -> &[String] {
        &self.trace
    }
}

/// The single self-looping node.
struct ReactStep {
    llm: Arc<dyn LlmClient>,
    model: ModelConfig,
    tools: Arc<ToolRegistry>,
    system: String,
    meter: Arc<UsageMeter>,
    max_tool_input_chars: usize,
}

impl ReactStep {
    async fn step(&self, state: &ReactState, ctx: &NodeContext) -> Result<ReactUpdate> {
        let n = ctx.step + 1;
        let response = generate_metered(
            self.llm.as_ref(),
            &self.model,
            vec![ChatMessage::user(state.prompt(&self.system))],
            &[],
            &ctx.cancel,
            Some(&self.meter),
        )
        .await?
        .into_text();

        let turn = parse_turn(&response);
        debug!(step = n, ?turn, "Parsed agent turn");

        let (thought, observation, final_answer, tag) = match turn {
            ReactTurn::Final { thought, answer } => {
                info!(step = n, "Final answer reached");
                (thought, None, Some(answer), "answer")
            }
            ReactTurn::Act { thought, tool, input } => {
                info!(step = n, tool = %tool, "Invoking tool");
                let observation = self.observe(&tool, &input, ctx).await?;
                (thought, Some(observation), None, "action")
            }
            ReactTurn::Invalid { thought } => (thought, Some(INVALID_FORMAT.to_string()), None, "invalid"),
        };

        let transcript = match observation {
            Some(obs) => Append::one(format!("{}\nObservation: {}\n", response, obs)),
            None => Append::one(format!("{}\n", response)),
        };
        Ok(ReactUpdate {
            transcript,
            thoughts: if thought.is_empty() {
                Append::default()
            } else {
                Append::one(thought)
            },
            final_answer: match final_answer {
                Some(a) => Replace::set(Some(a)),
                None => Replace::keep(),
            },
            trace: Append::one(format!("react_step_{}_{}", n, tag)),
        })
    }

    /// Tool output, or the failure rendered as an observation. Only
    /// cancellation propagates.
    async fn observe(&self, tool: &str, input: &str, ctx: &NodeContext) -> Result<String> {
        let call = self.tools.execute(
            tool,
            serde_json::json!({ "input": input }),
            ToolContext::for_run(ctx.run_id.clone()).with_max_input_chars(self.max_tool_input_chars),
        );
        let result = tokio::select! {
            r = call => r,
            _ = ctx.cancel.cancelled() => return Err(WeftError::Cancelled),
        };
        Ok(match result {
            Ok(out) => out.content,
            Err(WeftError::ToolNotFound(name)) => format!("Error: Tool '{}' not found.", name),
            Err(WeftError::ToolExecution { message, .. }) => message,
            Err(e) => format!("Error executing tool: {}", e),
        })
    }
}

impl Node<ReactState> for ReactStep {
    fn run<'a>(&'a self, state: &'a ReactState, ctx: &'a NodeContext) -> BoxFuture<'a, Result<ReactUpdate>> {
        Box::pin(self.step(state, ctx))
    }
}

/// How an agent run ended.
#[derive(Debug, Clone)]
pub enum ReactOutcome {
    Answered {
        answer: String,
        state: ReactState,
        steps: Vec<StepRecord>,
    },
    /// Step ceiling hit without a final answer.
    Exhausted { state: ReactState, steps: Vec<StepRecord> },
}

impl ReactOutcome {
    /// The final answer, or the timed-out message.
    pub fn answer(&self) -> &str {
        match self {
            Self::Answered { answer, .. } => answer,
            Self::Exhausted { .. } => TIMED_OUT,
        }
    }

    pub fn state(&self) -> &ReactState {
        match self {
            Self::Answered { state, .. } | Self::Exhausted { state, .. } => state,
        }
    }

    pub fn model_calls(&self) -> usize {
        match self {
            Self::Answered { steps, .. } | Self::Exhausted { steps, .. } => steps.len(),
        }
    }
}

pub struct ReactAgent {
    executor: Executor<ReactState>,
    meter: Arc<UsageMeter>,
}

impl ReactAgent {
    /// Agent with the default tool input bound.
    pub fn new(
        llm: Arc<dyn LlmClient>,
        model: ModelConfig,
        tools: Arc<ToolRegistry>,
        max_steps: usize,
    ) -> Result<Self> {
        let config = ReactConfig {
            max_steps,
            ..ReactConfig::default()
        };
        Self::from_config(llm, model, tools, &config)
    }

    pub fn from_config(
        llm: Arc<dyn LlmClient>,
        model: ModelConfig,
        tools: Arc<ToolRegistry>,
        config: &ReactConfig,
    ) -> Result<Self> {
        let meter = Arc::new(UsageMeter::new());
        let node = ReactStep {
            llm,
            model,
            system: system_prompt(&tools),
            tools,
            meter: meter.clone(),
            max_tool_input_chars: config.max_tool_input_chars,
        };
        let graph = build_react_graph(node)?;
        Ok(Self {
            executor: Executor::new(Arc::new(graph), config.max_steps),
            meter,
        })
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.executor = self.executor.with_events(events);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.executor = self.executor.with_cancel(cancel);
        self
    }

    pub fn usage(&self) -> &UsageMeter {
        &self.meter
    }

    pub async fn run(&self, input: &str) -> Result<ReactOutcome> {
        match self.executor.run_with_id(RunId::new(), ReactState::new(input)).await {
            Ok(outcome) => {
                let answer = outcome.state.final_answer.clone().unwrap_or_default();
                Ok(ReactOutcome::Answered {
                    answer,
                    state: outcome.state,
                    steps: outcome.steps,
                })
            }
            Err(failure) if matches!(failure.error, WeftError::StepCeilingExceeded(_)) => {
                info!(steps = failure.steps.len(), "Agent ran out of steps");
                Ok(ReactOutcome::Exhausted {
                    state: failure.state,
                    steps: failure.steps,
                })
            }
            Err(failure) => Err(failure.error),
        }
    }
}

fn build_react_graph(node: ReactStep) -> Result<CompiledGraph<ReactState>> {
    GraphBuilder::new()
        .node("agent", node)
        .branch(
            "agent",
            router_fn(|s: &ReactState| {
                if s.final_answer.is_some() {
                    Decision::to("done")
                } else {
                    Decision::to("continue")
                }
            }),
            [("done", END), ("continue", "agent")],
        )
        .entry("agent")
        .build()
}

/// Score how well `actual` satisfies `task` relative to `expected`, in
/// `[0, 1]`. Any failure scores 0.
pub async fn judge_answer(
    llm: &dyn LlmClient,
    model: &ModelConfig,
    task: &str,
    expected: &str,
    actual: &str,
    cancel: &CancellationToken,
) -> f64 {
    let prompt = format!(
        r#"You are an impartial judge evaluating the performance of an AI agent.

Input Task: {task}
Expected Output (or intended behavior): {expected}
Actual Output: {actual}

Does the Actual Output correctly satisfy the Input Task and align with the Expected Output?
Consider semantic equivalence, not just string matching.

Return ONLY a number between 0.0 (Completely Incorrect) and 1.0 (Perfectly Correct)."#
    );
    match generate(llm, model, vec![ChatMessage::user(prompt)], &[], cancel).await {
        Ok(outcome) => match outcome.text().trim().parse::<f64>() {
            Ok(score) if score.is_finite() => score.clamp(0.0, 1.0),
            _ => {
                debug!(reply = outcome.text(), "Judge reply is not a number");
                0.0
            }
        },
        Err(e) => {
            debug!(error = %e, "Judge call failed");
            0.0
        }
    }
}

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, WeftError};

/// Top-level weft configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub react: ReactConfig,
    #[serde(default)]
    pub evals: EvalsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Sampling override for the drafting nodes (writer, editor, headlines).
    #[serde(default)]
    pub creative: Option<CreativeConfig>,
}

impl ModelConfig {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            provider: default_provider(),
            model_id: model_id.into(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            retry: None,
            creative: None,
        }
    }

    /// Copy of this config with the creative temperature applied.
    pub fn creative(&self) -> ModelConfig {
        let mut cfg = self.clone();
        cfg.temperature = self
            .creative
            .as_ref()
            .map(|c| c.temperature)
            .unwrap_or_else(default_creative_temperature);
        cfg
    }
}

fn default_provider() -> String { "openai".to_string() }
fn default_max_tokens() -> u32 { 4096 }
fn default_temperature() -> f32 { 0.0 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreativeConfig {
    #[serde(default = "default_creative_temperature")]
    pub temperature: f32,
}

fn default_creative_temperature() -> f32 { 0.7 }

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Research-report pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Rejections tolerated at the fact-check gate before forcing the editor.
    #[serde(default = "default_fact_check_max_revisions")]
    pub fact_check_max_revisions: u32,
    #[serde(default = "default_compliance_max_revisions")]
    pub compliance_max_revisions: u32,
    #[serde(default = "default_quality_max_revisions")]
    pub quality_max_revisions: u32,
    /// Minimum quality score (0.0 - 1.0) for the quality gate to pass.
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f64,
    /// Executor step ceiling for one pipeline run.
    #[serde(default = "default_pipeline_max_steps")]
    pub max_steps: usize,
    /// Character budget for research material passed to the model.
    #[serde(default = "default_research_chars")]
    pub max_research_chars: usize,
    /// Character budget for a draft passed to reviewers and tools.
    #[serde(default = "default_draft_chars")]
    pub max_draft_chars: usize,
    /// Character budget for short tool inputs (summaries, translations).
    #[serde(default = "default_snippet_chars")]
    pub max_snippet_chars: usize,
    /// Upper bound on any single string argument handed to a tool.
    #[serde(default = "default_tool_input_chars")]
    pub max_tool_input_chars: usize,
    /// Directory for JSONL run logs. `None` disables run logging.
    #[serde(default)]
    pub log_dir: Option<String>,
    /// Run log verbosity: 1 = run summary, 2 = + nodes and routes, 3 = + tools.
    #[serde(default = "default_log_level")]
    pub log_level: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fact_check_max_revisions: default_fact_check_max_revisions(),
            compliance_max_revisions: default_compliance_max_revisions(),
            quality_max_revisions: default_quality_max_revisions(),
            quality_threshold: default_quality_threshold(),
            max_steps: default_pipeline_max_steps(),
            max_research_chars: default_research_chars(),
            max_draft_chars: default_draft_chars(),
            max_snippet_chars: default_snippet_chars(),
            max_tool_input_chars: default_tool_input_chars(),
            log_dir: None,
            log_level: default_log_level(),
        }
    }
}

impl PipelineConfig {
    /// Resolve the run log directory (expand ~).
    pub fn log_dir(&self) -> Option<PathBuf> {
        let dir = self.log_dir.as_deref()?;
        if let Some(rest) = dir.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return Some(home.join(rest));
            }
        }
        Some(PathBuf::from(dir))
    }
}

fn default_fact_check_max_revisions() -> u32 { 2 }
fn default_compliance_max_revisions() -> u32 { 2 }
fn default_quality_max_revisions() -> u32 { 1 }
fn default_quality_threshold() -> f64 { 0.8 }
fn default_pipeline_max_steps() -> usize { 60 }
fn default_research_chars() -> usize { 4000 }
fn default_draft_chars() -> usize { 3000 }
fn default_snippet_chars() -> usize { 1500 }
fn default_tool_input_chars() -> usize { 20_000 }
fn default_log_level() -> u8 { 2 }

/// ReAct agent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactConfig {
    #[serde(default = "default_react_max_steps")]
    pub max_steps: usize,
    /// Longer `Action Input` text is cut before the tool runs.
    #[serde(default = "default_react_tool_input_chars")]
    pub max_tool_input_chars: usize,
}

impl Default for ReactConfig {
    fn default() -> Self {
        Self {
            max_steps: default_react_max_steps(),
            max_tool_input_chars: default_react_tool_input_chars(),
        }
    }
}

fn default_react_max_steps() -> usize { 5 }
fn default_react_tool_input_chars() -> usize { 1500 }

/// Thresholds for the evaluation battery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalsConfig {
    #[serde(default = "default_max_latency_secs")]
    pub max_latency_secs: f64,
    #[serde(default = "default_max_cost_usd")]
    pub max_cost_usd: f64,
    /// USD per million input tokens, used to estimate run cost.
    #[serde(default = "default_input_cost")]
    pub input_cost_per_mtok: f64,
    #[serde(default = "default_output_cost")]
    pub output_cost_per_mtok: f64,
    #[serde(default = "default_min_word_count")]
    pub min_word_count: usize,
}

impl Default for EvalsConfig {
    fn default() -> Self {
        Self {
            max_latency_secs: default_max_latency_secs(),
            max_cost_usd: default_max_cost_usd(),
            input_cost_per_mtok: default_input_cost(),
            output_cost_per_mtok: default_output_cost(),
            min_word_count: default_min_word_count(),
        }
    }
}

fn default_max_latency_secs() -> f64 { 90.0 }
fn default_max_cost_usd() -> f64 { 0.10 }
fn default_input_cost() -> f64 { 0.15 }
fn default_output_cost() -> f64 { 0.60 }
fn default_min_word_count() -> usize { 300 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| WeftError::ConfigNotFound(path.display().to_string()))?;

        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| WeftError::Config(e.to_string()))
    }

    /// Build a minimal config from `OPENAI_API_KEY`, `OPENAI_BASE_URL` and
    /// `WEFT_MODEL`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| WeftError::Config("OPENAI_API_KEY is not set".into()))?;
        let model_id = std::env::var("WEFT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let mut model = ModelConfig::new(model_id);
        model.api_key = Some(api_key);
        model.base_url = std::env::var("OPENAI_BASE_URL").ok();

        Ok(Self {
            model,
            fallback_models: Vec::new(),
            pipeline: PipelineConfig::default(),
            react: ReactConfig::default(),
            evals: EvalsConfig::default(),
        })
    }

    /// Serialize back to TOML, for `weft config`.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| WeftError::Config(e.to_string()))
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Unset variables are left as written
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

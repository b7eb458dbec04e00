pub mod generate;
pub mod providers;
pub mod retry;
pub mod streaming;

use std::sync::Arc;

use weft_core::config::{AppConfig, ModelConfig};
use weft_core::traits::LlmClient;

pub use generate::{generate, generate_metered, UsageMeter};
pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;

/// Create an LLM client based on the provider name.
///
/// Every provider currently speaks the OpenAI chat-completions protocol
/// (OpenAI, Azure-compatible gateways, Ollama, vLLM, Groq).
pub fn create_client(config: &ModelConfig) -> Box<dyn LlmClient> {
    match config.provider.as_str() {
        "openai" | "ollama" | "vllm" | "groq" | "openrouter" => Box::new(OpenAiClient::new()),
        other => {
            tracing::warn!(provider = other, "Unknown provider, using OpenAI-compatible client");
            Box::new(OpenAiClient::new())
        }
    }
}

/// Build the primary client wrapped with retries and the configured fallbacks.
pub fn client_from_config(config: &AppConfig) -> Arc<dyn LlmClient> {
    let fallbacks = config
        .fallback_models
        .iter()
        .map(|fb| (fb.clone(), create_client(fb)))
        .collect();
    let retry = config.model.retry.clone().unwrap_or_default();

    Arc::new(RetryingClient::new(
        create_client(&config.model),
        fallbacks,
        retry,
    ))
}

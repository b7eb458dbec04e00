use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use tracing::{info, warn};

use weft_core::config::{ModelConfig, RetryConfig};
use weft_core::error::{Result, WeftError};
use weft_core::traits::LlmClient;
use weft_core::types::*;

/// An LLM client that retries transient failures with backoff, then falls
/// back to alternative models in order.
pub struct RetryingClient {
    primary: Box<dyn LlmClient>,
    fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
    retry_config: RetryConfig,
}

impl RetryingClient {
    pub fn new(
        primary: Box<dyn LlmClient>,
        fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            primary,
            fallbacks,
            retry_config,
        }
    }
}

/// Status codes worth another attempt.
const RETRYABLE_STATUS: [&str; 5] = ["HTTP 408", "HTTP 429", "HTTP 500", "HTTP 502", "HTTP 503"];

fn is_retryable(e: &WeftError) -> bool {
    match e {
        WeftError::LlmRequest(msg) => {
            let lower = msg.to_lowercase();
            RETRYABLE_STATUS.iter().any(|s| msg.starts_with(s))
                || lower.contains("timed out")
                || lower.contains("timeout")
                || lower.contains("connection")
        }
        WeftError::LlmStream(_) => true,
        _ => false,
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let base = config
        .initial_backoff_ms
        .saturating_mul(1u64 << attempt.min(16))
        .min(config.max_backoff_ms);
    // 0.8x - 1.2x jitter
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((base as f64 * jitter) as u64)
}

impl LlmClient for RetryingClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();
        let tools = tools.to_vec();

        Box::pin(async move {
            let max_retries = self.retry_config.max_retries;
            let mut last_err = None;

            for attempt in 0..=max_retries {
                match self
                    .primary
                    .chat_stream(&config, messages.clone(), &tools)
                    .await
                {
                    Ok(stream) => return Ok(stream),
                    Err(e) if is_retryable(&e) && attempt < max_retries => {
                        let backoff = calculate_backoff(attempt, &self.retry_config);
                        warn!(
                            attempt = attempt + 1,
                            max_retries,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %e,
                            "Retrying LLM request"
                        );
                        last_err = Some(e);
                        tokio::time::sleep(backoff).await;
                    }
                    Err(e) => {
                        last_err = Some(e);
                        break;
                    }
                }
            }

            if !self.fallbacks.is_empty() {
                info!(model = %config.model_id, "Primary model exhausted, trying fallbacks");
            }
            for (fb_config, fb_client) in &self.fallbacks {
                // Keep the caller's sampling settings on the fallback model
                let mut fb = fb_config.clone();
                fb.temperature = config.temperature;

                match fb_client.chat_stream(&fb, messages.clone(), &tools).await {
                    Ok(stream) => {
                        info!(model = %fb.model_id, "Fell back to alternative model");
                        return Ok(stream);
                    }
                    Err(e) => {
                        warn!(model = %fb.model_id, error = %e, "Fallback model also failed");
                    }
                }
            }

            Err(last_err.unwrap_or_else(|| WeftError::LlmRequest("All providers failed".into())))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Flaky {
        calls: Arc<AtomicUsize>,
        fail_times: usize,
        error: fn() -> WeftError,
    }

    impl LlmClient for Flaky {
        fn chat_stream(
            &self,
            _config: &ModelConfig,
            _messages: Vec<ChatMessage>,
            _tools: &[ToolDefinition],
        ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let fail = n < self.fail_times;
            let error = self.error;
            Box::pin(async move {
                if fail {
                    return Err(error());
                }
                let deltas = vec![Ok(StreamDelta::TextDelta("ok".into()))];
                Ok(Box::pin(futures::stream::iter(deltas)) as BoxStream<'_, Result<StreamDelta>>)
            })
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(&WeftError::LlmRequest("HTTP 429: slow down".into())));
        assert!(is_retryable(&WeftError::LlmRequest("error sending request: connection refused".into())));
        assert!(is_retryable(&WeftError::LlmStream("reset".into())));
        assert!(!is_retryable(&WeftError::LlmRequest("HTTP 401: bad key".into())));
        assert!(!is_retryable(&WeftError::Cancelled));
    }

    #[test]
    fn test_backoff_is_capped() {
        let cfg = RetryConfig {
            max_retries: 10,
            initial_backoff_ms: 1000,
            max_backoff_ms: 4000,
        };
        let d = calculate_backoff(8, &cfg);
        assert!(d <= Duration::from_millis(4800));
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = RetryingClient::new(
            Box::new(Flaky {
                calls: calls.clone(),
                fail_times: 2,
                error: || WeftError::LlmRequest("HTTP 503: busy".into()),
            }),
            vec![],
            fast_retry(),
        );
        let result = client
            .chat_stream(&ModelConfig::new("m"), vec![ChatMessage::user("hi")], &[])
            .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_goes_to_fallback() {
        let primary_calls = Arc::new(AtomicUsize::new(0));
        let fallback_calls = Arc::new(AtomicUsize::new(0));
        let client = RetryingClient::new(
            Box::new(Flaky {
                calls: primary_calls.clone(),
                fail_times: usize::MAX,
                error: || WeftError::LlmRequest("HTTP 401: bad key".into()),
            }),
            vec![(
                ModelConfig::new("backup"),
                Box::new(Flaky {
                    calls: fallback_calls.clone(),
                    fail_times: 0,
                    error: || WeftError::Cancelled,
                }) as Box<dyn LlmClient>,
            )],
            fast_retry(),
        );
        let result = client
            .chat_stream(&ModelConfig::new("m"), vec![ChatMessage::user("hi")], &[])
            .await;
        assert!(result.is_ok());
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_all_failing_returns_last_error() {
        let client = RetryingClient::new(
            Box::new(Flaky {
                calls: Arc::new(AtomicUsize::new(0)),
                fail_times: usize::MAX,
                error: || WeftError::LlmRequest("HTTP 500: down".into()),
            }),
            vec![],
            fast_retry(),
        );
        let err = match client
            .chat_stream(&ModelConfig::new("m"), vec![ChatMessage::user("hi")], &[])
            .await
        {
            Err(e) => e,
            Ok(_) => panic!("expected failure"),
        };
        assert!(err.to_string().contains("HTTP 500"));
    }
}

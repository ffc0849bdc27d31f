//! The agent invocation contract.
//!
//! Every call into the inference backend — specialist, categorizer, or
//! summarizer — goes through this one path. Retry policy lives here and
//! nowhere else: transient failures are retried with bounded exponential
//! backoff; timeouts and invalid model references propagate immediately
//! as an "agent absent" signal for the calling round.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::config::AgentConfig;
use super::message::{ChatRequest, ChatResponse, ImagePayload, system_message, user_message};
use super::provider::{ChunkStream, LlmProvider};
use crate::error::AgentError;

/// Retry behavior for one invocation.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum retry attempts after the initial call.
    pub max_retries: u32,
    /// Per-call timeout.
    pub timeout: Duration,
    /// Base delay for exponential backoff.
    pub backoff_base: Duration,
}

impl RetryPolicy {
    /// Derives the policy from configuration.
    #[must_use]
    pub const fn from_config(config: &AgentConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            timeout: config.timeout,
            backoff_base: config.backoff_base,
        }
    }

    /// Backoff delay before retry `attempt` (0-based), doubling each time.
    fn delay(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(1 << attempt.min(5))
    }
}

/// Builds a chat request from an agent's system prompt and round context.
#[must_use]
pub fn build_request(
    model: &str,
    system_prompt: &str,
    context: &str,
    image: Option<ImagePayload>,
    max_tokens: u32,
    stream: bool,
) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: vec![system_message(system_prompt), user_message(context)],
        temperature: Some(0.7),
        max_tokens: Some(max_tokens),
        stream,
        image,
    }
}

/// Executes a non-streaming invocation under the retry policy.
///
/// # Errors
///
/// Returns the final [`AgentError`] once retries are exhausted, or
/// immediately for non-transient failures.
pub async fn invoke_text(
    provider: &dyn LlmProvider,
    request: &ChatRequest,
    policy: RetryPolicy,
) -> Result<ChatResponse, AgentError> {
    let mut attempt: u32 = 0;
    loop {
        let outcome = tokio::time::timeout(policy.timeout, provider.chat(request)).await;
        let err = match outcome {
            Ok(Ok(response)) => return Ok(response),
            Ok(Err(e)) => e,
            Err(_) => AgentError::Timeout {
                seconds: policy.timeout.as_secs(),
            },
        };

        if !err.is_transient() || attempt >= policy.max_retries {
            return Err(err);
        }

        let delay = policy.delay(attempt);
        warn!(
            model = request.model,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "transient invocation failure, backing off"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Establishes a streaming invocation under the retry policy.
///
/// The retry policy covers stream establishment only; a failure after
/// chunks have started flowing surfaces through the stream itself and is
/// handled by the aggregator as a mid-stream source failure. The per-call
/// timeout also bounds every inter-chunk gap of the established stream,
/// so a backend that stalls mid-stream yields a [`AgentError::Timeout`]
/// item instead of hanging the round.
///
/// # Errors
///
/// Returns the final [`AgentError`] once retries are exhausted, or
/// immediately for non-transient failures.
pub async fn invoke_stream(
    provider: Arc<dyn LlmProvider>,
    request: ChatRequest,
    policy: RetryPolicy,
) -> Result<ChunkStream, AgentError> {
    use tokio_stream::StreamExt as _;

    let mut attempt: u32 = 0;
    loop {
        let outcome = tokio::time::timeout(policy.timeout, provider.chat_stream(&request)).await;
        let err = match outcome {
            Ok(Ok(stream)) => {
                debug!(model = request.model, attempt, "stream established");
                let timeout = policy.timeout;
                let bounded = stream.timeout(timeout).map(move |item| match item {
                    Ok(chunk) => chunk,
                    Err(_) => Err(AgentError::Timeout {
                        seconds: timeout.as_secs(),
                    }),
                });
                return Ok(Box::pin(bounded));
            }
            Ok(Err(e)) => e,
            Err(_) => AgentError::Timeout {
                seconds: policy.timeout.as_secs(),
            },
        };

        if !err.is_transient() || attempt >= policy.max_retries {
            return Err(err);
        }

        let delay = policy.delay(attempt);
        warn!(
            model = request.model,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "transient stream establishment failure, backing off"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

//! Orchestration configuration with builder pattern and environment
//! variable support.
//!
//! Configuration is resolved in order: explicit values → environment
//! variables → defaults. All values are read once at startup and treated
//! as immutable thereafter.

use std::time::Duration;

use crate::error::AgentError;

/// Default collaboration round budget.
const DEFAULT_ROUND_BUDGET: usize = 2;
/// Default maximum retry attempts for transient per-call failures.
const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default per-call timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;
/// Default maximum concurrent agent invocations within one round.
const DEFAULT_MAX_CONCURRENCY: usize = 8;
/// Default base delay for exponential backoff.
const DEFAULT_BACKOFF_BASE_MS: u64 = 500;
/// Default specialist max tokens.
const DEFAULT_AGENT_MAX_TOKENS: u32 = 2048;
/// Default categorizer max tokens. Small: the output is a handful of
/// labelled lines.
const DEFAULT_CATEGORIZER_MAX_TOKENS: u32 = 512;
/// Default summarizer max tokens.
const DEFAULT_SUMMARIZER_MAX_TOKENS: u32 = 4096;
/// Default textual-delta similarity above which consecutive merged
/// outputs are considered converged (only when delta convergence is on).
const DEFAULT_DELTA_THRESHOLD: f32 = 0.95;

/// Configuration for the orchestration core.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// LLM provider name (e.g., "openai").
    pub provider: String,
    /// API key for the provider.
    pub api_key: String,
    /// Optional base URL override (for proxies or compatible APIs).
    pub base_url: Option<String>,
    /// Model for specialist agents.
    pub agent_model: String,
    /// Model for the categorizer call.
    pub categorizer_model: String,
    /// Model for the round-merge summarizer.
    pub summarizer_model: String,
    /// Rounds allotted to collaborative dispatch. Always ≥1 and bounded,
    /// guaranteeing termination.
    pub round_budget: usize,
    /// Maximum retry attempts per agent call (transient failures only).
    pub max_retries: u32,
    /// Per-call timeout.
    pub timeout: Duration,
    /// Maximum concurrent agent invocations within one round.
    pub max_concurrency: usize,
    /// Base delay for exponential backoff between retries.
    pub backoff_base: Duration,
    /// Optional request-level deadline. When it elapses, all in-flight
    /// agent calls for the request are canceled.
    pub request_deadline: Option<Duration>,
    /// Pass each round's concatenated contributions through the
    /// summarizer agent. On summarizer failure the raw concatenation is
    /// used instead.
    pub summarize_rounds: bool,
    /// Stop early when consecutive merged outputs are nearly identical.
    /// Off by default to keep round counts deterministic.
    pub delta_convergence: bool,
    /// Similarity threshold for the delta-convergence check.
    pub delta_threshold: f32,
    /// Maximum tokens for specialist responses.
    pub agent_max_tokens: u32,
    /// Maximum tokens for categorizer responses.
    pub categorizer_max_tokens: u32,
    /// Maximum tokens for summarizer responses.
    pub summarizer_max_tokens: u32,
}

impl AgentConfig {
    /// Creates a new builder for `AgentConfig`.
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key is found.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    agent_model: Option<String>,
    categorizer_model: Option<String>,
    summarizer_model: Option<String>,
    round_budget: Option<usize>,
    max_retries: Option<u32>,
    timeout: Option<Duration>,
    max_concurrency: Option<usize>,
    backoff_base: Option<Duration>,
    request_deadline: Option<Duration>,
    summarize_rounds: Option<bool>,
    delta_convergence: Option<bool>,
    delta_threshold: Option<f32>,
    agent_max_tokens: Option<u32>,
    categorizer_max_tokens: Option<u32>,
    summarizer_max_tokens: Option<u32>,
}

impl AgentConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = std::env::var("CONCLAVE_PROVIDER").ok();
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("OPENAI_API_KEY")
                .or_else(|_| std::env::var("CONCLAVE_API_KEY"))
                .ok();
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("OPENAI_BASE_URL")
                .or_else(|_| std::env::var("CONCLAVE_BASE_URL"))
                .ok();
        }
        if self.agent_model.is_none() {
            self.agent_model = std::env::var("CONCLAVE_AGENT_MODEL").ok();
        }
        if self.categorizer_model.is_none() {
            self.categorizer_model = std::env::var("CONCLAVE_CATEGORIZER_MODEL").ok();
        }
        if self.summarizer_model.is_none() {
            self.summarizer_model = std::env::var("CONCLAVE_SUMMARIZER_MODEL").ok();
        }
        if self.round_budget.is_none() {
            self.round_budget = std::env::var("CONCLAVE_ROUND_BUDGET")
                .ok()
                .and_then(|v| v.parse().ok());
        }
        if self.max_concurrency.is_none() {
            self.max_concurrency = std::env::var("CONCLAVE_MAX_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok());
        }
        self
    }

    /// Sets the LLM provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the specialist agent model.
    #[must_use]
    pub fn agent_model(mut self, model: impl Into<String>) -> Self {
        self.agent_model = Some(model.into());
        self
    }

    /// Sets the categorizer model.
    #[must_use]
    pub fn categorizer_model(mut self, model: impl Into<String>) -> Self {
        self.categorizer_model = Some(model.into());
        self
    }

    /// Sets the summarizer model.
    #[must_use]
    pub fn summarizer_model(mut self, model: impl Into<String>) -> Self {
        self.summarizer_model = Some(model.into());
        self
    }

    /// Sets the collaboration round budget (clamped to ≥1).
    #[must_use]
    pub const fn round_budget(mut self, n: usize) -> Self {
        self.round_budget = Some(n);
        self
    }

    /// Sets the max retries.
    #[must_use]
    pub const fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Sets the maximum concurrency within one round.
    #[must_use]
    pub const fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = Some(n);
        self
    }

    /// Sets the backoff base delay.
    #[must_use]
    pub const fn backoff_base(mut self, duration: Duration) -> Self {
        self.backoff_base = Some(duration);
        self
    }

    /// Sets the request-level deadline.
    #[must_use]
    pub const fn request_deadline(mut self, duration: Duration) -> Self {
        self.request_deadline = Some(duration);
        self
    }

    /// Enables or disables the summarizer merge step.
    #[must_use]
    pub const fn summarize_rounds(mut self, on: bool) -> Self {
        self.summarize_rounds = Some(on);
        self
    }

    /// Enables or disables delta convergence.
    #[must_use]
    pub const fn delta_convergence(mut self, on: bool) -> Self {
        self.delta_convergence = Some(on);
        self
    }

    /// Sets the delta-convergence similarity threshold.
    #[must_use]
    pub const fn delta_threshold(mut self, threshold: f32) -> Self {
        self.delta_threshold = Some(threshold);
        self
    }

    /// Sets the specialist max tokens.
    #[must_use]
    pub const fn agent_max_tokens(mut self, n: u32) -> Self {
        self.agent_max_tokens = Some(n);
        self
    }

    /// Sets the categorizer max tokens.
    #[must_use]
    pub const fn categorizer_max_tokens(mut self, n: u32) -> Self {
        self.categorizer_max_tokens = Some(n);
        self
    }

    /// Sets the summarizer max tokens.
    #[must_use]
    pub const fn summarizer_max_tokens(mut self, n: u32) -> Self {
        self.summarizer_max_tokens = Some(n);
        self
    }

    /// Builds the [`AgentConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key was set.
    pub fn build(self) -> Result<AgentConfig, AgentError> {
        let api_key = self.api_key.ok_or(AgentError::ApiKeyMissing)?;

        Ok(AgentConfig {
            provider: self.provider.unwrap_or_else(|| "openai".to_string()),
            api_key,
            base_url: self.base_url,
            agent_model: self
                .agent_model
                .unwrap_or_else(|| "gpt-5-mini-2025-08-07".to_string()),
            categorizer_model: self
                .categorizer_model
                .unwrap_or_else(|| "gpt-5-mini-2025-08-07".to_string()),
            summarizer_model: self
                .summarizer_model
                .unwrap_or_else(|| "gpt-5.2-2025-12-11".to_string()),
            round_budget: self.round_budget.unwrap_or(DEFAULT_ROUND_BUDGET).max(1),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            max_concurrency: self.max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY),
            backoff_base: self
                .backoff_base
                .unwrap_or(Duration::from_millis(DEFAULT_BACKOFF_BASE_MS)),
            request_deadline: self.request_deadline,
            summarize_rounds: self.summarize_rounds.unwrap_or(true),
            delta_convergence: self.delta_convergence.unwrap_or(false),
            delta_threshold: self.delta_threshold.unwrap_or(DEFAULT_DELTA_THRESHOLD),
            agent_max_tokens: self.agent_max_tokens.unwrap_or(DEFAULT_AGENT_MAX_TOKENS),
            categorizer_max_tokens: self
                .categorizer_max_tokens
                .unwrap_or(DEFAULT_CATEGORIZER_MAX_TOKENS),
            summarizer_max_tokens: self
                .summarizer_max_tokens
                .unwrap_or(DEFAULT_SUMMARIZER_MAX_TOKENS),
        })
    }
}

//! Error types for the orchestration pipeline.
//!
//! The taxonomy distinguishes per-call failures (absorbed at the round
//! boundary by marking the agent absent) from whole-round and
//! whole-pipeline failures (the only errors that surface to the caller).

use thiserror::Error;

/// Errors produced by agent invocations and the orchestration pipeline.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The inference backend could not be reached or returned a server error.
    ///
    /// Transient: retried with bounded exponential backoff.
    #[error("backend unavailable: {message}")]
    BackendUnavailable {
        /// Underlying failure description.
        message: String,
    },

    /// The backend rejected the call due to rate limiting.
    ///
    /// Transient: retried with bounded exponential backoff.
    #[error("rate limited by backend: {message}")]
    RateLimited {
        /// Underlying failure description.
        message: String,
    },

    /// The per-call timeout elapsed before the backend responded.
    ///
    /// Not retried; propagates to the round as an "agent absent" signal.
    #[error("agent call timed out after {seconds}s")]
    Timeout {
        /// Configured timeout that elapsed.
        seconds: u64,
    },

    /// The configured model reference was rejected by the backend.
    ///
    /// Not retried; propagates to the round as an "agent absent" signal.
    #[error("invalid model reference: {model}")]
    InvalidModelReference {
        /// The rejected model identifier.
        model: String,
    },

    /// The categorizer's output contained no recognizable category token.
    ///
    /// Recovered locally: the router falls back to the general-purpose agent.
    #[error("categorizer output contained no known category token")]
    MalformedCategorization {
        /// The raw categorizer output, kept for diagnostics.
        content: String,
    },

    /// Every agent failed in a non-initial collaboration round.
    ///
    /// Recovered by returning the best prior round's merged output.
    #[error("all agents failed in round {round}")]
    RoundExhausted {
        /// Zero-based index of the exhausted round.
        round: usize,
    },

    /// Round 0 failed completely: not a single agent produced usable output.
    ///
    /// Fatal. Surfaced to the caller with no partial content.
    #[error("no agent produced usable output")]
    NoViableResponse,

    /// The request-level deadline elapsed; in-flight agent calls were
    /// canceled before any merge of partial results.
    #[error("request deadline exceeded")]
    DeadlineExceeded,

    /// No API key was found in configuration or environment.
    #[error("no API key configured (set OPENAI_API_KEY or CONCLAVE_API_KEY)")]
    ApiKeyMissing,

    /// The configured provider name has no registered implementation.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// The unrecognized provider name.
        name: String,
    },

    /// A streaming response failed mid-stream.
    #[error("stream error: {message}")]
    Stream {
        /// Underlying failure description.
        message: String,
    },

    /// Internal orchestration failure (invalid input, task join, channel).
    #[error("orchestration error: {message}")]
    Orchestration {
        /// Failure description.
        message: String,
    },
}

impl AgentError {
    /// Whether the invocation layer should retry this failure.
    ///
    /// Only rate limiting and backend unavailability are considered
    /// transient. Timeouts and invalid model references propagate
    /// immediately so a round never stalls on a hopeless call.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::BackendUnavailable { .. }
        )
    }
}

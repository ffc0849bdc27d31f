//! Context retrieval seam for knowledge-augmented agents.
//!
//! The Inquiry specialist augments its round context with passages from a
//! [`Retriever`] before invocation. Retrieval failure degrades to the
//! unaugmented context rather than failing the round.

use async_trait::async_trait;

use crate::error::AgentError;

/// One retrieved passage, already ranked by the retriever.
#[derive(Debug, Clone)]
pub struct Passage {
    /// Passage text.
    pub text: String,
    /// Optional provenance label.
    pub source: Option<String>,
}

/// Pluggable knowledge-retrieval backend.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Backend name, for logging.
    fn name(&self) -> &'static str;

    /// Retrieves passages relevant to the query, best first.
    ///
    /// # Errors
    ///
    /// Returns an [`AgentError`] when the backend is unreachable.
    async fn retrieve(&self, query: &str) -> Result<Vec<Passage>, AgentError>;
}

/// Retriever that never returns passages. The default when no knowledge
/// backend is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRetriever;

#[async_trait]
impl Retriever for NullRetriever {
    fn name(&self) -> &'static str {
        "null"
    }

    async fn retrieve(&self, _query: &str) -> Result<Vec<Passage>, AgentError> {
        Ok(Vec::new())
    }
}

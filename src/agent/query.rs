//! Data types for queries, response events, and final results.

use std::pin::Pin;

use futures_util::Stream;
use serde::{Deserialize, Serialize};

use super::message::{ImagePayload, Role};
use crate::error::AgentError;

/// An immutable user query, owned by the request scope.
#[derive(Debug, Clone)]
pub struct Query {
    /// Query text.
    pub text: String,
    /// Optional image payload (routes toward the visual agent).
    pub image: Option<ImagePayload>,
    /// Prior conversation turns, oldest first.
    pub history: Vec<Turn>,
    /// Caller explicitly requested deep (collaborative) analysis.
    pub deep_analysis: bool,
}

impl Query {
    /// Creates a text-only query.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
            history: Vec::new(),
            deep_analysis: false,
        }
    }

    /// Attaches an image payload.
    #[must_use]
    pub fn with_image(mut self, image: ImagePayload) -> Self {
        self.image = Some(image);
        self
    }

    /// Attaches conversation history.
    #[must_use]
    pub fn with_history(mut self, history: Vec<Turn>) -> Self {
        self.history = history;
        self
    }

    /// Flags the query for collaborative dispatch regardless of category
    /// count.
    #[must_use]
    pub const fn with_deep_analysis(mut self, deep: bool) -> Self {
        self.deep_analysis = deep;
        self
    }
}

/// One prior conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Who produced the turn.
    pub role: Role,
    /// Turn content.
    pub content: String,
}

/// Terminal attribution record for a completed query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribution {
    /// Agents that contributed to the final answer.
    pub agents: Vec<String>,
    /// Number of collaboration rounds run.
    pub rounds: usize,
    /// Whether any agent was absent (failed) at any point.
    pub degraded: bool,
}

/// The terminal merged output plus its attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalResponse {
    /// Final merged answer text.
    pub text: String,
    /// Contribution record.
    pub attribution: Attribution,
}

/// Events emitted on the caller-facing response stream.
///
/// Chunks arrive in first-available order across agents; chunks from a
/// single agent always preserve that agent's emission order. The stream
/// ends with exactly one [`ResponseEvent::Completed`] on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ResponseEvent {
    /// A collaboration round began.
    RoundStarted {
        /// Zero-based round index.
        round: usize,
    },
    /// A piece of agent output.
    Chunk {
        /// Agent that produced the text.
        agent: String,
        /// Round the text belongs to.
        round: usize,
        /// Text fragment.
        text: String,
    },
    /// An agent failed mid-round and is excluded from the merge.
    /// Emitted at most once per agent per round.
    AgentAbsent {
        /// The absent agent.
        agent: String,
        /// Round in which it failed.
        round: usize,
        /// Failure description.
        reason: String,
    },
    /// Terminal event: the merged answer and its attribution.
    Completed(FinalResponse),
}

/// Lazy caller-facing stream of response events.
pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<ResponseEvent, AgentError>> + Send>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_builders() {
        let query = Query::new("hello")
            .with_deep_analysis(true)
            .with_history(vec![Turn {
                role: Role::User,
                content: "hi".to_string(),
            }]);
        assert_eq!(query.text, "hello");
        assert!(query.deep_analysis);
        assert_eq!(query.history.len(), 1);
        assert!(query.image.is_none());
    }

    #[test]
    fn test_response_event_serialization() {
        let event = ResponseEvent::Chunk {
            agent: "Coding Agent".to_string(),
            round: 0,
            text: "fn main()".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap_or_default();
        assert!(json.contains("\"event\":\"chunk\""));
        assert!(json.contains("Coding Agent"));
    }

    #[test]
    fn test_final_response_serialization() {
        let response = FinalResponse {
            text: "answer".to_string(),
            attribution: Attribution {
                agents: vec!["Visual Agent".to_string()],
                rounds: 1,
                degraded: false,
            },
        };
        let json = serde_json::to_string(&response).unwrap_or_default();
        assert!(json.contains("\"rounds\":1"));
        assert!(json.contains("\"degraded\":false"));
    }
}

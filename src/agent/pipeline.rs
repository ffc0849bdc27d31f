//! The top-level query pipeline.
//!
//! Wires categorization, routing, and iteration into a single entry
//! point. Callers either consume the live event stream or await the
//! collected final response; both paths run the same machinery.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use super::categorizer::Categorizer;
use super::config::AgentConfig;
use super::engine::IterationEngine;
use super::provider::LlmProvider;
use super::query::{Attribution, FinalResponse, Query, ResponseEvent, ResponseStream};
use super::registry::AgentRegistry;
use super::retrieval::{NullRetriever, Retriever};
use super::router::Router;
use crate::error::AgentError;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// The orchestration pipeline: categorize, route, iterate, respond.
pub struct Pipeline {
    provider: Arc<dyn LlmProvider>,
    registry: Arc<AgentRegistry>,
    retriever: Arc<dyn Retriever>,
    categorizer: Categorizer,
    config: AgentConfig,
}

impl Pipeline {
    /// Creates a pipeline with the default registry and no knowledge
    /// backend.
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>, config: AgentConfig) -> Self {
        let registry = Arc::new(AgentRegistry::from_config(&config));
        Self {
            provider,
            registry,
            retriever: Arc::new(NullRetriever),
            categorizer: Categorizer::from_config(&config),
            config,
        }
    }

    /// Replaces the agent registry.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<AgentRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Wires in a knowledge-retrieval backend for the Inquiry agent.
    #[must_use]
    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = retriever;
        self
    }

    /// Runs the query and returns the live event stream.
    ///
    /// The stream yields chunks and round markers as they happen and
    /// ends with a single [`ResponseEvent::Completed`] on success or an
    /// error item on failure. Dropping the stream cancels the run.
    ///
    /// # Errors
    ///
    /// Returns an error before any streaming starts when the query is
    /// empty or categorization fails for a reason other than an
    /// unparseable model answer.
    pub async fn stream_query(&self, query: Query) -> Result<ResponseStream, AgentError> {
        if query.text.trim().is_empty() && query.image.is_none() {
            return Err(AgentError::Orchestration {
                message: "query is empty".to_string(),
            });
        }

        let categories = match self.categorizer.categorize(self.provider.as_ref(), &query).await
        {
            Ok(categories) => categories,
            Err(AgentError::MalformedCategorization { content }) => {
                warn!(content, "unparseable categorization, dispatching fallback");
                std::collections::BTreeSet::new()
            }
            Err(other) => return Err(other),
        };

        let router = Router::new(Arc::clone(&self.registry), self.config.round_budget);
        let plan = router.route(&categories, &query);
        info!(
            mode = ?plan.mode,
            agents = plan.agents.len(),
            round_budget = plan.round_budget,
            "query dispatched"
        );

        let engine = IterationEngine::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.retriever),
            self.config.clone(),
        );
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            match engine.run(&plan, &query, &tx).await {
                Ok(outcome) => {
                    let response = FinalResponse {
                        text: outcome.final_text,
                        attribution: Attribution {
                            agents: outcome.contributors,
                            rounds: outcome.rounds_run,
                            degraded: outcome.any_absent,
                        },
                    };
                    let _ = tx.send(Ok(ResponseEvent::Completed(response))).await;
                }
                Err(error) => {
                    let _ = tx.send(Err(error)).await;
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    /// Runs the query to completion and returns the final response.
    ///
    /// # Errors
    ///
    /// Propagates the first error on the stream, or
    /// [`AgentError::NoViableResponse`] if the stream ends without a
    /// terminal event.
    pub async fn query(&self, query: Query) -> Result<FinalResponse, AgentError> {
        use futures_util::StreamExt;

        let mut stream = self.stream_query(query).await?;
        while let Some(item) = stream.next().await {
            if let ResponseEvent::Completed(response) = item? {
                return Ok(response);
            }
        }
        Err(AgentError::NoViableResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::ChatRequest;
    use crate::agent::testing::ScriptedProvider;
    use futures_util::StreamExt;

    fn config() -> AgentConfig {
        AgentConfig::builder()
            .api_key("test")
            .backoff_base(std::time::Duration::from_millis(1))
            .build()
            .unwrap_or_else(|_| unreachable!())
    }

    fn system_prompt(request: &ChatRequest) -> String {
        request
            .messages
            .first()
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }

    fn scripted(script: impl Fn(usize, &ChatRequest) -> Result<String, AgentError> + Send + Sync + 'static) -> Arc<ScriptedProvider> {
        Arc::new(ScriptedProvider::new(script))
    }

    #[tokio::test]
    async fn test_single_dispatch_end_to_end() {
        let provider = scripted(|_, request| {
            let prompt = system_prompt(request);
            if prompt.contains("query categorizer") {
                Ok("Category: Coding\nCollaboration: No".to_string())
            } else {
                Ok("use sort_unstable".to_string())
            }
        });
        let pipeline = Pipeline::new(provider, config());
        let response = pipeline
            .query(Query::new("fastest way to sort a vec?"))
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(response.text, "use sort_unstable");
        assert_eq!(response.attribution.agents, vec!["Coding Agent".to_string()]);
        assert_eq!(response.attribution.rounds, 1);
        assert!(!response.attribution.degraded);
    }

    #[tokio::test]
    async fn test_chunks_precede_completion() {
        let provider = scripted(|_, request| {
            let prompt = system_prompt(request);
            if prompt.contains("query categorizer") {
                Ok("Category: Reasoning".to_string())
            } else {
                Ok("step one then step two".to_string())
            }
        });
        let pipeline = Pipeline::new(provider, config());
        let stream = pipeline
            .stream_query(Query::new("why?"))
            .await
            .unwrap_or_else(|_| unreachable!());
        let events: Vec<ResponseEvent> = stream
            .filter_map(|item| async { item.ok() })
            .collect()
            .await;

        let mut streamed = String::new();
        let mut completed: Option<FinalResponse> = None;
        for event in events {
            match event {
                ResponseEvent::Chunk { text, .. } => {
                    assert!(completed.is_none(), "chunk after terminal event");
                    streamed.push_str(&text);
                }
                ResponseEvent::Completed(response) => completed = Some(response),
                ResponseEvent::RoundStarted { .. } | ResponseEvent::AgentAbsent { .. } => {}
            }
        }
        let completed = completed.unwrap_or_else(|| unreachable!());
        assert_eq!(streamed, completed.text);
    }

    #[tokio::test]
    async fn test_malformed_categorization_falls_back() {
        let provider = scripted(|_, request| {
            let prompt = system_prompt(request);
            if prompt.contains("query categorizer") {
                Ok("I am not sure what you mean.".to_string())
            } else {
                Ok("fallback answer".to_string())
            }
        });
        let pipeline = Pipeline::new(provider, config());
        let response = pipeline
            .query(Query::new("gibberish"))
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(response.text, "fallback answer");
        assert_eq!(
            response.attribution.agents,
            vec!["Inquiry Agent".to_string()]
        );
    }

    #[tokio::test]
    async fn test_categorizer_backend_failure_propagates() {
        let provider = scripted(|_, request| {
            let prompt = system_prompt(request);
            if prompt.contains("query categorizer") {
                Err(AgentError::InvalidModelReference {
                    model: "nope".to_string(),
                })
            } else {
                Ok("unreached".to_string())
            }
        });
        let pipeline = Pipeline::new(provider, config());
        let result = pipeline.query(Query::new("q")).await;
        assert!(matches!(
            result,
            Err(AgentError::InvalidModelReference { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let provider = scripted(|_, _| Ok("never called".to_string()));
        let pipeline = Pipeline::new(Arc::clone(&provider) as Arc<dyn LlmProvider>, config());
        let result = pipeline.stream_query(Query::new("   ")).await;
        assert!(matches!(result, Err(AgentError::Orchestration { .. })));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_image_query_routes_to_visual_agent() {
        let provider = scripted(|_, request| {
            let prompt = system_prompt(request);
            if prompt.contains("query categorizer") {
                Ok("Category: Visual\nCollaboration: No".to_string())
            } else {
                Ok("the image shows a bar chart".to_string())
            }
        });
        let pipeline = Pipeline::new(provider, config());
        let query = Query::new("Analyze this image and describe its contents").with_image(
            crate::agent::message::ImagePayload::from_bytes("image/jpeg", b"jpeg bytes"),
        );
        let response = pipeline
            .query(query)
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(response.attribution.agents, vec!["Visual Agent".to_string()]);
        assert_eq!(response.attribution.rounds, 1);
        assert_eq!(response.text, "the image shows a bar chart");
    }

    #[tokio::test]
    async fn test_two_category_collaboration_runs_two_rounds() {
        let provider = scripted(|_, request| {
            let prompt = system_prompt(request);
            if prompt.contains("query categorizer") {
                Ok("Collaboration: Yes\nInitialCollaborators: [Coding, Analytics]".to_string())
            } else if prompt.contains("coding expert") {
                Ok("coding view".to_string())
            } else {
                Ok("analytics view".to_string())
            }
        });
        let config = AgentConfig::builder()
            .api_key("test")
            .round_budget(2)
            .summarize_rounds(false)
            .build()
            .unwrap_or_else(|_| unreachable!());
        let pipeline = Pipeline::new(provider, config);
        let response = pipeline
            .query(Query::new("profile and optimize this query"))
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(response.attribution.rounds, 2);
        assert_eq!(
            response.attribution.agents,
            vec!["Coding Agent".to_string(), "Analytics Agent".to_string()]
        );
        assert!(!response.attribution.degraded);
        assert!(response.text.contains("coding view"));
        assert!(response.text.contains("analytics view"));
    }

    #[tokio::test]
    async fn test_failed_agents_degrade_attribution() {
        let provider = scripted(|_, request| {
            let prompt = system_prompt(request);
            if prompt.contains("query categorizer") {
                Ok("InitialCollaborators: [Coding, Analytics]".to_string())
            } else if prompt.contains("coding expert") {
                Err(AgentError::Timeout { seconds: 1 })
            } else if prompt.contains("synthesis expert") {
                Ok("merged view".to_string())
            } else {
                Ok("analytics view".to_string())
            }
        });
        let config = AgentConfig::builder()
            .api_key("test")
            .round_budget(1)
            .summarize_rounds(false)
            .build()
            .unwrap_or_else(|_| unreachable!());
        let pipeline = Pipeline::new(provider, config);
        let response = pipeline
            .query(Query::new("analyze this"))
            .await
            .unwrap_or_else(|_| unreachable!());

        assert!(response.attribution.degraded);
        assert_eq!(
            response.attribution.agents,
            vec!["Analytics Agent".to_string()]
        );
        assert!(response.text.contains("analytics view"));
    }
}

//! The collaborative iteration engine.
//!
//! Runs a dispatch plan: one round for single dispatch, up to the round
//! budget for collaborative dispatch. Each round fans the shared context
//! out to every participating agent concurrently, merges their streamed
//! output in arrival order, and carries the merged result into the next
//! round as refinement context. An agent failing a round degrades that
//! round instead of failing the query; only a round with zero surviving
//! contributions is fatal.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use futures_util::{StreamExt, TryStreamExt};
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, info, warn};

use super::aggregator::{self, ChunkSource, MergeEvent};
use super::config::AgentConfig;
use super::invoke::{self, RetryPolicy};
use super::prompt::{
    SUMMARIZER_SYSTEM_PROMPT, build_augmentation_block, build_round_context,
    build_summarizer_prompt, specialist_system_prompt,
};
use super::provider::{ChunkStream, LlmProvider};
use super::query::{Query, ResponseEvent};
use super::registry::{AgentDescriptor, Category};
use super::retrieval::Retriever;
use super::router::DispatchPlan;
use crate::error::AgentError;

/// Name under which merged summarizer output is streamed.
pub const SUMMARIZER_AGENT_NAME: &str = "summarizer";

/// What a finished engine run produced.
#[derive(Debug, Clone)]
pub struct EngineOutcome {
    /// Final merged answer text.
    pub final_text: String,
    /// Rounds actually run.
    pub rounds_run: usize,
    /// Agents that contributed at least one chunk, in plan order.
    pub contributors: Vec<String>,
    /// Whether any agent was absent in any round.
    pub any_absent: bool,
}

/// Shared per-run resources handed to each round.
struct RoundResources {
    policy: RetryPolicy,
    semaphore: Arc<Semaphore>,
}

/// What one completed round produced.
struct RoundOutput {
    merged_text: String,
    contributors: Vec<String>,
    any_absent: bool,
}

/// Executes dispatch plans round by round.
pub struct IterationEngine {
    provider: Arc<dyn LlmProvider>,
    retriever: Arc<dyn Retriever>,
    config: AgentConfig,
}

impl IterationEngine {
    /// Creates an engine over the given backend and retriever.
    #[must_use]
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        retriever: Arc<dyn Retriever>,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider,
            retriever,
            config,
        }
    }

    /// Runs the plan to completion, forwarding stream events as they
    /// happen.
    ///
    /// The request deadline is enforced here: each round runs under the
    /// remaining deadline budget, and a round canceled mid-flight never
    /// merges — a prior round's output is kept as the degraded answer
    /// when one exists.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::NoViableResponse`] when the first round
    /// produces no contribution at all, [`AgentError::DeadlineExceeded`]
    /// when the request deadline elapses before any output exists, or an
    /// orchestration error when the caller abandons the event stream.
    pub async fn run(
        &self,
        plan: &DispatchPlan,
        query: &Query,
        events: &mpsc::Sender<Result<ResponseEvent, AgentError>>,
    ) -> Result<EngineOutcome, AgentError> {
        let started = Instant::now();
        let resources = RoundResources {
            policy: RetryPolicy::from_config(&self.config),
            semaphore: Arc::new(Semaphore::new(self.config.max_concurrency.max(1))),
        };

        let mut prior_merged: Option<String> = None;
        let mut contributors: Vec<String> = Vec::new();
        let mut any_absent = false;
        let mut rounds_run = 0;

        for round in 0..plan.round_budget {
            let body =
                self.run_round(plan, query, round, prior_merged.as_deref(), events, &resources);

            let result = if let Some(deadline) = self.config.request_deadline {
                match deadline.checked_sub(started.elapsed()) {
                    Some(remaining) => match tokio::time::timeout(remaining, body).await {
                        Ok(result) => result,
                        Err(_) if prior_merged.is_some() => {
                            warn!(round, "deadline reached mid-round, keeping prior output");
                            any_absent = true;
                            break;
                        }
                        Err(_) => return Err(AgentError::DeadlineExceeded),
                    },
                    None if prior_merged.is_some() => {
                        warn!(round, "deadline reached, keeping prior output");
                        any_absent = true;
                        break;
                    }
                    None => return Err(AgentError::DeadlineExceeded),
                }
            } else {
                body.await
            };

            let output = match result {
                Ok(output) => output,
                Err(exhausted @ AgentError::RoundExhausted { .. }) => {
                    if round == 0 {
                        warn!(error = %exhausted, "no agent produced output");
                        return Err(AgentError::NoViableResponse);
                    }
                    warn!(error = %exhausted, "keeping prior round output");
                    any_absent = true;
                    break;
                }
                Err(other) => return Err(other),
            };

            any_absent |= output.any_absent;
            for name in output.contributors {
                if !contributors.contains(&name) {
                    contributors.push(name);
                }
            }
            rounds_run = round + 1;

            if self.config.delta_convergence
                && let Some(previous) = &prior_merged
                && token_jaccard(previous, &output.merged_text) >= self.config.delta_threshold
            {
                info!(round, "merged output converged, stopping early");
                prior_merged = Some(output.merged_text);
                break;
            }

            prior_merged = Some(output.merged_text);
        }

        let final_text = prior_merged.ok_or(AgentError::NoViableResponse)?;
        info!(rounds_run, contributors = contributors.len(), "plan complete");

        Ok(EngineOutcome {
            final_text,
            rounds_run,
            contributors,
            any_absent,
        })
    }

    /// Runs one round: fan-out, merge consumption, and the merge step.
    ///
    /// Returns [`AgentError::RoundExhausted`] when no agent contributed;
    /// the caller decides whether that is fatal or degradable.
    async fn run_round(
        &self,
        plan: &DispatchPlan,
        query: &Query,
        round: usize,
        prior_merged: Option<&str>,
        events: &mpsc::Sender<Result<ResponseEvent, AgentError>>,
        resources: &RoundResources,
    ) -> Result<RoundOutput, AgentError> {
        send(events, ResponseEvent::RoundStarted { round }).await?;
        let context = build_round_context(query, prior_merged, round);
        let mut any_absent = false;

        let mut sources = Vec::with_capacity(plan.agents.len());
        for agent in &plan.agents {
            let agent_context = self.agent_context(agent, query, &context).await;
            let image = (round == 0 && agent.category == Category::Visual)
                .then(|| query.image.clone())
                .flatten();
            let request = invoke::build_request(
                &agent.model,
                specialist_system_prompt(agent.category),
                &agent_context,
                image,
                self.config.agent_max_tokens,
                true,
            );
            sources.push(ChunkSource {
                agent: Arc::from(agent.name.as_str()),
                round,
                stream: lazy_stream(
                    Arc::clone(&self.provider),
                    request,
                    resources.policy,
                    Arc::clone(&resources.semaphore),
                ),
            });
        }

        let mut merged = aggregator::merge(sources);
        // Contributions keyed by agent, in plan order.
        let mut round_texts: Vec<(String, String)> = plan
            .agents
            .iter()
            .map(|a| (a.name.clone(), String::new()))
            .collect();

        while let Some(event) = merged.next().await {
            match event {
                MergeEvent::Chunk(chunk) => {
                    if let Some((_, text)) =
                        round_texts.iter_mut().find(|(name, _)| **name == *chunk.agent)
                    {
                        text.push_str(&chunk.text);
                    }
                    send(
                        events,
                        ResponseEvent::Chunk {
                            agent: chunk.agent.to_string(),
                            round,
                            text: chunk.text,
                        },
                    )
                    .await?;
                }
                MergeEvent::SourceFailed {
                    agent,
                    round,
                    error,
                } => {
                    any_absent = true;
                    warn!(agent = %agent, round, error = %error, "agent absent this round");
                    send(
                        events,
                        ResponseEvent::AgentAbsent {
                            agent: agent.to_string(),
                            round,
                            reason: error.to_string(),
                        },
                    )
                    .await?;
                }
            }
        }

        let contributions: Vec<(String, String)> = round_texts
            .into_iter()
            .filter(|(_, text)| !text.trim().is_empty())
            .collect();

        if contributions.is_empty() {
            return Err(AgentError::RoundExhausted { round });
        }

        let contributors = contributions.iter().map(|(name, _)| name.clone()).collect();
        let merged_text = self
            .merge_round(query, round, &contributions, events, resources.policy)
            .await?;

        Ok(RoundOutput {
            merged_text,
            contributors,
            any_absent,
        })
    }

    /// Builds the per-agent context, augmenting the Inquiry specialist
    /// with retrieved passages when available.
    async fn agent_context(&self, agent: &AgentDescriptor, query: &Query, context: &str) -> String {
        if agent.category != Category::Inquiry {
            return context.to_string();
        }
        match self.retriever.retrieve(&query.text).await {
            Ok(passages) if !passages.is_empty() => {
                debug!(
                    retriever = self.retriever.name(),
                    passages = passages.len(),
                    "augmenting context"
                );
                build_augmentation_block(context, &passages)
            }
            Ok(_) => context.to_string(),
            Err(error) => {
                warn!(
                    retriever = self.retriever.name(),
                    %error,
                    "retrieval failed, continuing without passages"
                );
                context.to_string()
            }
        }
    }

    /// Merges one round's contributions into a single text.
    ///
    /// A lone contribution passes through verbatim. Multiple
    /// contributions are concatenated under agent labels and, when
    /// enabled, rewritten by the summarizer; summarizer failure falls
    /// back to the labelled concatenation.
    async fn merge_round(
        &self,
        query: &Query,
        round: usize,
        contributions: &[(String, String)],
        events: &mpsc::Sender<Result<ResponseEvent, AgentError>>,
        policy: RetryPolicy,
    ) -> Result<String, AgentError> {
        if let [(_, only)] = contributions {
            return Ok(only.clone());
        }

        let mut labelled = String::new();
        for (name, text) in contributions {
            labelled.push_str("### ");
            labelled.push_str(name);
            labelled.push('\n');
            labelled.push_str(text);
            labelled.push_str("\n\n");
        }

        if !self.config.summarize_rounds {
            return Ok(labelled);
        }

        let request = invoke::build_request(
            &self.config.summarizer_model,
            SUMMARIZER_SYSTEM_PROMPT,
            &build_summarizer_prompt(query, &labelled),
            None,
            self.config.summarizer_max_tokens,
            true,
        );

        let mut stream =
            match invoke::invoke_stream(Arc::clone(&self.provider), request, policy).await {
                Ok(stream) => stream,
                Err(error) => {
                    warn!(%error, "summarizer unavailable, using labelled contributions");
                    return Ok(labelled);
                }
            };

        let mut summary = String::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(text) => {
                    summary.push_str(&text);
                    send(
                        events,
                        ResponseEvent::Chunk {
                            agent: SUMMARIZER_AGENT_NAME.to_string(),
                            round,
                            text,
                        },
                    )
                    .await?;
                }
                Err(error) => {
                    warn!(%error, "summarizer stream failed, using labelled contributions");
                    send(
                        events,
                        ResponseEvent::AgentAbsent {
                            agent: SUMMARIZER_AGENT_NAME.to_string(),
                            round,
                            reason: error.to_string(),
                        },
                    )
                    .await?;
                    return Ok(labelled);
                }
            }
        }

        if summary.trim().is_empty() {
            return Ok(labelled);
        }
        Ok(summary)
    }
}

/// Wraps stream establishment so it happens inside the merge, under the
/// concurrency limit, with the permit held until the stream ends.
fn lazy_stream(
    provider: Arc<dyn LlmProvider>,
    request: super::message::ChatRequest,
    policy: RetryPolicy,
    semaphore: Arc<Semaphore>,
) -> ChunkStream {
    Box::pin(
        futures_util::stream::once(async move {
            let permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| AgentError::Orchestration {
                    message: "concurrency limiter closed".to_string(),
                })?;
            let inner = invoke::invoke_stream(provider, request, policy).await?;
            let guarded: ChunkStream = Box::pin(inner.map(move |item| {
                let _permit = &permit;
                item
            }));
            Ok::<ChunkStream, AgentError>(guarded)
        })
        .try_flatten(),
    )
}

async fn send(
    events: &mpsc::Sender<Result<ResponseEvent, AgentError>>,
    event: ResponseEvent,
) -> Result<(), AgentError> {
    events
        .send(Ok(event))
        .await
        .map_err(|_| AgentError::Orchestration {
            message: "response stream closed by caller".to_string(),
        })
}

/// Token-level Jaccard similarity between two texts.
#[allow(clippy::cast_precision_loss)]
fn token_jaccard(a: &str, b: &str) -> f32 {
    let left: HashSet<&str> = a.split_whitespace().collect();
    let right: HashSet<&str> = b.split_whitespace().collect();
    if left.is_empty() && right.is_empty() {
        return 1.0;
    }
    let intersection = left.intersection(&right).count();
    let union = left.union(&right).count();
    intersection as f32 / union as f32
}

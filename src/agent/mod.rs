//! Multi-agent query orchestration.
//!
//! A query enters through the [`Pipeline`], is classified by the
//! [`Categorizer`], mapped to a dispatch plan by the [`Router`], and
//! executed by the [`IterationEngine`], which streams merged agent
//! output back through a [`ResponseStream`]. All backend traffic flows
//! through the [`LlmProvider`] seam.

pub mod aggregator;
pub mod categorizer;
pub mod config;
pub mod engine;
pub mod invoke;
pub mod message;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod query;
pub mod registry;
pub mod retrieval;
pub mod router;

#[cfg(test)]
pub(crate) mod testing;

pub use categorizer::Categorizer;
pub use message::{ChatMessage, ChatRequest, ChatResponse, ImagePayload, Role, TokenUsage};
pub use config::{AgentConfig, AgentConfigBuilder};
pub use engine::{EngineOutcome, IterationEngine};
pub use pipeline::Pipeline;
pub use provider::{ChunkStream, LlmProvider};
pub use providers::create_provider;
pub use query::{
    Attribution, FinalResponse, Query, ResponseEvent, ResponseStream, Turn,
};
pub use registry::{AgentDescriptor, AgentRegistry, Category};
pub use retrieval::{NullRetriever, Passage, Retriever};
pub use router::{DispatchMode, DispatchPlan, Router};

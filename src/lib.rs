//! Conclave: multi-agent query orchestration.
//!
//! Routes natural-language (and image) queries to one or more specialist
//! LLM agents, optionally running bounded collaborative refinement rounds
//! before streaming a final answer back to the caller.
//!
//! # Architecture
//!
//! ```text
//! Query → Pipeline
//!   ├── Categorizer (one agent call → set of categories)
//!   ├── Router (categories → DispatchPlan: single | collaborative)
//!   ├── IterationEngine (bounded rounds, concurrent fan-out per round)
//!   │   └── StreamAggregator (arrival-order merge of agent chunk streams)
//!   └── ResponseStream (live chunks + terminal attribution)
//! ```
//!
//! The inference backend is reached only through the [`agent::LlmProvider`]
//! trait; the orchestration core never assumes a specific vendor. Per-agent
//! failures are absorbed at the round boundary — a degraded answer with
//! explicit attribution is always preferred over no answer.

pub mod agent;
pub mod error;

pub use error::AgentError;

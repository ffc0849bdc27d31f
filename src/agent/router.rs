//! Dispatch planning.
//!
//! The router maps a category set onto concrete agents and decides
//! between single-agent and collaborative dispatch. It is a pure
//! function of the registry, the category set, and the query flags;
//! identical inputs always produce the same plan.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use super::query::Query;
use super::registry::{AgentDescriptor, AgentRegistry, Category};

/// How a query is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// One agent, one round, no merge step.
    Single,
    /// Multiple agents refine over bounded rounds.
    Collaborative,
}

/// A concrete execution plan for one query.
#[derive(Debug, Clone)]
pub struct DispatchPlan {
    /// Execution mode.
    pub mode: DispatchMode,
    /// Participating agents, in category priority order, deduplicated.
    pub agents: Vec<AgentDescriptor>,
    /// Maximum refinement rounds for this plan.
    pub round_budget: usize,
}

/// Maps category sets to dispatch plans.
#[derive(Debug, Clone)]
pub struct Router {
    registry: Arc<AgentRegistry>,
    round_budget: usize,
}

impl Router {
    /// Creates a router over the given registry.
    #[must_use]
    pub const fn new(registry: Arc<AgentRegistry>, round_budget: usize) -> Self {
        Self {
            registry,
            round_budget,
        }
    }

    /// Builds the dispatch plan for a categorized query.
    ///
    /// Categories are visited in priority order; a category with no
    /// registered agent resolves to the fallback agent. An empty set
    /// (the unparseable-categorization case) dispatches the fallback
    /// agent alone. Exactly one resolved agent means single dispatch
    /// unless the query demands deep analysis.
    #[must_use]
    pub fn route(&self, categories: &BTreeSet<Category>, query: &Query) -> DispatchPlan {
        let mut agents: Vec<AgentDescriptor> = Vec::new();
        let mut push_unique = |agent: &AgentDescriptor, agents: &mut Vec<AgentDescriptor>| {
            if !agents.iter().any(|a| a.name == agent.name) {
                agents.push(agent.clone());
            }
        };

        for &category in categories {
            let mut mapped = false;
            for agent in self.registry.agents_for(category) {
                mapped = true;
                push_unique(agent, &mut agents);
            }
            if !mapped {
                debug!(%category, "no agent registered, using fallback");
                push_unique(self.registry.fallback(), &mut agents);
            }
        }

        if agents.is_empty() {
            push_unique(self.registry.fallback(), &mut agents);
        }

        let collaborative = agents.len() > 1 || query.deep_analysis;
        let (mode, round_budget) = if collaborative {
            (DispatchMode::Collaborative, self.round_budget.max(1))
        } else {
            (DispatchMode::Single, 1)
        };

        debug!(
            ?mode,
            agents = agents.len(),
            round_budget,
            "dispatch plan built"
        );

        DispatchPlan {
            mode,
            agents,
            round_budget,
        }
    }
}

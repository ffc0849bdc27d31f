//! Category taxonomy and the read-only agent registry.
//!
//! Every specialist is an [`AgentDescriptor`] — an identity bound to a
//! category affinity and a backend model reference — dispatched through
//! the one uniform invocation path. The registry is constructed once at
//! startup and never mutated; requests share it behind an `Arc`.

use serde::{Deserialize, Serialize};

use super::config::AgentConfig;

/// Fixed taxonomy of query categories.
///
/// Declaration order doubles as the deterministic tie-break priority:
/// when multiple categories are equally weighted, the earlier variant
/// wins. `Ord` derives from declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Self-reflective feedback on the input.
    Reflection,
    /// Step-by-step problem solving.
    Solution,
    /// Knowledge lookup and direct question answering.
    Inquiry,
    /// Mentorship and guidance.
    Guidance,
    /// Image and visual-data analysis.
    Visual,
    /// Code review and generation.
    Coding,
    /// Data analysis and insight extraction.
    Analytics,
    /// Logical reasoning over scenarios.
    Reasoning,
}

impl Category {
    /// All categories in tie-break priority order.
    pub const ALL: [Self; 8] = [
        Self::Reflection,
        Self::Solution,
        Self::Inquiry,
        Self::Guidance,
        Self::Visual,
        Self::Coding,
        Self::Analytics,
        Self::Reasoning,
    ];

    /// Canonical token for this category, as presented to the categorizer.
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::Reflection => "Reflection",
            Self::Solution => "Solution",
            Self::Inquiry => "Inquiry",
            Self::Guidance => "Guidance",
            Self::Visual => "Visual",
            Self::Coding => "Coding",
            Self::Analytics => "Analytics",
            Self::Reasoning => "Reasoning",
        }
    }

    /// Parses a single word as a category token, case-insensitively.
    ///
    /// Returns `None` for anything that is not exactly a known token.
    #[must_use]
    pub fn parse_token(word: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.token().eq_ignore_ascii_case(word))
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

/// A configured agent identity.
///
/// Immutable after construction; the registry hands out references only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    /// Human-readable agent name, used in attribution and chunk labels.
    pub name: String,
    /// Category this agent specializes in.
    pub category: Category,
    /// Backend model reference.
    pub model: String,
}

/// Process-wide, read-only registry of configured agents.
///
/// Maps categories to eligible agents and designates a fallback agent
/// (the general-purpose Inquiry specialist) for unmapped categories and
/// unparseable categorizations.
#[derive(Debug)]
pub struct AgentRegistry {
    agents: Vec<AgentDescriptor>,
    fallback: AgentDescriptor,
}

impl AgentRegistry {
    /// Creates a registry from an explicit agent list and fallback.
    #[must_use]
    pub const fn new(agents: Vec<AgentDescriptor>, fallback: AgentDescriptor) -> Self {
        Self { agents, fallback }
    }

    /// Builds the default registry: one specialist per category, all on
    /// the configured specialist model, with the Inquiry agent as fallback.
    #[must_use]
    pub fn from_config(config: &AgentConfig) -> Self {
        let agents: Vec<AgentDescriptor> = Category::ALL
            .into_iter()
            .map(|category| AgentDescriptor {
                name: format!("{category} Agent"),
                category,
                model: config.agent_model.clone(),
            })
            .collect();

        let fallback = agents
            .iter()
            .find(|a| a.category == Category::Inquiry)
            .cloned()
            .unwrap_or_else(|| AgentDescriptor {
                name: "Inquiry Agent".to_string(),
                category: Category::Inquiry,
                model: config.agent_model.clone(),
            });

        Self { agents, fallback }
    }

    /// Returns every agent eligible for the given category, in
    /// registration order.
    pub fn agents_for(&self, category: Category) -> impl Iterator<Item = &AgentDescriptor> {
        self.agents.iter().filter(move |a| a.category == category)
    }

    /// The fallback agent used for unmapped categories.
    #[must_use]
    pub const fn fallback(&self) -> &AgentDescriptor {
        &self.fallback
    }

    /// All registered agents.
    #[must_use]
    pub fn agents(&self) -> &[AgentDescriptor] {
        &self.agents
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn test_config() -> AgentConfig {
        AgentConfig::builder()
            .api_key("test")
            .build()
            .unwrap_or_else(|_| unreachable!())
    }

    #[test_case("coding", Some(Category::Coding); "lowercase")]
    #[test_case("VISUAL", Some(Category::Visual); "uppercase")]
    #[test_case("Reasoning", Some(Category::Reasoning); "canonical")]
    #[test_case("codingx", None; "no partial match")]
    #[test_case("", None; "empty word")]
    fn test_parse_token(word: &str, expected: Option<Category>) {
        assert_eq!(Category::parse_token(word), expected);
    }

    #[test]
    fn test_priority_order_is_declaration_order() {
        assert!(Category::Reflection < Category::Solution);
        assert!(Category::Coding < Category::Analytics);
        let mut sorted = Category::ALL;
        sorted.sort();
        assert_eq!(sorted, Category::ALL);
    }

    #[test]
    fn test_default_registry_covers_all_categories() {
        let registry = AgentRegistry::from_config(&test_config());
        for category in Category::ALL {
            assert_eq!(registry.agents_for(category).count(), 1, "{category}");
        }
        assert_eq!(registry.fallback().category, Category::Inquiry);
    }

    #[test]
    fn test_multiple_agents_per_category() {
        let mk = |name: &str| AgentDescriptor {
            name: name.to_string(),
            category: Category::Coding,
            model: "m".to_string(),
        };
        let fallback = AgentDescriptor {
            name: "General".to_string(),
            category: Category::Inquiry,
            model: "m".to_string(),
        };
        let registry = AgentRegistry::new(vec![mk("A"), mk("B")], fallback);
        let names: Vec<&str> = registry
            .agents_for(Category::Coding)
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, vec!["A", "B"]);
    }
}

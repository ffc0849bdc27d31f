//! System prompts and context builders for agents.
//!
//! Prompts are the core instructions that define each agent's behavior.
//! Context builders format the user message for each round, threading the
//! prior round's merged output back in as added context.

use std::fmt::Write;

use super::query::{Query, Turn};
use super::registry::Category;
use super::retrieval::Passage;

/// System prompt for the categorizer call.
pub const CATEGORIZER_SYSTEM_PROMPT: &str = "You are a query categorizer. \
Analyze the user's query and determine which type of agent is most suited \
to handle it, choosing only from the given list of available agents. If \
the query requires collaboration between multiple agents, list every \
required participant.";

/// System prompt for the round-merge summarizer.
pub const SUMMARIZER_SYSTEM_PROMPT: &str = "You are a synthesis expert \
collaborating with specialist agents. Combine their contributions into a \
single coherent answer to the user's query. Preserve every substantive \
point, reconcile disagreements explicitly, and do not invent content that \
no contribution supports.";

/// Specialist system prompt for the given category.
#[must_use]
pub const fn specialist_system_prompt(category: Category) -> &'static str {
    match category {
        Category::Reflection => {
            "You are a self-reflective agent. Reflect on the input and provide \
             feedback. Include strengths, areas for improvement, and \
             suggestions for growth."
        }
        Category::Solution => {
            "You are a problem-solving agent. Solve the problem step by step \
             and provide a structured solution."
        }
        Category::Inquiry => {
            "You are an answering agent. Answer the question with a clear and \
             concise response. When supporting passages are provided, use \
             them where they are relevant."
        }
        Category::Guidance => {
            "You are a mentorship expert. Provide advice and guidance, \
             offering actionable steps for personal or professional growth."
        }
        Category::Visual => {
            "You are a highly capable AI assistant with perfect vision and \
             exceptional attention to detail, specialized in analyzing images \
             and extracting comprehensive information. Analyze the visual \
             data and provide insights or suggestions based on it."
        }
        Category::Coding => {
            "You are a coding expert. Review or generate code for the task \
             and provide optimized and well-documented code."
        }
        Category::Analytics => {
            "You are a data analytics expert. Analyze the data and provide \
             insights, including key findings, trends, and recommendations."
        }
        Category::Reasoning => {
            "You are a reasoning expert. Apply logical reasoning to the \
             scenario and provide clear inferences and conclusions."
        }
    }
}

/// Builds the categorizer user message listing the known category tokens.
#[must_use]
pub fn build_categorizer_prompt(query: &Query) -> String {
    let mut tokens = String::new();
    for (i, category) in Category::ALL.into_iter().enumerate() {
        if i > 0 {
            tokens.push_str(", ");
        }
        tokens.push_str(category.token());
    }

    let mut prompt = format!(
        "Available Agents: [{tokens}].\n\
         Query: {}\n\
         Provide your response in the format:\n\
         Category: <AgentType>\n\
         Collaboration: <Yes/No>\n\
         Reason: <Short explanation>\n\
         InitialCollaborators: [<AgentType1>, <AgentType2>, ...]. Include \
         all required participating agents if Collaboration is 'Yes'.",
        query.text
    );

    if query.image.is_some() {
        prompt.push_str("\nNote: the query includes an attached image.");
    }

    prompt
}

/// Builds the context given to every agent in a round.
///
/// Round 0 context is the original query plus conversation history;
/// round *k* additionally carries round *k−1*'s merged output for
/// refinement.
#[must_use]
pub fn build_round_context(query: &Query, prior_merged: Option<&str>, round: usize) -> String {
    let mut context = String::new();

    if !query.history.is_empty() {
        context.push_str("Conversation so far:\n");
        context.push_str(&build_history_block(&query.history));
        context.push('\n');
    }

    let _ = writeln!(context, "Query: {}", query.text);

    if let Some(merged) = prior_merged {
        let _ = write!(
            context,
            "\nThe collaborating agents produced this combined answer in \
             round {}:\n{merged}\n\nRefine, correct, and extend it from \
             your own area of expertise.",
            round.saturating_sub(1)
        );
    }

    context
}

/// Formats conversation history as labelled lines, oldest first.
#[must_use]
pub fn build_history_block(history: &[Turn]) -> String {
    let mut block = String::new();
    for turn in history {
        let label = match turn.role {
            super::message::Role::User => "User",
            super::message::Role::Assistant => "Assistant",
            super::message::Role::System => "System",
        };
        let _ = writeln!(block, "{label}: {}", turn.content);
    }
    block
}

/// Appends retrieved passages to an agent context.
#[must_use]
pub fn build_augmentation_block(context: &str, passages: &[Passage]) -> String {
    let mut augmented = context.to_string();
    augmented.push_str("\n\nSupporting passages (ranked):\n");
    for (i, passage) in passages.iter().enumerate() {
        let _ = writeln!(augmented, "{}. {}", i + 1, passage.text);
    }
    augmented
}

/// Builds the summarizer user message from labelled round contributions.
#[must_use]
pub fn build_summarizer_prompt(query: &Query, labelled_contributions: &str) -> String {
    format!(
        "Original query: {}\n\nAgent contributions this round:\n\n\
         {labelled_contributions}\n\nProduce the single combined answer.",
        query.text
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::Role;

    #[test]
    fn test_categorizer_prompt_lists_all_tokens() {
        let prompt = build_categorizer_prompt(&Query::new("how do I sort a vec?"));
        for category in Category::ALL {
            assert!(prompt.contains(category.token()), "{category}");
        }
        assert!(prompt.contains("how do I sort a vec?"));
        assert!(!prompt.contains("attached image"));
    }

    #[test]
    fn test_categorizer_prompt_notes_image() {
        let query = Query::new("what is this?").with_image(
            crate::agent::message::ImagePayload::from_bytes("image/png", b"p"),
        );
        assert!(build_categorizer_prompt(&query).contains("attached image"));
    }

    #[test]
    fn test_round_zero_context() {
        let query = Query::new("explain lifetimes").with_history(vec![Turn {
            role: Role::User,
            content: "hi".to_string(),
        }]);
        let context = build_round_context(&query, None, 0);
        assert!(context.contains("Conversation so far:"));
        assert!(context.contains("User: hi"));
        assert!(context.contains("Query: explain lifetimes"));
        assert!(!context.contains("combined answer"));
    }

    #[test]
    fn test_later_round_context_carries_merge() {
        let query = Query::new("explain lifetimes");
        let context = build_round_context(&query, Some("draft answer"), 1);
        assert!(context.contains("round 0"));
        assert!(context.contains("draft answer"));
        assert!(context.contains("Refine"));
    }

    #[test]
    fn test_augmentation_block_ranks_passages() {
        let passages = vec![
            Passage {
                text: "first".to_string(),
                source: None,
            },
            Passage {
                text: "second".to_string(),
                source: Some("kb".to_string()),
            },
        ];
        let augmented = build_augmentation_block("ctx", &passages);
        assert!(augmented.starts_with("ctx"));
        assert!(augmented.contains("1. first"));
        assert!(augmented.contains("2. second"));
    }

    #[test]
    fn test_every_category_has_a_prompt() {
        for category in Category::ALL {
            assert!(!specialist_system_prompt(category).is_empty());
        }
    }
}

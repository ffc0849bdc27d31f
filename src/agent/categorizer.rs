//! Query categorization.
//!
//! A single non-streaming model call classifies the query into one or
//! more categories from the fixed taxonomy. The categorizer's free-text
//! response is scanned for category tokens; anything else in the response
//! is ignored. An answer containing no recognizable token is a
//! [`AgentError::MalformedCategorization`], which the pipeline downgrades
//! to fallback dispatch rather than failing the query.

use std::collections::BTreeSet;

use tracing::debug;

use super::config::AgentConfig;
use super::invoke::{self, RetryPolicy};
use super::prompt::{CATEGORIZER_SYSTEM_PROMPT, build_categorizer_prompt};
use super::provider::LlmProvider;
use super::query::Query;
use super::registry::Category;
use crate::error::AgentError;

/// Classifies queries into the category taxonomy.
#[derive(Debug, Clone)]
pub struct Categorizer {
    model: String,
    max_tokens: u32,
    policy: RetryPolicy,
}

impl Categorizer {
    /// Builds a categorizer from configuration.
    #[must_use]
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            model: config.categorizer_model.clone(),
            max_tokens: config.categorizer_max_tokens,
            policy: RetryPolicy::from_config(config),
        }
    }

    /// Categorizes the query.
    ///
    /// The returned set iterates in deterministic priority order. A query
    /// with an attached image always includes [`Category::Visual`],
    /// whatever the model answered.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::MalformedCategorization`] when no category
    /// token can be extracted from the model response, or the underlying
    /// invocation error when the call itself fails.
    pub async fn categorize(
        &self,
        provider: &dyn LlmProvider,
        query: &Query,
    ) -> Result<BTreeSet<Category>, AgentError> {
        let request = invoke::build_request(
            &self.model,
            CATEGORIZER_SYSTEM_PROMPT,
            &build_categorizer_prompt(query),
            None,
            self.max_tokens,
            false,
        );

        let response = invoke::invoke_text(provider, &request, self.policy).await?;
        let mut categories = parse_categories(&response.content)?;

        if query.image.is_some() {
            categories.insert(Category::Visual);
        }

        debug!(?categories, "query categorized");
        Ok(categories)
    }
}

/// Extracts category tokens from free-text categorizer output.
///
/// Words are split on non-alphanumeric boundaries so tokens embedded in
/// the structured answer format ("Category: Coding", "[Coding, Visual]")
/// are found regardless of surrounding punctuation.
fn parse_categories(content: &str) -> Result<BTreeSet<Category>, AgentError> {
    let categories: BTreeSet<Category> = content
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter_map(Category::parse_token)
        .collect();

    if categories.is_empty() {
        return Err(AgentError::MalformedCategorization {
            content: content.to_string(),
        });
    }

    Ok(categories)
}

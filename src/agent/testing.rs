//! Shared test double for the provider seam.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures_util::stream;

use super::message::{ChatRequest, ChatResponse, TokenUsage};
use super::provider::{ChunkStream, LlmProvider};
use crate::error::AgentError;

type Script = Box<dyn Fn(usize, &ChatRequest) -> Result<String, AgentError> + Send + Sync>;

/// Provider whose responses come from a script keyed on the call index
/// and the request. Streaming responses are split on word boundaries so
/// multi-chunk behavior gets exercised.
pub(crate) struct ScriptedProvider {
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub(crate) fn new(
        script: impl Fn(usize, &ChatRequest) -> Result<String, AgentError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    /// Total calls made so far, across both entry points.
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let content = (self.script)(call, request)?;
        Ok(ChatResponse {
            content,
            usage: TokenUsage::default(),
            finish_reason: Some("stop".to_string()),
        })
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChunkStream, AgentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let text = (self.script)(call, request)?;
        let chunks: Vec<Result<String, AgentError>> = text
            .split_inclusive(' ')
            .map(|piece| Ok(piece.to_string()))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}

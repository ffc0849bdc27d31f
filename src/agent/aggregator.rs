//! Arrival-order stream aggregation.
//!
//! Merges per-agent chunk streams into one ordered stream. Each source
//! gets a forwarder task that stamps chunks with a shared arrival
//! sequence number and pushes them into a bounded channel; channel order
//! therefore is arrival order, and chunks from one source can never
//! overtake each other. A failing source is reduced to a single
//! [`MergeEvent::SourceFailed`] marker without disturbing its peers.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::provider::ChunkStream;
use crate::error::AgentError;

const MERGE_CHANNEL_CAPACITY: usize = 64;

/// One labelled chunk of agent output.
#[derive(Debug, Clone)]
pub struct PartialChunk {
    /// Agent that produced the chunk.
    pub agent: Arc<str>,
    /// Round the chunk belongs to.
    pub round: usize,
    /// Arrival sequence number, strictly increasing across the merge.
    pub seq: u64,
    /// Chunk text.
    pub text: String,
}

/// Events on the merged stream.
#[derive(Debug)]
pub enum MergeEvent {
    /// A chunk arrived from some source.
    Chunk(PartialChunk),
    /// A source failed; no further chunks from it will arrive.
    SourceFailed {
        /// The failed agent.
        agent: Arc<str>,
        /// Round in which it failed.
        round: usize,
        /// The failure.
        error: AgentError,
    },
}

/// One input stream to the merge, labelled with its agent identity.
pub struct ChunkSource {
    /// Agent name for chunk labelling.
    pub agent: Arc<str>,
    /// Round this source belongs to.
    pub round: usize,
    /// The chunk stream itself.
    pub stream: ChunkStream,
}

/// The merged output stream.
///
/// Dropping it aborts all forwarder tasks, cancelling the in-flight
/// source streams.
pub struct MergedStream {
    rx: mpsc::Receiver<MergeEvent>,
    tasks: Vec<JoinHandle<()>>,
}

impl Stream for MergedStream {
    type Item = MergeEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for MergedStream {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Merges the given sources into one arrival-ordered stream.
///
/// The merged stream ends when every source has either completed or
/// failed. Empty text chunks are dropped. Each failing source yields
/// exactly one [`MergeEvent::SourceFailed`] and is then abandoned.
#[must_use]
pub fn merge(sources: Vec<ChunkSource>) -> MergedStream {
    let (tx, rx) = mpsc::channel(MERGE_CHANNEL_CAPACITY);
    let seq = Arc::new(AtomicU64::new(0));

    let tasks: Vec<JoinHandle<()>> = sources
        .into_iter()
        .map(|source| {
            let tx = tx.clone();
            let seq = Arc::clone(&seq);
            tokio::spawn(forward_source(source, tx, seq))
        })
        .collect();

    MergedStream { rx, tasks }
}

async fn forward_source(
    mut source: ChunkSource,
    tx: mpsc::Sender<MergeEvent>,
    seq: Arc<AtomicU64>,
) {
    while let Some(item) = source.stream.next().await {
        match item {
            Ok(text) => {
                if text.is_empty() {
                    continue;
                }
                let chunk = PartialChunk {
                    agent: Arc::clone(&source.agent),
                    round: source.round,
                    seq: seq.fetch_add(1, Ordering::Relaxed),
                    text,
                };
                if tx.send(MergeEvent::Chunk(chunk)).await.is_err() {
                    // Receiver gone; the merge was cancelled.
                    return;
                }
            }
            Err(error) => {
                debug!(agent = %source.agent, %error, "source stream failed");
                let _ = tx
                    .send(MergeEvent::SourceFailed {
                        agent: Arc::clone(&source.agent),
                        round: source.round,
                        error,
                    })
                    .await;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::collections::HashMap;

    fn ok_source(agent: &str, chunks: &[&str]) -> ChunkSource {
        let items: Vec<Result<String, AgentError>> =
            chunks.iter().map(|c| Ok((*c).to_string())).collect();
        ChunkSource {
            agent: Arc::from(agent),
            round: 0,
            stream: Box::pin(stream::iter(items)),
        }
    }

    async fn collect(merged: MergedStream) -> Vec<MergeEvent> {
        merged.collect().await
    }

    #[tokio::test]
    async fn test_single_source_order_preserved() {
        let merged = merge(vec![ok_source("a", &["one", "two", "three"])]);
        let events = collect(merged).await;
        let texts: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                MergeEvent::Chunk(c) => Some(c.text.as_str()),
                MergeEvent::SourceFailed { .. } => None,
            })
            .collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_per_source_order_survives_interleaving() {
        let merged = merge(vec![
            ok_source("a", &["a1", "a2", "a3"]),
            ok_source("b", &["b1", "b2"]),
        ]);
        let events = collect(merged).await;

        let mut per_agent: HashMap<String, Vec<String>> = HashMap::new();
        let mut last_seq = None;
        for event in &events {
            if let MergeEvent::Chunk(chunk) = event {
                // Sequence numbers strictly increase in channel order.
                if let Some(prev) = last_seq {
                    assert!(chunk.seq > prev);
                }
                last_seq = Some(chunk.seq);
                per_agent
                    .entry(chunk.agent.to_string())
                    .or_default()
                    .push(chunk.text.clone());
            }
        }
        assert_eq!(per_agent.get("a").map(Vec::len), Some(3));
        assert_eq!(
            per_agent.get("a").cloned().unwrap_or_default(),
            vec!["a1", "a2", "a3"]
        );
        assert_eq!(
            per_agent.get("b").cloned().unwrap_or_default(),
            vec!["b1", "b2"]
        );
    }

    #[tokio::test]
    async fn test_failed_source_yields_one_marker() {
        let failing = ChunkSource {
            agent: Arc::from("bad"),
            round: 1,
            stream: Box::pin(stream::iter(vec![
                Ok("partial".to_string()),
                Err(AgentError::BackendUnavailable {
                    message: "gone".to_string(),
                }),
                Ok("never seen".to_string()),
            ])),
        };
        let events = collect(merge(vec![failing, ok_source("good", &["fine"])])).await;

        let failures: Vec<&MergeEvent> = events
            .iter()
            .filter(|e| matches!(e, MergeEvent::SourceFailed { .. }))
            .collect();
        assert_eq!(failures.len(), 1);

        let texts: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                MergeEvent::Chunk(c) => Some(c.text.as_str()),
                MergeEvent::SourceFailed { .. } => None,
            })
            .collect();
        assert!(texts.contains(&"partial"));
        assert!(texts.contains(&"fine"));
        assert!(!texts.contains(&"never seen"));
    }

    #[tokio::test]
    async fn test_empty_chunks_dropped() {
        let merged = merge(vec![ok_source("a", &["", "x", ""])]);
        let events = collect(merged).await;
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_no_sources_ends_immediately() {
        let events = collect(merge(Vec::new())).await;
        assert!(events.is_empty());
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(32))]

        // Per-source order is preserved no matter how the sources
        // interleave.
        #[test]
        fn prop_per_source_order_preserved(
            a in proptest::collection::vec("[a-z]{1,6}", 1..8),
            b in proptest::collection::vec("[a-z]{1,6}", 1..8),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap_or_else(|_| unreachable!());
            let (got_a, got_b) = rt.block_on(async {
                let a_refs: Vec<&str> = a.iter().map(String::as_str).collect();
                let b_refs: Vec<&str> = b.iter().map(String::as_str).collect();
                let events =
                    collect(merge(vec![ok_source("a", &a_refs), ok_source("b", &b_refs)])).await;
                let texts_for = |agent: &str| -> Vec<String> {
                    events
                        .iter()
                        .filter_map(|e| match e {
                            MergeEvent::Chunk(c) if &*c.agent == agent => Some(c.text.clone()),
                            _ => None,
                        })
                        .collect()
                };
                (texts_for("a"), texts_for("b"))
            });
            proptest::prop_assert_eq!(got_a, a);
            proptest::prop_assert_eq!(got_b, b);
        }
    }

    #[tokio::test]
    async fn test_drop_aborts_forwarders() {
        let pending = ChunkSource {
            agent: Arc::from("stuck"),
            round: 0,
            stream: Box::pin(stream::pending()),
        };
        let merged = merge(vec![pending]);
        let handle = merged.tasks[0].abort_handle();
        drop(merged);
        for _ in 0..16 {
            if handle.is_finished() {
                return;
            }
            tokio::task::yield_now().await;
        }
        assert!(handle.is_finished(), "forwarder task not aborted");
    }
}

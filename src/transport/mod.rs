//! Streaming transport for conversation turns.
//!
//! The validated reply is delivered as fixed-size chunks with periodic
//! keepalives, then a single terminal event carrying the full structured
//! result. One task owns the sender end, which makes the ordering guarantee
//! (terminal event last, exactly once) structural rather than careful.

use crate::agent::{ConversationRequest, ConversationResult, Orchestrator};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub const DEFAULT_CHUNK_SIZE: usize = 120;
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportEvent {
    Chunk(String),
    Keepalive,
    Final(Box<ConversationResult>),
}

impl TransportEvent {
    /// Wire encoding: `data: <json>\n\n` events, `: ping\n\n` comments for
    /// keepalive. The stream closes cleanly after `Final`.
    pub fn to_sse(&self) -> String {
        match self {
            Self::Chunk(text) => format!("data: {}\n\n", json!({ "chunk": text })),
            Self::Keepalive => ": ping\n\n".to_string(),
            Self::Final(result) => format!("data: {}\n\n", json!({ "final": result })),
        }
    }
}

/// Split a reply into chunks of at most `chunk_size` characters, always on
/// a character boundary. Concatenating the chunks restores the reply.
pub fn chunk_reply(reply: &str, chunk_size: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;
    for ch in reply.chars() {
        current.push(ch);
        count += 1;
        if count == chunk_size {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Run one turn and stream it. The returned stream yields content chunks
/// interleaved with keepalives, then exactly one `Final` event. Dropping
/// the stream stops all further writes; the underlying turn is allowed to
/// finish in the background and its output is logged and discarded.
pub fn stream_turn(
    orchestrator: Arc<Orchestrator>,
    request: ConversationRequest,
    chunk_size: usize,
    keepalive: Duration,
) -> ReceiverStream<TransportEvent> {
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(keepalive);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // the first tick fires immediately; skip it

        let turn = orchestrator.run(&request, None);
        tokio::pin!(turn);

        let result = loop {
            tokio::select! {
                result = &mut turn => break result,
                _ = ticker.tick() => {
                    if tx.send(TransportEvent::Keepalive).await.is_err() {
                        // Consumer disconnected mid-turn. Let the model call
                        // finish so the outcome is logged, then discard it.
                        let result = turn.await;
                        tracing::info!(
                            intent = %result.intent,
                            "turn completed after disconnect; output discarded"
                        );
                        return;
                    }
                }
            }
        };

        for chunk in chunk_reply(&result.reply, chunk_size) {
            if tx.send(TransportEvent::Chunk(chunk)).await.is_err() {
                tracing::info!("consumer disconnected mid-stream; dropping remainder");
                return;
            }
        }
        if tx
            .send(TransportEvent::Final(Box::new(result)))
            .await
            .is_err()
        {
            tracing::info!("consumer disconnected before terminal event");
        }
    });

    ReceiverStream::new(rx)
}

//! Stream pump: emits planned fragments as paced SSE envelopes.
//!
//! Each streaming request gets its own task. The task pushes envelopes into a
//! bounded channel and sleeps for the plan's delay after every content
//! fragment. Dropping the receiving side (client disconnect) wakes the task
//! out of its sleep and ends it without a terminal envelope.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_stream::wrappers::ReceiverStream;

use crate::openai::{tokens_for_chars, ChatCompletionChunk, Usage};
use crate::planner::Plan;

/// At most one envelope is buffered ahead of the consumer.
const CHANNEL_CAPACITY: usize = 1;

const FINISH_REASON: &str = "stop";

/// Identity shared by every envelope of one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    pub id: String,
    /// Unix seconds, read once when the stream starts.
    pub created: u64,
    pub model: String,
}

/// One wire-protocol unit.
#[derive(Debug, Clone)]
pub enum StreamEnvelope {
    Content(ChatCompletionChunk),
    /// Finish-reason chunk followed by the usage chunk.
    Terminal {
        finish: ChatCompletionChunk,
        usage: ChatCompletionChunk,
    },
}

impl StreamEnvelope {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal { .. })
    }

    /// Delta text carried by a content envelope.
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Content(chunk) => chunk
                .choices
                .first()
                .and_then(|choice| choice.delta.content.as_deref()),
            Self::Terminal { .. } => None,
        }
    }

    pub fn usage(&self) -> Option<Usage> {
        match self {
            Self::Content(_) => None,
            Self::Terminal { usage, .. } => usage.usage,
        }
    }

    /// Encode as SSE `data:` events. The terminal envelope also carries the
    /// `[DONE]` sentinel.
    pub fn to_sse(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Content(chunk) => Ok(format!("data: {}\n\n", serde_json::to_string(chunk)?)),
            Self::Terminal { finish, usage } => Ok(format!(
                "data: {}\n\ndata: {}\n\ndata: [DONE]\n\n",
                serde_json::to_string(finish)?,
                serde_json::to_string(usage)?
            )),
        }
    }
}

/// How a pump task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    /// All fragments and the terminal envelope were delivered.
    Completed { fragments: usize },
    /// The consumer went away; `fragments` content envelopes were delivered.
    Cancelled { fragments: usize },
}

/// Spawn a pump for `plan`. The stream ends after the terminal envelope or
/// when the task observes cancellation.
pub fn run(
    plan: Plan,
    header: StreamHeader,
    prompt_tokens: u32,
) -> (ReceiverStream<StreamEnvelope>, JoinHandle<PumpOutcome>) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let handle = tokio::spawn(pump(tx, plan, header, prompt_tokens));
    (ReceiverStream::new(rx), handle)
}

async fn pump(
    tx: mpsc::Sender<StreamEnvelope>,
    plan: Plan,
    header: StreamHeader,
    prompt_tokens: u32,
) -> PumpOutcome {
    let Plan {
        fragments, delay, ..
    } = plan;
    let mut sent = 0;
    let mut chars = 0;

    for fragment in fragments {
        chars += fragment.text.chars().count();
        let chunk = if sent == 0 {
            ChatCompletionChunk::first_content(&header, fragment.text)
        } else {
            ChatCompletionChunk::content(&header, fragment.text)
        };
        let envelope = StreamEnvelope::Content(chunk);
        if tx.send(envelope).await.is_err() {
            tracing::debug!(id = %header.id, sent, "Stream consumer closed, stopping pump");
            return PumpOutcome::Cancelled { fragments: sent };
        }
        sent += 1;

        tokio::select! {
            () = tx.closed() => {
                tracing::debug!(id = %header.id, sent, "Stream consumer closed, stopping pump");
                return PumpOutcome::Cancelled { fragments: sent };
            }
            () = sleep(delay) => {}
        }
    }

    let usage = Usage::new(prompt_tokens, tokens_for_chars(chars));
    let terminal = StreamEnvelope::Terminal {
        finish: ChatCompletionChunk::finish(&header, FINISH_REASON),
        usage: ChatCompletionChunk::usage(&header, usage),
    };
    if tx.send(terminal).await.is_err() {
        tracing::debug!(id = %header.id, sent, "Stream consumer closed before terminal envelope");
        return PumpOutcome::Cancelled { fragments: sent };
    }

    tracing::debug!(
        id = %header.id,
        fragments = sent,
        completion_tokens = usage.completion_tokens,
        "Completion stream finished"
    );
    PumpOutcome::Completed { fragments: sent }
}

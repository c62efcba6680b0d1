//! OpenAI chat completions API mock.
//!
//! Request/response types for `/v1/chat/completions` and `/v1/models`, plus
//! the handlers that route a request through the planner and pump.

use axum::{
    body::Body,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::RuntimeState;
use crate::errors::ApiError;
use crate::planner;
use crate::pump::{self, StreamEnvelope, StreamHeader};
use crate::selector::select_response_text;

/// Model used when the request omits one.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Request body for chat completions.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub stream: bool,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub role: String,
    /// Plain string, content-part array, or null.
    #[serde(default)]
    pub content: Option<Value>,
}

impl Message {
    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(Value::String(content.to_string())),
        }
    }

    /// String content, if the message has any.
    pub fn text(&self) -> Option<&str> {
        self.content.as_ref().and_then(Value::as_str)
    }
}

/// Non-streaming response.
#[derive(Debug, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub created: u64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

#[derive(Debug, Serialize)]
pub struct Choice {
    pub index: u32,
    pub message: ResponseMessage,
    pub finish_reason: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ResponseMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// One `chat.completion.chunk` SSE payload.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: &'static str,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<&'static str>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Delta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatCompletionChunk {
    fn with_choices(header: &StreamHeader, choices: Vec<ChunkChoice>, usage: Option<Usage>) -> Self {
        Self {
            id: header.id.clone(),
            object: "chat.completion.chunk",
            created: header.created,
            model: header.model.clone(),
            choices,
            usage,
        }
    }

    /// Incremental content delta.
    pub fn content(header: &StreamHeader, content: String) -> Self {
        Self::with_choices(
            header,
            vec![ChunkChoice {
                index: 0,
                delta: Delta {
                    role: None,
                    content: Some(content),
                },
                finish_reason: None,
            }],
            None,
        )
    }

    /// Content delta that also announces the assistant role, sent first.
    pub fn first_content(header: &StreamHeader, content: String) -> Self {
        let mut chunk = Self::content(header, content);
        for choice in &mut chunk.choices {
            choice.delta.role = Some("assistant");
        }
        chunk
    }

    /// Empty delta carrying the finish reason.
    pub fn finish(header: &StreamHeader, finish_reason: &'static str) -> Self {
        Self::with_choices(
            header,
            vec![ChunkChoice {
                index: 0,
                delta: Delta::default(),
                finish_reason: Some(finish_reason),
            }],
            None,
        )
    }

    /// Trailing chunk with no choices and the usage totals.
    pub fn usage(header: &StreamHeader, usage: Usage) -> Self {
        Self::with_choices(header, Vec::new(), Some(usage))
    }
}

#[derive(Debug, Serialize)]
pub struct ModelList {
    pub object: &'static str,
    pub data: Vec<ModelObject>,
}

#[derive(Debug, Serialize)]
pub struct ModelObject {
    pub id: String,
    pub object: &'static str,
    pub created: u64,
    pub owned_by: &'static str,
    pub permission: Vec<Value>,
    pub root: String,
    pub parent: Option<String>,
}

/// Approximate completion tokens: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> u32 {
    tokens_for_chars(text.chars().count())
}

pub fn tokens_for_chars(chars: usize) -> u32 {
    u32::try_from(chars.div_ceil(4)).unwrap_or(u32::MAX)
}

/// Build the full, non-streaming completion object.
pub fn completion_response(
    header: StreamHeader,
    content: &str,
    prompt_tokens: u32,
) -> ChatCompletionResponse {
    ChatCompletionResponse {
        id: header.id,
        object: "chat.completion",
        created: header.created,
        model: header.model,
        choices: vec![Choice {
            index: 0,
            message: ResponseMessage {
                role: "assistant",
                content: content.to_string(),
            },
            finish_reason: "stop",
        }],
        usage: Usage::new(prompt_tokens, estimate_tokens(content)),
    }
}

/// Main handler for /v1/chat/completions
pub async fn chat_completions(
    state: &RuntimeState,
    req: ChatCompletionRequest,
) -> Result<Response, ApiError> {
    let Some(profile) = state.registry.find(&req.model) else {
        tracing::warn!(model = %req.model, "Unknown model requested");
        return Err(ApiError::UnknownModel(req.model));
    };

    let responses = &state.config.responses;
    let text = select_response_text(&req.messages, &responses.custom, responses.default_for(profile));
    let prompt_tokens = state.config.usage.prompt_tokens;
    let header = StreamHeader {
        id: state.next_completion_id(),
        created: now_unix(),
        model: req.model,
    };

    if !req.stream {
        tracing::debug!(id = %header.id, profile = %profile.id, "Serving non-streaming completion");
        return Ok(Json(completion_response(header, text, prompt_tokens)).into_response());
    }

    let mut rng = state.request_rng();
    let plan = planner::plan(text, profile, &state.config.token_strategy, &mut rng);
    tracing::info!(
        id = %header.id,
        profile = %profile.id,
        policy = plan.policy.name(),
        fragments = plan.fragments.len(),
        chunk_size = plan.chunk_size,
        delay_ms = plan.delay_ms(),
        "Starting completion stream"
    );

    let (envelopes, _pump) = pump::run(plan, header, prompt_tokens);
    Ok(sse_response(envelopes))
}

/// Wrap an envelope stream into a `text/event-stream` response.
pub fn sse_response<S>(envelopes: S) -> Response
where
    S: Stream<Item = StreamEnvelope> + Send + 'static,
{
    let body = Body::from_stream(envelopes.map(|envelope| envelope.to_sse()));

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        body,
    )
        .into_response()
}

/// Handler for GET /v1/models
pub fn list_models(state: &RuntimeState) -> ModelList {
    let created = now_unix();
    ModelList {
        object: "list",
        data: state
            .registry
            .iter()
            .map(|profile| ModelObject {
                id: profile.listed_id(),
                object: "model",
                created,
                owned_by: "streampace",
                permission: Vec::new(),
                root: profile.id.clone(),
                parent: None,
            })
            .collect(),
    }
}

/// Get current unix timestamp.
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

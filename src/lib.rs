//! streampace - Mock OpenAI-compatible chat completion server
//!
//! Serves canned responses on `/v1/chat/completions`, streaming them as
//! Server-Sent Events paced to each model's configured tokens-per-second.
//! Useful for integration tests of chat clients without running a model.
//!
//! # Usage as a Library
//!
//! ```rust,no_run
//! use streampace::{Config, RuntimeState, create_router};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::default();
//!     let state = RuntimeState::new(config).expect("valid config");
//!     let app = create_router(state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8787").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```
//!
//! # Endpoints
//!
//! - `POST /v1/chat/completions` - chat completions, streaming or not
//! - `GET /v1/models` - configured model profiles
//! - `GET /health` - liveness

pub mod config;
pub mod errors;
pub mod openai;
pub mod planner;
pub mod pump;
pub mod registry;
pub mod selector;

pub use config::{Config, RuntimeState};
pub use errors::{ApiError, ConfigError};
pub use planner::{plan, Fragment, Plan, Policy, StrategyConfig, StrategyKind};
pub use pump::{PumpOutcome, StreamEnvelope, StreamHeader};
pub use registry::{ModelProfile, ModelRegistry};

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

type AppState = Arc<RuntimeState>;

const CORS_MAX_AGE: Duration = Duration::from_secs(86_400);

/// Creates the configured Axum router.
///
/// # Example
///
/// ```rust,no_run
/// use streampace::{Config, RuntimeState, create_router};
///
/// let state = RuntimeState::new(Config::default()).unwrap();
/// let app = create_router(state);
/// ```
pub fn create_router(state: Arc<RuntimeState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/models", get(models_handler))
        .route("/v1/chat/completions", post(chat_completions_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive().max_age(CORS_MAX_AGE))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn models_handler(State(state): State<AppState>) -> Json<openai::ModelList> {
    Json(openai::list_models(&state))
}

async fn chat_completions_handler(
    State(state): State<AppState>,
    Json(req): Json<openai::ChatCompletionRequest>,
) -> Result<Response, ApiError> {
    openai::chat_completions(&state, req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    fn app_with(config: Config) -> Router {
        create_router(RuntimeState::new(config).unwrap())
    }

    fn chat_request(body: &Value) -> Request<Body> {
        Request::post("/v1/chat/completions")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(body).unwrap()))
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.models.push(ModelProfile::new("fast", 100_000.0, 4096));
        config.responses.custom.insert("hi".to_string(), "Hello world".to_string());
        config.responses.custom.insert("silence".to_string(), String::new());
        config
    }

    /// Parse an SSE body into its `data:` payloads.
    fn sse_events(body: &str) -> Vec<&str> {
        body.split("\n\n")
            .filter(|event| !event.is_empty())
            .map(|event| event.strip_prefix("data: ").unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = app_with(Config::default())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "ok");
    }

    #[tokio::test]
    async fn test_models_endpoint() {
        let response = app_with(fast_config())
            .oneshot(Request::get("/v1/models").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let value: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(value["object"], "list");

        let data = value["data"].as_array().unwrap();
        assert_eq!(data.len(), 5);
        assert_eq!(data[0]["id"], "deepseek-r1-1.5B-140tps");
        assert_eq!(data[0]["root"], "deepseek-r1-1.5B");
        assert_eq!(data[0]["object"], "model");
        assert!(data[0]["parent"].is_null());
        assert_eq!(data[4]["id"], "fast-100000tps");
    }

    #[tokio::test]
    async fn test_non_streaming_completion() {
        let body = serde_json::json!({
            "model": "fast-v2",
            "messages": [{"role": "user", "content": "hi"}]
        });

        let response = app_with(fast_config()).oneshot(chat_request(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let value: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(value["object"], "chat.completion");
        assert_eq!(value["model"], "fast-v2");
        assert!(value["id"].as_str().unwrap().starts_with("chatcmpl-"));
        assert_eq!(value["choices"][0]["message"]["content"], "Hello world");
        assert_eq!(value["choices"][0]["finish_reason"], "stop");
        assert_eq!(value["usage"]["prompt_tokens"], 10);
        assert_eq!(value["usage"]["completion_tokens"], 3);
        assert_eq!(value["usage"]["total_tokens"], 13);
    }

    #[tokio::test]
    async fn test_streaming_completion() {
        let body = serde_json::json!({
            "model": "fast",
            "messages": [{"role": "user", "content": "hi"}],
            "stream": true
        });

        let response = app_with(fast_config()).oneshot(chat_request(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/event-stream");
        assert_eq!(response.headers()["cache-control"], "no-cache");

        let body = body_string(response).await;
        let events = sse_events(&body);
        assert_eq!(*events.last().unwrap(), "[DONE]");

        let chunks: Vec<Value> = events[..events.len() - 1]
            .iter()
            .map(|e| serde_json::from_str(e).unwrap())
            .collect();
        let id = chunks[0]["id"].clone();
        assert!(chunks.iter().all(|c| c["id"] == id));
        assert!(chunks.iter().all(|c| c["object"] == "chat.completion.chunk"));

        let (usage_chunk, rest) = chunks.split_last().unwrap();
        let (finish_chunk, content_chunks) = rest.split_last().unwrap();

        let text: String = content_chunks
            .iter()
            .map(|c| c["choices"][0]["delta"]["content"].as_str().unwrap())
            .collect();
        assert_eq!(text, "Hello world");
        assert!(content_chunks.iter().all(|c| c["choices"][0]["finish_reason"].is_null()));

        assert_eq!(finish_chunk["choices"][0]["finish_reason"], "stop");
        assert_eq!(usage_chunk["choices"], serde_json::json!([]));
        assert_eq!(usage_chunk["usage"]["completion_tokens"], 3);
        assert_eq!(usage_chunk["usage"]["total_tokens"], 13);
    }

    #[tokio::test]
    async fn test_streaming_empty_response() {
        let body = serde_json::json!({
            "model": "fast",
            "messages": [{"role": "user", "content": "silence"}],
            "stream": true
        });

        let response = app_with(fast_config()).oneshot(chat_request(&body)).await.unwrap();
        let body = body_string(response).await;
        let events = sse_events(&body);

        assert_eq!(events.len(), 3);
        let usage: Value = serde_json::from_str(events[1]).unwrap();
        assert_eq!(usage["usage"]["completion_tokens"], 0);
        assert_eq!(events[2], "[DONE]");
    }

    #[tokio::test]
    async fn test_thinking_profile_uses_thinking_text() {
        let mut config = fast_config();
        let mut profile = ModelProfile::new("reasoner", 50.0, 4096);
        profile.thinking = true;
        config.models.push(profile);

        let body = serde_json::json!({
            "model": "reasoner",
            "messages": [{"role": "user", "content": "anything"}]
        });
        let response = app_with(config).oneshot(chat_request(&body)).await.unwrap();
        let value: Value = serde_json::from_str(&body_string(response).await).unwrap();

        let content = value["choices"][0]["message"]["content"].as_str().unwrap();
        assert!(content.starts_with("<think>"));
    }

    #[tokio::test]
    async fn test_unknown_model() {
        let body = serde_json::json!({
            "model": "no-such-model",
            "messages": [{"role": "user", "content": "Hello"}]
        });

        let response = app_with(Config::default()).oneshot(chat_request(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let value: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(value["error"]["code"], "model_not_found");
        assert_eq!(value["error"]["message"], "Model no-such-model not found");
    }

    #[tokio::test]
    async fn test_missing_model_defaults_and_is_unknown() {
        let body = serde_json::json!({ "messages": [] });

        let response = app_with(Config::default()).oneshot(chat_request(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let value: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(value["error"]["message"], "Model gpt-3.5-turbo not found");
    }

    #[tokio::test]
    async fn test_malformed_body_rejected() {
        let response = app_with(Config::default())
            .oneshot(
                Request::post("/v1/chat/completions")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let response = app_with(Config::default())
            .oneshot(
                Request::options("/v1/chat/completions")
                    .header("origin", "http://localhost:3000")
                    .header("access-control-request-method", "POST")
                    .header("access-control-request-headers", "content-type")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_success());
        let headers = response.headers();
        assert_eq!(headers["access-control-allow-origin"], "http://localhost:3000");
        assert_eq!(headers["access-control-allow-credentials"], "true");
        assert_eq!(headers["access-control-max-age"], "86400");
    }
}

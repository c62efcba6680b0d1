//! Error types for configuration loading and request handling.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Fatal problems found while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Model profile has an empty id")]
    EmptyModelId,

    #[error("Model {id} has invalid tokens_per_second {value}; must be a positive number")]
    InvalidTokenSpeed { id: String, value: f64 },

    #[error("Invalid token strategy: {details}")]
    InvalidStrategy { details: String },
}

/// Per-request failures surfaced to API callers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Model {0} not found")]
    UnknownModel(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::UnknownModel(_) => StatusCode::NOT_FOUND,
        }
    }

    fn kind_and_code(&self) -> (&'static str, &'static str) {
        match self {
            Self::UnknownModel(_) => ("invalid_request_error", "model_not_found"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (kind, code) = self.kind_and_code();
        let body = json!({
            "error": {
                "message": self.to_string(),
                "type": kind,
                "param": null,
                "code": code
            }
        });

        (self.status(), Json(body)).into_response()
    }
}

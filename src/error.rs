//! Error taxonomy for the request pipeline.
//!
//! Every handler failure is a [`PipelineError`], which renders itself as the
//! `{ "success": false, "error": ... }` body shared by all endpoints.
//! Structured-output parse trouble has no variant; the interpreter degrades
//! to an "unknown" verdict instead.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// The completion service call failed or was rejected.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct UpstreamError {
    pub message: String,
}

impl UpstreamError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// An insert into the row store failed.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PersistenceError {
    pub message: String,
}

impl PersistenceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// One or more required body fields are absent or empty.
    #[error("Missing or empty required field(s): {}", .missing.join(", "))]
    Validation { missing: Vec<&'static str> },

    /// A field is present but holds a value outside its allowed set.
    #[error("Invalid value for field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// The body could not be read as JSON.
    #[error("Malformed JSON body: {0}")]
    MalformedBody(String),

    #[error("Request too large{}", .limit.map(|l| format!(" (body exceeded limit {} bytes)", l)).unwrap_or_default())]
    PayloadTooLarge { limit: Option<usize> },

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl PipelineError {
    pub fn missing(field: &'static str) -> Self {
        PipelineError::Validation {
            missing: vec![field],
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PipelineError::Validation { .. }
            | PipelineError::InvalidField { .. }
            | PipelineError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            PipelineError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            PipelineError::Upstream(_) | PipelineError::Persistence(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short label used in metrics and telemetry lines.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation { .. } | PipelineError::InvalidField { .. } => "validation",
            PipelineError::MalformedBody(_) => "malformed_body",
            PipelineError::PayloadTooLarge { .. } => "payload_too_large",
            PipelineError::Upstream(_) => "upstream",
            PipelineError::Persistence(_) => "persistence",
        }
    }
}

/// Body returned for every failed request.
#[derive(Debug, Serialize, Clone)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

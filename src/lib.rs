//! Core library for promptrelay. This module wires the completion client,
//! the audit store and the endpoint pipeline into an Axum router.
//!
//! Collaborators are injected: [`AppState::new`] takes any
//! [`CompletionService`] and [`RowStore`], and [`build_state_from_env`]
//! builds the production pair from the environment.

pub mod audit;
mod config;
pub mod completion;
pub mod endpoints;
pub mod envelope;
pub mod error;
pub mod interpret;
pub mod metrics;
pub mod pipeline;
pub mod store;
pub mod telemetry;

pub use config::{AppConfig, CompletionConfig, RotationConfig, StoreConfig};

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, FailedToBufferBody};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Map, Value};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::audit::{AuditLogger, AuditOutcome};
use crate::completion::{CompletionService, OpenAiClient};
use crate::endpoints::{save_chat, Endpoint, SAVE_CHAT};
use crate::error::PipelineError;
use crate::metrics::{ExternalGauges, Metrics, Observation};
use crate::pipeline::Pipeline;
use crate::store::{MemoryStore, PostgrestStore, RowStore};
use crate::telemetry::{RequestEvent, RotatingWriter, TelemetrySink};

/// Shared state handed to every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    pub endpoints: Arc<Vec<Arc<dyn Endpoint>>>,
    pub save_chat_enabled: bool,
    pub max_request_bytes: Option<usize>,
    pub cors_origins: Option<Vec<String>>,
    pub telemetry: TelemetrySink,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Assemble state around explicit collaborators.
    pub fn new(
        config: &AppConfig,
        completion: Arc<dyn CompletionService>,
        store: Arc<dyn RowStore>,
    ) -> Self {
        let endpoints = endpoints::build(&config.endpoint_order);
        let save_chat_enabled = config.endpoint_order.iter().any(|n| n == SAVE_CHAT);

        let mut names: Vec<&'static str> = endpoints.iter().map(|e| e.name()).collect();
        if save_chat_enabled {
            names.push(SAVE_CHAT);
        }

        let writer = match config.log_file.as_deref() {
            Some(path) => match RotatingWriter::open(path, config.rotation.clone()) {
                Ok(w) => Some(w),
                Err(e) => {
                    tracing::warn!(path=%path, error=%e, "Failed to open LOG_FILE; telemetry disabled");
                    None
                }
            },
            None => None,
        };

        Self {
            pipeline: Pipeline::new(completion, AuditLogger::new(store)),
            endpoints: Arc::new(endpoints),
            save_chat_enabled,
            max_request_bytes: config.max_request_bytes,
            cors_origins: config.cors_origins.clone(),
            telemetry: TelemetrySink::new(writer, config.log_stdout),
            metrics: Arc::new(Metrics::new(&names)),
        }
    }

    fn audit(&self) -> &AuditLogger {
        self.pipeline.audit()
    }
}

/// Build state from environment variables (see [`AppConfig::from_env`]).
///
/// Without `SUPABASE_URL` the audit trail goes to an in-process store and is
/// lost on restart.
pub async fn build_state_from_env() -> Result<AppState, Box<dyn std::error::Error>> {
    let config = AppConfig::from_env().map_err(|e| -> Box<dyn std::error::Error> { e.into() })?;
    Ok(build_state(&config))
}

/// Build the production collaborators described by `config`.
pub fn build_state(config: &AppConfig) -> AppState {
    if config.completion.api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY not set; completion requests will be sent unauthenticated");
    }
    let completion: Arc<dyn CompletionService> = Arc::new(OpenAiClient::new(
        config.completion.base_url.clone(),
        config.completion.api_key.clone(),
        config.completion.model.clone(),
    ));

    let store: Arc<dyn RowStore> = match config.store.url.as_deref() {
        Some(url) => {
            if config.store.service_key.is_none() {
                tracing::warn!("SUPABASE_SERVICE_ROLE_KEY not set; store writes will likely be rejected");
            }
            Arc::new(PostgrestStore::new(url, config.store.service_key.clone()))
        }
        None => {
            tracing::warn!("SUPABASE_URL not set; audit rows are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };
    if config.log_file.is_none() {
        tracing::warn!("Telemetry file disabled: LOG_FILE not set");
    }

    AppState::new(config, completion, store)
}

/// Build the Axum router and attach handlers.
pub fn app(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/metrics", get(metrics_handler));

    for endpoint in state.endpoints.iter() {
        let endpoint = endpoint.clone();
        let path = endpoint.path();
        router = router.route(
            path,
            post(move |State(state): State<AppState>, body: Result<Bytes, BytesRejection>| {
                let endpoint = endpoint.clone();
                async move { completion_handler(state, endpoint, body).await }
            }),
        );
    }
    if state.save_chat_enabled {
        router = router.route(save_chat::PATH, post(save_chat_handler));
    }

    // Unset means unlimited, not axum's 2 MB default.
    router = match state.max_request_bytes {
        Some(limit) => router.layer(DefaultBodyLimit::max(limit)),
        None => router.layer(DefaultBodyLimit::disable()),
    };
    router
        .layer(cors_layer(state.cors_origins.as_deref()))
        .with_state(state)
}

/// Wildcard origin unless an allow-list is configured.
fn cors_layer(origins: Option<&[String]>) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    match origins {
        Some(list) => {
            let parsed: Vec<HeaderValue> = list.iter().filter_map(|o| o.parse().ok()).collect();
            if parsed.is_empty() {
                layer.allow_origin(Any)
            } else {
                layer.allow_origin(AllowOrigin::list(parsed))
            }
        }
        None => layer.allow_origin(Any),
    }
}

/// Read the body as untyped JSON. An empty body is an empty object, so a
/// bare POST fails validation (400) rather than parsing.
fn parse_body(state: &AppState, body: Result<Bytes, BytesRejection>) -> Result<Value, PipelineError> {
    let bytes = match body {
        Ok(bytes) => bytes,
        Err(BytesRejection::FailedToBufferBody(FailedToBufferBody::LengthLimitError(_))) => {
            tracing::warn!(limit = ?state.max_request_bytes, "request body exceeded configured limit");
            return Err(PipelineError::PayloadTooLarge {
                limit: state.max_request_bytes,
            });
        }
        Err(other) => return Err(PipelineError::MalformedBody(other.body_text())),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_slice(&bytes).map_err(|e| PipelineError::MalformedBody(e.to_string()))
}

fn success_body(key: &str, value: Value) -> Value {
    let mut body = Map::new();
    body.insert("success".into(), Value::Bool(true));
    body.insert(key.into(), value);
    Value::Object(body)
}

/// Record metrics and the telemetry line for one finished request.
fn observe(
    state: &AppState,
    endpoint: &str,
    start: Instant,
    status: StatusCode,
    error: Option<&PipelineError>,
    audit: Option<&AuditOutcome>,
) {
    let latency_ms = start.elapsed().as_millis() as u64;
    let error_kind = error.map(PipelineError::kind);
    state.metrics.observe(
        endpoint,
        &Observation {
            latency_ms,
            error_kind,
            audit,
        },
    );
    state.telemetry.emit(&RequestEvent {
        endpoint,
        status: status.as_u16(),
        success: error.is_none(),
        latency_ms,
        error_kind,
        audit: audit.map(AuditOutcome::label),
    });
}

/// Shared handler for every completion-backed endpoint.
async fn completion_handler(
    state: AppState,
    endpoint: Arc<dyn Endpoint>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let start = Instant::now();
    let outcome = match parse_body(&state, body) {
        Ok(body) => state.pipeline.run(endpoint.as_ref(), &body).await,
        Err(err) => Err(err),
    };
    match outcome {
        Ok(output) => {
            observe(&state, endpoint.name(), start, StatusCode::OK, None, Some(&output.audit));
            let body = success_body(endpoint.response_key(), output.result.to_json());
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => {
            observe(&state, endpoint.name(), start, err.status(), Some(&err), None);
            err.into_response()
        }
    }
}

async fn save_chat_handler(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let start = Instant::now();
    let outcome = match parse_body(&state, body) {
        Ok(body) => save_chat::save(state.audit(), &body).await,
        Err(err) => Err(err),
    };
    match outcome {
        Ok(()) => {
            let written = AuditOutcome::Written {
                collection: save_chat::COLLECTION,
                rows: 1,
            };
            observe(&state, SAVE_CHAT, start, StatusCode::OK, None, Some(&written));
            let mut body = Map::new();
            body.insert("success".into(), Value::Bool(true));
            (StatusCode::OK, Json(Value::Object(body))).into_response()
        }
        Err(err) => {
            observe(&state, SAVE_CHAT, start, err.status(), Some(&err), None);
            err.into_response()
        }
    }
}

/// Liveness endpoint for container checks.
async fn healthz_handler(State(state): State<AppState>) -> Response {
    let mut endpoints: Vec<&str> = state.endpoints.iter().map(|e| e.path()).collect();
    if state.save_chat_enabled {
        endpoints.push(save_chat::PATH);
    }
    let json = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": endpoints,
        "completion": state.pipeline.completion_name(),
        "store": state.audit().store_name(),
    });
    (StatusCode::OK, Json(json)).into_response()
}

/// Prometheus-style metrics exposition.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let body = state.metrics.render(&ExternalGauges {
        audit_rows_written_total: state.audit().rows_written_total(),
        telemetry_lines_total: state.telemetry.lines_total(),
        telemetry_write_errors_total: state.telemetry.write_errors_total(),
        log_file_size_bytes: state.telemetry.file_size_bytes(),
    });
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use promptrelay::completion::{CompletionRequest, CompletionService};
use promptrelay::error::{PersistenceError, UpstreamError};
use promptrelay::store::{MemoryStore, Row, RowStore};
use promptrelay::{app, AppConfig, AppState};
use serde_json::Value;
use tower::ServiceExt;

/// Tracks environment variable mutations and restores originals on drop.
pub struct EnvGuard {
    originals: HashMap<String, Option<String>>,
}

impl EnvGuard {
    pub fn new() -> Self {
        Self {
            originals: HashMap::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.capture(key);
        std::env::set_var(key, value);
    }

    pub fn remove(&mut self, key: &str) {
        self.capture(key);
        std::env::remove_var(key);
    }

    fn capture(&mut self, key: &str) {
        if self.originals.contains_key(key) {
            return;
        }
        let original = std::env::var(key).ok();
        self.originals.insert(key.to_string(), original);
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, original) in self.originals.drain() {
            match original {
                Some(value) => std::env::set_var(&key, value),
                None => std::env::remove_var(&key),
            }
        }
    }
}

/// Completion fake that answers every call with the same scripted reply and
/// remembers what it was asked.
pub struct ScriptedCompletion {
    reply: Result<String, String>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn replying(content: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(content.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(message.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl CompletionService for ScriptedCompletion {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, UpstreamError> {
        self.calls.lock().unwrap().push(request);
        self.reply.clone().map_err(UpstreamError::new)
    }
}

/// Store whose every insert fails.
pub struct BrokenStore;

#[async_trait::async_trait]
impl RowStore for BrokenStore {
    fn name(&self) -> &str {
        "broken"
    }

    async fn insert_rows(&self, _collection: &str, _rows: Vec<Row>) -> Result<(), PersistenceError> {
        Err(PersistenceError::new("connection refused"))
    }
}

pub fn router(completion: Arc<dyn CompletionService>, store: Arc<dyn RowStore>) -> Router {
    app(AppState::new(&AppConfig::default(), completion, store))
}

/// Router backed by `completion` and a fresh memory store the test can inspect.
pub fn router_with_memory(completion: Arc<dyn CompletionService>) -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (router(completion, store.clone()), store)
}

pub async fn post_json(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    post_raw(app, path, body.to_string()).await
}

pub async fn post_raw(app: &Router, path: &str, body: String) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("Content-Type", "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

/// One request seen by a [`spawn_recorder`] server.
#[derive(Clone, Debug)]
pub struct Recorded {
    pub path: String,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
}

/// Start a throwaway HTTP server that answers every POST with `status` and
/// `reply`, recording what it received. Returns the base url.
pub async fn spawn_recorder(status: StatusCode, reply: &str) -> (String, Arc<Mutex<Vec<Recorded>>>) {
    use axum::extract::OriginalUri;
    use axum::http::HeaderMap;
    use axum::routing::post;

    let seen: Arc<Mutex<Vec<Recorded>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let reply = reply.to_string();
    let handler = move |OriginalUri(uri): OriginalUri, headers: HeaderMap, body: axum::body::Bytes| {
        let sink = sink.clone();
        let reply = reply.clone();
        async move {
            sink.lock().unwrap().push(Recorded {
                path: uri.path().to_string(),
                headers,
                body: serde_json::from_slice(&body).unwrap_or(Value::Null),
            });
            (status, [("content-type", "application/json")], reply)
        }
    };
    let mock = Router::new().route("/*rest", post(handler));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, mock).await.unwrap();
    });
    (format!("http://{}", addr), seen)
}

//! Row store seam for audit records.
//!
//! Collections are append-only: the service only ever inserts. Identifiers
//! and `created_at` timestamps are assigned by the store, never sent by the
//! caller.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::{Map, Value};

use crate::error::PersistenceError;

/// One row as column name to JSON value.
pub type Row = Map<String, Value>;

/// Capability to append rows to a named collection.
///
/// All rows passed in one call belong to one logical write; implementations
/// should send them together.
#[async_trait::async_trait]
pub trait RowStore: Send + Sync {
    fn name(&self) -> &str;
    async fn insert_rows(&self, collection: &str, rows: Vec<Row>) -> Result<(), PersistenceError>;
}

/// Store backed by a PostgREST endpoint (Supabase `rest/v1`).
pub struct PostgrestStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl PostgrestStore {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, collection)
    }
}

#[async_trait::async_trait]
impl RowStore for PostgrestStore {
    fn name(&self) -> &str {
        "postgrest"
    }

    async fn insert_rows(&self, collection: &str, rows: Vec<Row>) -> Result<(), PersistenceError> {
        let body = Value::Array(rows.into_iter().map(Value::Object).collect());
        let mut rb = self
            .client
            .post(self.collection_url(collection))
            .header("Prefer", "return=minimal")
            .json(&body);
        if let Some(key) = &self.api_key {
            rb = rb.header("apikey", key).bearer_auth(key);
        }
        let resp = rb
            .send()
            .await
            .map_err(|err| PersistenceError::new(err.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| {
                if text.trim().is_empty() {
                    format!("insert into {} failed with status {}", collection, status.as_u16())
                } else {
                    text
                }
            });
        Err(PersistenceError::new(message))
    }
}

/// In-process store. Assigns sequential ids and UTC timestamps the way the
/// hosted table defaults would.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<Row>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every row written to `collection`, in insertion order.
    pub fn rows(&self, collection: &str) -> Vec<Row> {
        self.collections
            .lock()
            .map(|guard| guard.get(collection).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn total_rows(&self) -> usize {
        self.collections
            .lock()
            .map(|guard| guard.values().map(Vec::len).sum())
            .unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl RowStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn insert_rows(&self, collection: &str, rows: Vec<Row>) -> Result<(), PersistenceError> {
        let mut guard = self
            .collections
            .lock()
            .map_err(|_| PersistenceError::new("memory store poisoned"))?;
        let table = guard.entry(collection.to_string()).or_default();
        for mut row in rows {
            let id = table.len() as u64 + 1;
            row.insert("id".into(), Value::from(id));
            row.insert("created_at".into(), Value::from(chrono::Utc::now().to_rfc3339()));
            table.push(row);
        }
        Ok(())
    }
}

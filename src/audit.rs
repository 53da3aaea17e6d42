//! Best-effort audit trail.
//!
//! [`AuditLogger::record`] never fails: a store error is logged, counted and
//! returned as [`AuditOutcome::Failed`] for the caller to inspect or ignore.
//! [`AuditLogger::write`] is the strict variant used where persisting is the
//! whole point of the request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::PersistenceError;
use crate::store::{Row, RowStore};

/// Rows destined for one collection, written in a single insert.
#[derive(Debug, Clone)]
pub struct AuditBatch {
    pub collection: &'static str,
    pub rows: Vec<Row>,
}

impl AuditBatch {
    pub fn single(collection: &'static str, row: Row) -> Self {
        Self {
            collection,
            rows: vec![row],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditOutcome {
    Written { collection: &'static str, rows: usize },
    /// The endpoint had nothing to record for this request.
    Skipped,
    Failed { collection: &'static str, error: String },
}

impl AuditOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            AuditOutcome::Written { .. } => "written",
            AuditOutcome::Skipped => "skipped",
            AuditOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Clone)]
pub struct AuditLogger {
    store: Arc<dyn RowStore>,
    rows_written_total: Arc<AtomicU64>,
    write_failures_total: Arc<AtomicU64>,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self {
            store,
            rows_written_total: Arc::new(AtomicU64::new(0)),
            write_failures_total: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    pub fn rows_written_total(&self) -> u64 {
        self.rows_written_total.load(Ordering::Relaxed)
    }

    pub fn write_failures_total(&self) -> u64 {
        self.write_failures_total.load(Ordering::Relaxed)
    }

    /// Write `batch`, swallowing any failure.
    pub async fn record(&self, batch: Option<AuditBatch>) -> AuditOutcome {
        let Some(batch) = batch else {
            return AuditOutcome::Skipped;
        };
        let collection = batch.collection;
        let rows = batch.rows.len();
        match self.write(batch).await {
            Ok(()) => AuditOutcome::Written { collection, rows },
            Err(err) => AuditOutcome::Failed {
                collection,
                error: err.message,
            },
        }
    }

    /// Write `batch` and report the store error to the caller.
    pub async fn write(&self, batch: AuditBatch) -> Result<(), PersistenceError> {
        if batch.rows.is_empty() {
            return Ok(());
        }
        let collection = batch.collection;
        let rows = batch.rows.len();
        match self.store.insert_rows(collection, batch.rows).await {
            Ok(()) => {
                self.rows_written_total
                    .fetch_add(rows as u64, Ordering::Relaxed);
                tracing::debug!(collection, rows, store = self.store.name(), "audit rows written");
                Ok(())
            }
            Err(err) => {
                self.write_failures_total.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(collection, rows, store = self.store.name(), error = %err, "audit write failed");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    struct BrokenStore;

    #[async_trait::async_trait]
    impl RowStore for BrokenStore {
        fn name(&self) -> &str {
            "broken"
        }
        async fn insert_rows(&self, _collection: &str, _rows: Vec<Row>) -> Result<(), PersistenceError> {
            Err(PersistenceError::new("relation \"chat_history\" does not exist"))
        }
    }

    fn row() -> Row {
        json!({"user_id": "u1"}).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn record_swallows_store_errors() {
        let logger = AuditLogger::new(Arc::new(BrokenStore));
        let outcome = logger
            .record(Some(AuditBatch::single("chat_history", row())))
            .await;
        assert_eq!(
            outcome,
            AuditOutcome::Failed {
                collection: "chat_history",
                error: "relation \"chat_history\" does not exist".into()
            }
        );
        assert_eq!(logger.write_failures_total(), 1);
        assert_eq!(logger.rows_written_total(), 0);
    }

    #[tokio::test]
    async fn record_counts_written_rows() {
        let store = Arc::new(MemoryStore::new());
        let logger = AuditLogger::new(store.clone());
        let batch = AuditBatch {
            collection: "chat_history",
            rows: vec![row(), row()],
        };
        assert_eq!(
            logger.record(Some(batch)).await,
            AuditOutcome::Written {
                collection: "chat_history",
                rows: 2
            }
        );
        assert_eq!(logger.record(None).await, AuditOutcome::Skipped);
        assert_eq!(logger.rows_written_total(), 2);
        assert_eq!(store.rows("chat_history").len(), 2);
    }
}

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Key/value table collaborator. Point reads and writes are keyed by
/// (partition, row); `scan` returns every row in a partition (remote
/// backends page internally with continuation tokens).
#[async_trait]
pub trait TableStore: Send + Sync {
    async fn get(&self, partition: &str, row: &str) -> Result<Option<Value>, StorageError>;

    /// Insert-or-replace. Last write wins.
    async fn put(&self, partition: &str, row: &str, value: Value) -> Result<(), StorageError>;

    async fn delete(&self, partition: &str, row: &str) -> Result<(), StorageError>;

    async fn scan(&self, partition: &str) -> Result<Vec<Value>, StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("storage backend: {0}")]
    Backend(String),
}

/// In-memory table store for local deployments and tests.
#[derive(Default)]
pub struct MemoryTableStore {
    rows: RwLock<HashMap<(String, String), Value>>,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TableStore for MemoryTableStore {
    async fn get(&self, partition: &str, row: &str) -> Result<Option<Value>, StorageError> {
        let rows = self.rows.read().await;
        Ok(rows.get(&(partition.to_string(), row.to_string())).cloned())
    }

    async fn put(&self, partition: &str, row: &str, value: Value) -> Result<(), StorageError> {
        let mut rows = self.rows.write().await;
        rows.insert((partition.to_string(), row.to_string()), value);
        Ok(())
    }

    async fn delete(&self, partition: &str, row: &str) -> Result<(), StorageError> {
        let mut rows = self.rows.write().await;
        rows.remove(&(partition.to_string(), row.to_string()));
        Ok(())
    }

    async fn scan(&self, partition: &str) -> Result<Vec<Value>, StorageError> {
        let rows = self.rows.read().await;
        let mut hits: Vec<(String, Value)> = rows
            .iter()
            .filter(|((p, _), _)| p == partition)
            .map(|((_, r), v)| (r.clone(), v.clone()))
            .collect();
        // Stable row-key order so full scans are deterministic.
        hits.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(hits.into_iter().map(|(_, v)| v).collect())
    }
}

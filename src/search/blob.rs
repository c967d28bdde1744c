use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::SearchError;

/// Blob collaborator holding the search export. One JSON document at a fixed
/// path, overwritten wholesale each publish cycle.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Writes `application/json` content at `path`, replacing any previous
    /// document.
    async fn put_json(&self, path: &str, data: Vec<u8>) -> Result<(), SearchError>;

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, SearchError>;
}

/// In-memory blob store for local deployments and tests.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put_json(&self, path: &str, data: Vec<u8>) -> Result<(), SearchError> {
        let mut blobs = self.blobs.write().await;
        blobs.insert(path.to_string(), data);
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, SearchError> {
        let blobs = self.blobs.read().await;
        Ok(blobs.get(path).cloned())
    }
}

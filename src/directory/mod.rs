use crate::shared::models::NameIdMapping;
use crate::storage::{StorageError, TableStore};
use std::sync::Arc;

const NAME_PARTITION: &str = "username";

/// objectId to display name cache. The knowledge service lowercases entry
/// metadata, so display names are kept here and refreshed on every mutating
/// user action. Last write wins.
pub struct IdentityNameCache {
    store: Arc<dyn TableStore>,
}

impl IdentityNameCache {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self { store }
    }

    pub async fn upsert(&self, object_id: &str, name: &str) -> Result<(), StorageError> {
        let mapping = NameIdMapping {
            object_id: object_id.to_string(),
            name: name.to_string(),
        };
        let value = serde_json::to_value(&mapping)?;
        self.store.put(NAME_PARTITION, object_id, value).await
    }

    pub async fn get_name(&self, object_id: &str) -> Result<Option<String>, StorageError> {
        let value = self.store.get(NAME_PARTITION, object_id).await?;
        match value {
            Some(v) => {
                let mapping: NameIdMapping = serde_json::from_value(v)?;
                Ok(Some(mapping.name))
            }
            None => Ok(None),
        }
    }
}

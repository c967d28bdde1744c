use crate::shared::models::{KbConfiguration, TeamKbMapping};
use crate::storage::{StorageError, TableStore};
use log::info;
use std::sync::Arc;

const CONFIG_PARTITION: &str = "kbconfig";
const CONFIG_ROW: &str = "knowledgebaseId";
const MAPPING_PARTITION: &str = "teams";

/// Singleton knowledge base configuration. At most one per deployment.
pub struct KbConfigStore {
    store: Arc<dyn TableStore>,
}

impl KbConfigStore {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self) -> Result<Option<KbConfiguration>, StorageError> {
        let value = self.store.get(CONFIG_PARTITION, CONFIG_ROW).await?;
        match value {
            Some(v) => Ok(Some(serde_json::from_value(v)?)),
            None => Ok(None),
        }
    }

    pub async fn create(&self, config: &KbConfiguration) -> Result<(), StorageError> {
        let value = serde_json::to_value(config)?;
        self.store.put(CONFIG_PARTITION, CONFIG_ROW, value).await?;
        info!("kb configuration stored: {}", config.kb_id);
        Ok(())
    }

    /// Compensation path: removes the configuration so the next cycle
    /// restarts provisioning from scratch.
    pub async fn delete(&self) -> Result<(), StorageError> {
        self.store.delete(CONFIG_PARTITION, CONFIG_ROW).await
    }
}

/// Team to knowledge base registry. Upserts are idempotent and mappings are
/// never deleted.
pub struct TeamKbRegistry {
    store: Arc<dyn TableStore>,
}

impl TeamKbRegistry {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self { store }
    }

    pub async fn upsert(&self, team_id: &str, kb_id: &str) -> Result<(), StorageError> {
        let mapping = TeamKbMapping {
            team_id: team_id.to_string(),
            kb_id: kb_id.to_string(),
        };
        let value = serde_json::to_value(&mapping)?;
        self.store.put(MAPPING_PARTITION, team_id, value).await?;
        info!("team kb mapping stored: team={} kb={}", team_id, kb_id);
        Ok(())
    }

    pub async fn get(&self, team_id: &str) -> Result<Option<TeamKbMapping>, StorageError> {
        let value = self.store.get(MAPPING_PARTITION, team_id).await?;
        match value {
            Some(v) => Ok(Some(serde_json::from_value(v)?)),
            None => Ok(None),
        }
    }

    pub async fn all(&self) -> Result<Vec<TeamKbMapping>, StorageError> {
        let rows = self.store.scan(MAPPING_PARTITION).await?;
        let mut mappings = Vec::with_capacity(rows.len());
        for row in rows {
            mappings.push(serde_json::from_value(row)?);
        }
        Ok(mappings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryTableStore;

    fn stores() -> (KbConfigStore, TeamKbRegistry) {
        let table: Arc<dyn TableStore> = Arc::new(MemoryTableStore::new());
        (
            KbConfigStore::new(table.clone()),
            TeamKbRegistry::new(table),
        )
    }

    #[tokio::test]
    async fn config_roundtrip_and_delete() {
        let (config, _) = stores();
        assert!(config.get().await.unwrap().is_none());
        config
            .create(&KbConfiguration {
                kb_id: "kb-1".into(),
            })
            .await
            .unwrap();
        assert_eq!(config.get().await.unwrap().unwrap().kb_id, "kb-1");
        config.delete().await.unwrap();
        assert!(config.get().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mapping_upsert_converges_to_last_write() {
        let (_, registry) = stores();
        registry.upsert("team-a", "kb-1").await.unwrap();
        registry.upsert("team-a", "kb-2").await.unwrap();
        registry.upsert("team-b", "kb-2").await.unwrap();
        assert_eq!(registry.get("team-a").await.unwrap().unwrap().kb_id, "kb-2");
        assert_eq!(registry.all().await.unwrap().len(), 2);
    }
}

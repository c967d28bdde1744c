use crate::kb::{KbError, QnaProvider};
use crate::shared::models::{
    Metadata, QnaEntry, SearchEntry, METADATA_CREATED_AT, METADATA_TEAM_ID, METADATA_UPDATED_AT,
    SEARCH_PAGE_SIZE, UNANSWERED,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod blob;

use blob::BlobStore;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    Kb(#[from] KbError),
    #[error("export serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("blob store: {0}")]
    Blob(String),
    #[error("search index: {0}")]
    Index(String),
}

/// Named-command or free-text query against the search index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQueryCommand {
    RecentlyCreated,
    RecentlyEdited,
    Unanswered,
    Text(String),
}

impl SearchQueryCommand {
    /// Resolves an extension command id plus optional query text. Free text
    /// takes precedence over the named command, matching the source service.
    pub fn resolve(command_id: &str, text: &str) -> Self {
        use crate::shared::models::{CREATED_COMMAND_ID, EDITED_COMMAND_ID, UNANSWERED_COMMAND_ID};
        if !text.trim().is_empty() {
            return Self::Text(text.trim().to_string());
        }
        match command_id {
            CREATED_COMMAND_ID => Self::RecentlyCreated,
            EDITED_COMMAND_ID => Self::RecentlyEdited,
            UNANSWERED_COMMAND_ID => Self::Unanswered,
            other => Self::Text(other.to_string()),
        }
    }
}

/// Full-text search index over the published entries. Rebuilt wholesale;
/// queries are team scoped with a fixed page size.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Drops and recreates the index from the given entries (index,
    /// datasource and indexer collapsed into one rebuild at this seam).
    async fn rebuild(&self, entries: Vec<SearchEntry>) -> Result<(), SearchError>;

    async fn query(
        &self,
        command: &SearchQueryCommand,
        team_id: &str,
    ) -> Result<Vec<SearchEntry>, SearchError>;
}

/// Exports the published KB content to the blob store and rebuilds the
/// search index from it. Invoked by the publish orchestrator only.
pub struct SearchIndexSync {
    qna: Arc<QnaProvider>,
    blob: Arc<dyn BlobStore>,
    index: Arc<dyn SearchIndex>,
    export_path: String,
}

impl SearchIndexSync {
    pub fn new(
        qna: Arc<QnaProvider>,
        blob: Arc<dyn BlobStore>,
        index: Arc<dyn SearchIndex>,
        container: &str,
        folder: &str,
        kb_name: &str,
    ) -> Self {
        Self {
            qna,
            blob,
            index,
            export_path: format!("{container}/{folder}/{kb_name}.json"),
        }
    }

    /// Downloads the published entries, writes the flat JSON export, then
    /// rebuilds the index.
    pub async fn sync(&self, kb_id: &str) -> Result<(), SearchError> {
        let documents = self.qna.download_published(kb_id).await?;
        let entries: Vec<SearchEntry> = documents.iter().map(project_entry).collect();

        let json = serde_json::to_vec(&entries)?;
        self.blob.put_json(&self.export_path, json).await?;
        self.index.rebuild(entries.clone()).await?;

        info!(
            "search index synced: kb={} entries={} export={}",
            kb_id,
            entries.len(),
            self.export_path
        );
        Ok(())
    }
}

fn parse_tick(metadata: &[Metadata], name: &str) -> DateTime<Utc> {
    metadata
        .iter()
        .find(|m| m.name == name)
        .and_then(|m| m.value.parse::<i64>().ok())
        .and_then(DateTime::from_timestamp_micros)
        .unwrap_or(DateTime::UNIX_EPOCH)
}

fn project_entry(entry: &QnaEntry) -> SearchEntry {
    SearchEntry {
        id: entry.id.to_string(),
        questions: entry.questions.clone(),
        answer: entry.answer.clone(),
        team_id: entry
            .metadata_value(METADATA_TEAM_ID)
            .unwrap_or_default()
            .to_string(),
        created_date: parse_tick(&entry.metadata, METADATA_CREATED_AT),
        updated_date: parse_tick(&entry.metadata, METADATA_UPDATED_AT),
        metadata: entry.metadata.clone(),
    }
}

/// In-memory search index for local deployments and tests.
#[derive(Default)]
pub struct MemorySearchIndex {
    entries: RwLock<Vec<SearchEntry>>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn rebuild(&self, entries: Vec<SearchEntry>) -> Result<(), SearchError> {
        let mut index = self.entries.write().await;
        *index = entries;
        Ok(())
    }

    async fn query(
        &self,
        command: &SearchQueryCommand,
        team_id: &str,
    ) -> Result<Vec<SearchEntry>, SearchError> {
        let index = self.entries.read().await;
        let mut hits: Vec<SearchEntry> = index
            .iter()
            .filter(|e| e.team_id == team_id)
            .filter(|e| match command {
                SearchQueryCommand::RecentlyCreated | SearchQueryCommand::RecentlyEdited => {
                    e.answer != UNANSWERED
                }
                SearchQueryCommand::Unanswered => e.answer == UNANSWERED,
                SearchQueryCommand::Text(_) => true,
            })
            .cloned()
            .collect();

        match command {
            SearchQueryCommand::RecentlyCreated | SearchQueryCommand::Unanswered => {
                hits.sort_by(|a, b| b.created_date.cmp(&a.created_date));
            }
            SearchQueryCommand::RecentlyEdited => {
                hits.sort_by(|a, b| b.updated_date.cmp(&a.updated_date));
            }
            SearchQueryCommand::Text(query) => {
                let terms: Vec<String> = query
                    .split_whitespace()
                    .map(|t| t.to_lowercase())
                    .collect();
                let score = |e: &SearchEntry| -> usize {
                    let haystack = format!("{} {}", e.questions.join(" "), e.answer).to_lowercase();
                    terms.iter().filter(|t| haystack.contains(t.as_str())).count()
                };
                hits.retain(|e| score(e) > 0);
                hits.sort_by_key(|e| std::cmp::Reverse(score(e)));
            }
        }

        hits.truncate(SEARCH_PAGE_SIZE);
        Ok(hits)
    }
}

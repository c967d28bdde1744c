use crate::kb::{KbError, QnaProvider};
use crate::registry::KbConfigStore;
use crate::search::{SearchError, SearchIndexSync};
use crate::shared::models::KbConfiguration;
use crate::storage::StorageError;
use log::{error, info, warn};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Attempts to persist the kb configuration before compensating.
pub const PERSIST_ATTEMPTS: u32 = 4;

/// Base delay of the jittered exponential persist backoff.
pub const PERSIST_BACKOFF_BASE: Duration = Duration::from_secs(1);

const PERSIST_JITTER_MS: u64 = 250;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Kb(#[from] KbError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Search(#[from] SearchError),
}

/// Periodic reconciliation of draft KB, published KB and search index:
/// ensure the KB exists, publish when dirty, then reindex. A partially
/// provisioned KB is rolled back by deleting it so no orphan remains.
pub struct PublishOrchestrator {
    qna: Arc<QnaProvider>,
    config_store: Arc<KbConfigStore>,
    search_sync: Arc<SearchIndexSync>,
    interval: Duration,
    run_on_startup: bool,
    persist_backoff_base: Duration,
}

impl PublishOrchestrator {
    pub fn new(
        qna: Arc<QnaProvider>,
        config_store: Arc<KbConfigStore>,
        search_sync: Arc<SearchIndexSync>,
        interval: Duration,
        run_on_startup: bool,
    ) -> Self {
        Self {
            qna,
            config_store,
            search_sync,
            interval,
            run_on_startup,
            persist_backoff_base: PERSIST_BACKOFF_BASE,
        }
    }

    /// Shortens the persist backoff. Test hook.
    pub fn with_persist_backoff(mut self, base: Duration) -> Self {
        self.persist_backoff_base = base;
        self
    }

    /// One reconciliation pass. Errors are surfaced to the scheduler loop,
    /// which logs and continues; the aborted-bootstrap path is already
    /// compensated and reports success.
    pub async fn run_cycle(&self) -> Result<(), PublishError> {
        match self.config_store.get().await? {
            Some(config) => {
                if self.qna.is_dirty(&config.kb_id).await? {
                    info!("kb {} is dirty, publishing", config.kb_id);
                    self.qna.publish(&config.kb_id).await?;
                    self.search_sync.sync(&config.kb_id).await?;
                }
            }
            None => {
                if let Some(kb_id) = self.bootstrap().await? {
                    self.search_sync.sync(&kb_id).await?;
                }
            }
        }
        Ok(())
    }

    /// Creates and publishes a fresh KB, then persists its configuration
    /// with bounded jittered exponential backoff. If persistence is
    /// exhausted the KB is deleted (compensation) and the cycle aborts;
    /// the next tick restarts provisioning from scratch.
    async fn bootstrap(&self) -> Result<Option<String>, PublishError> {
        let kb_id = self.qna.create_knowledge_base().await?;
        self.qna.publish(&kb_id).await?;

        if self.persist_config(&kb_id).await {
            info!("kb {kb_id} provisioned and published");
            return Ok(Some(kb_id));
        }

        warn!("kb configuration persist exhausted, deleting kb {kb_id}");
        if let Err(e) = self.qna.delete_knowledge_base(&kb_id).await {
            error!("compensation delete of kb {kb_id} failed: {e}");
        }
        Ok(None)
    }

    async fn persist_config(&self, kb_id: &str) -> bool {
        let config = KbConfiguration {
            kb_id: kb_id.to_string(),
        };
        for attempt in 0..PERSIST_ATTEMPTS {
            match self.config_store.create(&config).await {
                Ok(()) => return true,
                Err(e) => {
                    warn!(
                        "kb configuration persist attempt {}/{} failed: {e}",
                        attempt + 1,
                        PERSIST_ATTEMPTS
                    );
                    if attempt + 1 < PERSIST_ATTEMPTS {
                        let jitter = rand::thread_rng().gen_range(0..PERSIST_JITTER_MS);
                        let delay = self.persist_backoff_base * 2u32.pow(attempt)
                            + Duration::from_millis(jitter);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        false
    }

    /// Runs the cycle on the configured interval, immediately at startup
    /// when configured to. Cycle failures are logged; the loop never exits.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(self.interval);
            if !self.run_on_startup {
                // interval fires immediately; swallow the first tick.
                tick.tick().await;
            }
            loop {
                tick.tick().await;
                if let Err(e) = self.run_cycle().await {
                    error!("publish cycle failed: {e}");
                }
            }
        })
    }
}

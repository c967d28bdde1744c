use kbserver::bot::{routes, CommandProcessor};
use kbserver::config::AppConfig;
use kbserver::directory::IdentityNameCache;
use kbserver::kb::service::RestKnowledgeService;
use kbserver::kb::QnaProvider;
use kbserver::publish::PublishOrchestrator;
use kbserver::registry::{KbConfigStore, TeamKbRegistry};
use kbserver::search::blob::MemoryBlobStore;
use kbserver::search::{MemorySearchIndex, SearchIndexSync};
use kbserver::shared::state::AppState;
use kbserver::storage::MemoryTableStore;
use log::info;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = AppConfig::from_env()?;

    let table_store = Arc::new(MemoryTableStore::new());
    let blob_store = Arc::new(MemoryBlobStore::new());
    let search_index = Arc::new(MemorySearchIndex::new());

    let service = Arc::new(RestKnowledgeService::new(
        &config.knowledge.endpoint,
        &config.knowledge.api_key,
    ));
    let config_store = Arc::new(KbConfigStore::new(table_store.clone()));
    let registry = Arc::new(TeamKbRegistry::new(table_store.clone()));
    let names = Arc::new(IdentityNameCache::new(table_store));

    let qna = Arc::new(QnaProvider::new(
        service,
        config_store.clone(),
        &config.knowledge.kb_name,
        config.knowledge.score_threshold,
    ));
    let search_sync = Arc::new(SearchIndexSync::new(
        qna.clone(),
        blob_store,
        search_index.clone(),
        &config.search.container,
        &config.search.folder,
        &config.knowledge.kb_name,
    ));
    let processor = Arc::new(CommandProcessor::new(
        qna.clone(),
        registry,
        config_store.clone(),
        names,
        search_index,
    ));

    let orchestrator = Arc::new(PublishOrchestrator::new(
        qna,
        config_store,
        search_sync,
        Duration::from_secs(config.publish.interval_secs),
        config.publish.run_on_startup,
    ));
    orchestrator.spawn();

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState { processor });

    let app = routes::configure().with_state(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("kbserver listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub knowledge: KnowledgeConfig,
    pub publish: PublishConfig,
    pub search: SearchExportConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct KnowledgeConfig {
    pub endpoint: String,
    pub api_key: String,
    pub kb_name: String,
    pub score_threshold: f64,
}

#[derive(Clone, Debug)]
pub struct PublishConfig {
    pub interval_secs: u64,
    pub run_on_startup: bool,
}

#[derive(Clone, Debug)]
pub struct SearchExportConfig {
    pub container: String,
    pub folder: String,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid value for {key}: {value}")]
pub struct ConfigError {
    key: &'static str,
    value: String,
}

fn var_or(key: &'static str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: std::str::FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError> {
    let raw = var_or(key, default);
    raw.parse().map_err(|_| ConfigError { key, value: raw })
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig {
                host: var_or("SERVER_HOST", "0.0.0.0"),
                port: parse_var("SERVER_PORT", "3000")?,
            },
            knowledge: KnowledgeConfig {
                endpoint: var_or("KNOWLEDGE_ENDPOINT", "http://localhost:8081"),
                api_key: var_or("KNOWLEDGE_API_KEY", ""),
                kb_name: var_or("KB_NAME", "teamknowledge"),
                score_threshold: parse_var("SCORE_THRESHOLD", "50")?,
            },
            publish: PublishConfig {
                interval_secs: parse_var("PUBLISH_INTERVAL_SECS", "900")?,
                run_on_startup: parse_var("PUBLISH_RUN_ON_STARTUP", "true")?,
            },
            search: SearchExportConfig {
                container: var_or("SEARCH_CONTAINER", "kbserver-search-container"),
                folder: var_or("SEARCH_FOLDER", "kbserver-metadata"),
            },
        })
    }
}

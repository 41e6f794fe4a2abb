//! Application state for CLI commands.
//!
//! Pins the conversation log to the file-backed repository and carries the
//! engine configuration loaded from the data directory.

use std::path::PathBuf;
use std::sync::Arc;

use parley_core::conversation::log::ConversationLog;
use parley_infra::config::load_engine_config;
use parley_infra::filesystem::conversation::FsConversationRepository;
use parley_infra::filesystem::resolve_data_dir;
use parley_types::config::EngineConfig;

pub type ConcreteLog = ConversationLog<FsConversationRepository>;

pub struct AppState {
    pub log: Arc<ConcreteLog>,
    pub config: EngineConfig,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Resolve the data directory, make sure it exists, and load config.
    pub async fn init(data_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = data_dir.unwrap_or_else(resolve_data_dir);
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_engine_config(&data_dir).await;
        let repo = Arc::new(FsConversationRepository::new(&data_dir));

        tracing::debug!(data_dir = %data_dir.display(), "application state initialized");

        Ok(Self {
            log: Arc::new(ConversationLog::new(repo)),
            config,
            data_dir,
        })
    }
}

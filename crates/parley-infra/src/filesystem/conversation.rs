//! Filesystem implementation of `ConversationRepository`.
//!
//! Every file is replaced with write-to-temp-then-rename. Writes to one
//! conversation are serialised by a per-conversation `tokio::sync::Mutex`;
//! index writes are serialised by one more mutex, always taken after the
//! conversation lock.

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use parley_core::conversation::repository::{ConversationRepository, sort_summaries};
use parley_types::conversation::{Conversation, ConversationId, ConversationSummary};
use parley_types::error::RepositoryError;
use parley_types::event::ConversationEvent;

use super::ConversationLayout;
use super::atomic::write_atomic;

/// Conversation store rooted at `{data_dir}/conversations/`.
///
/// Appends read and rewrite the whole `events.jsonl` so the log is only ever
/// replaced by rename, never left with a torn line. Appending costs O(n) in
/// the log size, O(n²) over a conversation's lifetime.
pub struct FsConversationRepository {
    layout: ConversationLayout,
    locks: DashMap<ConversationId, Arc<Mutex<()>>>,
    index_lock: Mutex<()>,
}

impl FsConversationRepository {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            layout: ConversationLayout::new(data_dir),
            locks: DashMap::new(),
            index_lock: Mutex::new(()),
        }
    }

    pub fn layout(&self) -> &ConversationLayout {
        &self.layout
    }

    fn lock_for(&self, id: &ConversationId) -> Arc<Mutex<()>> {
        self.locks
            .entry(*id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn read_metadata(&self, id: &ConversationId) -> Result<Option<Conversation>, RepositoryError> {
        match tokio::fs::read_to_string(self.layout.metadata_path(id)).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn require_metadata(&self, id: &ConversationId) -> Result<Conversation, RepositoryError> {
        self.read_metadata(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn write_metadata(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        let json = serde_json::to_vec_pretty(conversation)?;
        write_atomic(&self.layout.metadata_path(&conversation.id), &json).await?;
        Ok(())
    }

    /// Raw contents of `events.jsonl`; a missing file is an empty log.
    async fn read_events_raw(&self, id: &ConversationId) -> Result<String, RepositoryError> {
        match tokio::fs::read_to_string(self.layout.events_path(id)).await {
            Ok(content) => Ok(content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn read_index(&self) -> Option<Vec<ConversationSummary>> {
        let path = self.layout.index_path();
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("no conversation index at {}", path.display());
                return None;
            }
            Err(err) => {
                warn!("failed to read {}: {err}, rebuilding", path.display());
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(summaries) => Some(summaries),
            Err(err) => {
                warn!("failed to parse {}: {err}, rebuilding", path.display());
                None
            }
        }
    }

    async fn write_index(&self, summaries: &[ConversationSummary]) -> Result<(), RepositoryError> {
        let json = serde_json::to_vec_pretty(summaries)?;
        write_atomic(&self.layout.index_path(), &json).await?;
        Ok(())
    }

    /// Summaries regenerated from every readable conversation directory.
    async fn scan_summaries(&self) -> Result<Vec<ConversationSummary>, RepositoryError> {
        let mut summaries = Vec::new();
        let mut entries = match tokio::fs::read_dir(self.layout.root()).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(summaries),
            Err(err) => return Err(err.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Ok(id) = name.to_string_lossy().parse::<ConversationId>() else {
                debug!(dir = %name.to_string_lossy(), "skipping non-conversation directory");
                continue;
            };

            let mut conversation = match self.read_metadata(&id).await {
                Ok(Some(conversation)) => conversation,
                Ok(None) => {
                    warn!(conversation_id = %id, "conversation directory has no metadata, skipping");
                    continue;
                }
                Err(err) => {
                    warn!(conversation_id = %id, error = %err, "corrupt conversation metadata, skipping");
                    continue;
                }
            };
            let events = match self.read_events_raw(&id).await {
                Ok(raw) => parse_events(&id, &raw),
                Err(err) => {
                    warn!(conversation_id = %id, error = %err, "unreadable event log, skipping");
                    continue;
                }
            };
            conversation.rebuild_from_events(&events);
            summaries.push(conversation.summary());
        }

        sort_summaries(&mut summaries);
        Ok(summaries)
    }

    /// Apply `f` to the index under the index lock and persist the result.
    async fn update_index<F>(&self, f: F) -> Result<(), RepositoryError>
    where
        F: FnOnce(&mut Vec<ConversationSummary>),
    {
        let _guard = self.index_lock.lock().await;
        let mut summaries = match self.read_index().await {
            Some(summaries) => summaries,
            None => self.scan_summaries().await?,
        };
        f(&mut summaries);
        sort_summaries(&mut summaries);
        self.write_index(&summaries).await
    }

    async fn upsert_summary(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        let summary = conversation.summary();
        self.update_index(|summaries| {
            summaries.retain(|s| s.id != summary.id);
            summaries.push(summary);
        })
        .await
    }
}

/// Parse a JSONL event log, skipping lines that do not decode.
fn parse_events(id: &ConversationId, raw: &str) -> Vec<ConversationEvent> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(number, line)| match serde_json::from_str(line) {
            Ok(event) => Some(event),
            Err(err) => {
                warn!(
                    conversation_id = %id,
                    line = number + 1,
                    error = %err,
                    "skipping corrupt event line"
                );
                None
            }
        })
        .collect()
}

impl ConversationRepository for FsConversationRepository {
    async fn create_conversation(
        &self,
        conversation: &Conversation,
    ) -> Result<Conversation, RepositoryError> {
        let lock = self.lock_for(&conversation.id);
        let _guard = lock.lock().await;

        if tokio::fs::try_exists(self.layout.conversation_dir(&conversation.id)).await? {
            return Err(RepositoryError::Conflict(format!(
                "conversation {} already exists",
                conversation.id
            )));
        }
        write_atomic(&self.layout.events_path(&conversation.id), b"").await?;
        self.write_metadata(conversation).await?;
        self.upsert_summary(conversation).await?;
        debug!(conversation_id = %conversation.id, "conversation directory created");
        Ok(conversation.clone())
    }

    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        self.read_metadata(id).await
    }

    async fn append_event(
        &self,
        id: &ConversationId,
        event: &ConversationEvent,
    ) -> Result<Conversation, RepositoryError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut conversation = self.require_metadata(id).await?;
        let mut log = self.read_events_raw(id).await?;
        if !log.is_empty() && !log.ends_with('\n') {
            log.push('\n');
        }
        log.push_str(&serde_json::to_string(event)?);
        log.push('\n');
        write_atomic(&self.layout.events_path(id), log.as_bytes()).await?;

        conversation.record_event(event);
        self.write_metadata(&conversation).await?;
        self.upsert_summary(&conversation).await?;
        Ok(conversation)
    }

    async fn update_conversation(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        let lock = self.lock_for(&conversation.id);
        let _guard = lock.lock().await;

        self.require_metadata(&conversation.id).await?;
        self.write_metadata(conversation).await?;
        self.upsert_summary(conversation).await
    }

    async fn mark_read(
        &self,
        id: &ConversationId,
        view_index: usize,
    ) -> Result<Conversation, RepositoryError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut conversation = self.require_metadata(id).await?;
        conversation.mark_read(view_index);
        self.write_metadata(&conversation).await?;
        self.upsert_summary(&conversation).await?;
        Ok(conversation)
    }

    async fn delete_conversation(&self, id: &ConversationId) -> Result<(), RepositoryError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        match tokio::fs::remove_dir_all(self.layout.conversation_dir(id)).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(RepositoryError::NotFound(id.to_string()));
            }
            Err(err) => return Err(err.into()),
        }
        self.update_index(|summaries| summaries.retain(|s| s.id != *id))
            .await?;
        self.locks.remove(id);
        Ok(())
    }

    async fn get_events(
        &self,
        id: &ConversationId,
    ) -> Result<Vec<ConversationEvent>, RepositoryError> {
        if !tokio::fs::try_exists(self.layout.conversation_dir(id)).await? {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        let raw = self.read_events_raw(id).await?;
        Ok(parse_events(id, &raw))
    }

    async fn list_summaries(&self) -> Result<Vec<ConversationSummary>, RepositoryError> {
        if let Some(summaries) = self.read_index().await {
            return Ok(summaries);
        }
        self.rebuild_index().await
    }

    async fn rebuild_index(&self) -> Result<Vec<ConversationSummary>, RepositoryError> {
        let _guard = self.index_lock.lock().await;
        let summaries = self.scan_summaries().await?;
        self.write_index(&summaries).await?;
        debug!(conversations = summaries.len(), "conversation index written");
        Ok(summaries)
    }
}

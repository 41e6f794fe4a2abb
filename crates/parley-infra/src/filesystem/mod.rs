//! Filesystem adapters for Parley.
//!
//! Conversations live under `{data_dir}/conversations/`, one directory per
//! conversation holding `conversation.json` (metadata) and `events.jsonl`
//! (one event per line), plus a shared `index.json` of summaries.

pub mod atomic;
pub mod conversation;

use std::path::{Path, PathBuf};

use parley_types::conversation::ConversationId;

/// Path computations for the conversation store.
#[derive(Debug, Clone)]
pub struct ConversationLayout {
    root: PathBuf,
}

impl ConversationLayout {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            root: data_dir.join("conversations"),
        }
    }

    /// `{data_dir}/conversations/`
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{data_dir}/conversations/{id}/`
    pub fn conversation_dir(&self, id: &ConversationId) -> PathBuf {
        self.root.join(id.to_string())
    }

    pub fn metadata_path(&self, id: &ConversationId) -> PathBuf {
        self.conversation_dir(id).join("conversation.json")
    }

    pub fn events_path(&self, id: &ConversationId) -> PathBuf {
        self.conversation_dir(id).join("events.jsonl")
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join("index.json")
    }
}

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `PARLEY_DATA_DIR` environment variable
/// 2. `~/.parley`
/// 3. `./.parley`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PARLEY_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".parley");
    }

    PathBuf::from(".parley")
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_layout_paths() {
        let layout = ConversationLayout::new(Path::new("/home/user/.parley"));
        let id = ConversationId::from_uuid(Uuid::nil());
        assert_eq!(
            layout.conversation_dir(&id),
            PathBuf::from("/home/user/.parley/conversations/00000000-0000-0000-0000-000000000000")
        );
        assert_eq!(
            layout.metadata_path(&id).file_name().unwrap(),
            "conversation.json"
        );
        assert_eq!(layout.events_path(&id).file_name().unwrap(), "events.jsonl");
        assert_eq!(
            layout.index_path(),
            PathBuf::from("/home/user/.parley/conversations/index.json")
        );
    }

    #[test]
    fn test_resolve_data_dir_from_env() {
        // SAFETY: This test is single-threaded and restores the env var immediately.
        unsafe {
            std::env::set_var("PARLEY_DATA_DIR", "/tmp/test-parley");
        }
        let dir = resolve_data_dir();
        assert_eq!(dir, PathBuf::from("/tmp/test-parley"));
        unsafe {
            std::env::remove_var("PARLEY_DATA_DIR");
        }
    }
}

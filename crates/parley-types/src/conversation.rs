//! Conversation identity, metadata, and summary index types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::event::ConversationEvent;

/// Maximum number of characters kept in a conversation preview.
pub const PREVIEW_MAX_CHARS: usize = 120;

/// Unique identifier for a conversation, wrapping a UUID v7 (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConversationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Persisted metadata for one conversation.
///
/// The counters and the read cursor are derived from the event log and are
/// recomputed whenever an event is appended or the cursor moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub event_count: usize,
    #[serde(default)]
    pub view_item_count: usize,
    /// Index into the view-item sequence of the last item the user has seen.
    #[serde(default)]
    pub last_read_index: Option<usize>,
    #[serde(default)]
    pub unread_count: usize,
    #[serde(default)]
    pub preview: Option<String>,
}

impl Conversation {
    /// A fresh, empty conversation.
    pub fn new(title: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            title,
            created_at: now,
            updated_at: now,
            event_count: 0,
            view_item_count: 0,
            last_read_index: None,
            unread_count: 0,
            preview: None,
        }
    }

    /// Fold one newly appended event into the derived fields.
    pub fn record_event(&mut self, event: &ConversationEvent) {
        self.event_count += 1;
        if event.is_view_item() {
            self.view_item_count += 1;
            if let Some(text) = event.preview_text() {
                self.preview = Some(truncate_preview(&text));
            }
        }
        if event.timestamp > self.updated_at {
            self.updated_at = event.timestamp;
        }
        self.recompute_unread();
    }

    /// Move the read cursor. Indices past the end are clamped to the last item.
    pub fn mark_read(&mut self, view_index: usize) {
        if self.view_item_count == 0 {
            self.last_read_index = None;
        } else {
            let clamped = view_index.min(self.view_item_count - 1);
            self.last_read_index = Some(match self.last_read_index {
                Some(current) => current.max(clamped),
                None => clamped,
            });
        }
        self.recompute_unread();
    }

    /// Mark every current view item as read.
    pub fn mark_all_read(&mut self) {
        if self.view_item_count > 0 {
            self.mark_read(self.view_item_count - 1);
        }
    }

    /// Rebuild every derived field from the full event list.
    pub fn rebuild_from_events(&mut self, events: &[ConversationEvent]) {
        self.event_count = 0;
        self.view_item_count = 0;
        self.preview = None;
        for event in events {
            self.record_event(event);
        }
        if let Some(idx) = self.last_read_index {
            if self.view_item_count == 0 {
                self.last_read_index = None;
            } else if idx >= self.view_item_count {
                self.last_read_index = Some(self.view_item_count - 1);
            }
        }
        self.recompute_unread();
    }

    fn recompute_unread(&mut self) {
        let read = self.last_read_index.map(|i| i + 1).unwrap_or(0);
        self.unread_count = self.view_item_count.saturating_sub(read);
    }

    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            id: self.id,
            title: self.title.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            preview: self.preview.clone(),
            event_count: self.event_count,
            unread_count: self.unread_count,
        }
    }
}

fn truncate_preview(text: &str) -> String {
    let single_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.chars().count() > PREVIEW_MAX_CHARS {
        let cut: String = single_line.chars().take(PREVIEW_MAX_CHARS - 3).collect();
        format!("{cut}...")
    } else {
        single_line
    }
}

/// One row of the conversation summary index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub preview: Option<String>,
    pub event_count: usize,
    pub unread_count: usize,
}

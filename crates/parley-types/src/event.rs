//! Conversation event types for Parley.
//!
//! `ConversationEvent` is the unit of the append-only conversation log. Events
//! are totally ordered per conversation and never rewritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{ToolCall, ToolCallResult};

/// Who produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Participant {
    User,
    Assistant,
    Tool,
    System,
}

/// A reviewer's decision for one tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolApproval {
    pub call_id: String,
    pub allowed: bool,
}

/// Payload of a conversation event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    UserMessage {
        content: String,
    },
    AssistantMessage {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    /// The model is working on a response. Session-transient.
    AssistantProcessing,
    /// Tool calls waiting on a human decision.
    ToolUseVetting {
        request_id: Uuid,
        calls: Vec<ToolCall>,
    },
    /// A tool call finished (or was refused) with this result.
    ToolUseNotification {
        call: ToolCall,
        result: ToolCallResult,
    },
    /// Decisions submitted for a vetting request. Session-transient.
    ToolUseApproval {
        request_id: Uuid,
        approvals: Vec<ToolApproval>,
    },
}

/// One entry in a conversation's event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub source: Participant,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl ConversationEvent {
    /// Create an event stamped with a fresh UUIDv7 and the current time.
    pub fn new(source: Participant, kind: EventKind) -> Self {
        Self {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            source,
            kind,
        }
    }

    pub fn user_message(content: impl Into<String>) -> Self {
        Self::new(
            Participant::User,
            EventKind::UserMessage {
                content: content.into(),
            },
        )
    }

    pub fn assistant_message(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self::new(
            Participant::Assistant,
            EventKind::AssistantMessage {
                content: content.into(),
                tool_calls,
            },
        )
    }

    pub fn assistant_processing() -> Self {
        Self::new(Participant::Assistant, EventKind::AssistantProcessing)
    }

    /// Whether this event is part of the durable, user-visible transcript.
    pub fn is_view_item(&self) -> bool {
        !matches!(
            self.kind,
            EventKind::AssistantProcessing | EventKind::ToolUseApproval { .. }
        )
    }

    /// Short human-readable text for listings. `None` for transient events.
    pub fn preview_text(&self) -> Option<String> {
        match &self.kind {
            EventKind::UserMessage { content } => Some(content.clone()),
            EventKind::AssistantMessage {
                content,
                tool_calls,
            } => {
                if content.trim().is_empty() && !tool_calls.is_empty() {
                    let names: Vec<&str> = tool_calls.iter().map(|c| c.name.as_str()).collect();
                    Some(format!("[calling {}]", names.join(", ")))
                } else {
                    Some(content.clone())
                }
            }
            EventKind::ToolUseVetting { calls, .. } => {
                Some(format!("[{} tool call(s) awaiting approval]", calls.len()))
            }
            EventKind::ToolUseNotification { call, result } => {
                let status = if result.is_success() { "ok" } else { "failed" };
                Some(format!("[{} {status}]", call.name))
            }
            EventKind::AssistantProcessing | EventKind::ToolUseApproval { .. } => None,
        }
    }
}

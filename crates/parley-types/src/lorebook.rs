//! Lorebook domain types.
//!
//! A lorebook is an ordered set of entries whose content is conditionally
//! injected into the system prompt when their keys appear in recent history.

use serde::{Deserialize, Serialize};

/// Where a selected entry is placed relative to the character definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPosition {
    #[default]
    BeforeCharacter,
    AfterCharacter,
}

/// A single lorebook entry. Entries are never mutated by selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LorebookEntry {
    pub content: String,
    /// Primary keys. With `use_regex` only the first one is used, as a pattern.
    pub keys: Vec<String>,
    #[serde(default)]
    pub secondary_keys: Vec<String>,
    #[serde(default)]
    pub constant: bool,
    #[serde(default)]
    pub use_regex: bool,
    #[serde(default)]
    pub case_sensitive: bool,
    /// Require a secondary key match as well (only when secondary keys exist).
    #[serde(default)]
    pub selective: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub position: EntryPosition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl LorebookEntry {
    /// Create an enabled, non-constant entry matched by plain-text keys.
    pub fn new(content: impl Into<String>, keys: &[&str]) -> Self {
        Self {
            content: content.into(),
            keys: keys.iter().map(|k| k.to_string()).collect(),
            secondary_keys: Vec::new(),
            constant: false,
            use_regex: false,
            case_sensitive: false,
            selective: false,
            priority: None,
            enabled: true,
            position: EntryPosition::default(),
            comment: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_secondary_keys(mut self, keys: &[&str]) -> Self {
        self.secondary_keys = keys.iter().map(|k| k.to_string()).collect();
        self.selective = true;
        self
    }

    pub fn constant(mut self) -> Self {
        self.constant = true;
        self
    }

    pub fn regex(mut self) -> Self {
        self.use_regex = true;
        self
    }

    pub fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn at(mut self, position: EntryPosition) -> Self {
        self.position = position;
        self
    }
}

/// A keyed knowledge base attached to a conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lorebook {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub entries: Vec<LorebookEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_depth: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_budget: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recursive_scanning: Option<bool>,
}

impl Lorebook {
    pub fn new(entries: Vec<LorebookEntry>) -> Self {
        Self {
            entries,
            ..Self::default()
        }
    }
}

/// Per-call overrides for lorebook scanning. `None` falls through to the
/// lorebook's own setting and then to the global default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LorebookScanOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_depth: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_budget: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recursive_scanning: Option<bool>,
}

//! Eviction policies for chat memory.
//!
//! A policy truncates a candidate message list in place until it satisfies a
//! capacity constraint. Both policies remove the oldest non-system message
//! first, and an assistant message that issued tool calls takes the tool
//! results directly after it along with it, so a surviving tool-call message
//! always keeps all of its results or none.

use parley_types::error::MemoryError;
use parley_types::message::Message;

/// Truncates a message list to satisfy a capacity constraint.
pub trait EvictionPolicy: Send + Sync {
    fn evict(&self, messages: &mut Vec<Message>) -> Result<(), MemoryError>;
}

/// Caps the total number of messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageWindow {
    pub capacity: usize,
}

impl MessageWindow {
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }
}

impl EvictionPolicy for MessageWindow {
    fn evict(&self, messages: &mut Vec<Message>) -> Result<(), MemoryError> {
        while messages.len() > self.capacity {
            if !remove_oldest(messages) {
                break;
            }
        }
        Ok(())
    }
}

/// Caps the sum of per-message token counts.
///
/// Every message must already carry a token count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenWindow {
    pub budget: u32,
}

impl TokenWindow {
    pub fn new(budget: u32) -> Self {
        Self { budget }
    }
}

impl EvictionPolicy for TokenWindow {
    fn evict(&self, messages: &mut Vec<Message>) -> Result<(), MemoryError> {
        // Validate up front so a missing count never leaves a half-evicted list.
        let mut total = total_tokens(messages)?;
        while total > u64::from(self.budget) {
            if !remove_oldest(messages) {
                break;
            }
            total = total_tokens(messages)?;
        }
        Ok(())
    }
}

fn total_tokens(messages: &[Message]) -> Result<u64, MemoryError> {
    messages
        .iter()
        .enumerate()
        .map(|(index, m)| {
            m.token_count()
                .map(u64::from)
                .ok_or(MemoryError::MissingTokenCount { index })
        })
        .sum()
}

/// Remove the oldest non-system message plus any tool results it owns.
///
/// Returns `false` when nothing removable is left (empty list, or only the
/// system message).
pub(crate) fn remove_oldest(messages: &mut Vec<Message>) -> bool {
    let start = match messages.first() {
        Some(first) if first.is_system() => 1,
        _ => 0,
    };
    if start >= messages.len() {
        return false;
    }

    let removed = messages.remove(start);
    if removed.has_tool_calls() {
        let dependents = messages[start..]
            .iter()
            .take_while(|m| m.is_tool())
            .count();
        messages.drain(start..start + dependents);
    }
    true
}

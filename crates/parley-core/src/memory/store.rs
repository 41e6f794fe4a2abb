//! Keyed message storage shared by every memory of a process.
//!
//! `MemoryStore` maps a conversation id to its ordered message list. It holds
//! no policy of its own: memories decide what goes in, the store only makes
//! sure that each update is applied to one conversation at a time and that a
//! failed update leaves the previous list in place.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use parley_types::conversation::ConversationId;
use parley_types::message::Message;

/// Concurrent conversation-id -> message list map.
///
/// All mutation goes through [`MemoryStore::update`], which holds the shard
/// lock for the conversation while the closure runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<ConversationId, Vec<Message>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a conversation's messages. Empty if the conversation has
    /// never been written.
    pub fn read(&self, id: &ConversationId) -> Vec<Message> {
        self.entries
            .get(id)
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    /// Apply `f` to a copy of the conversation's messages and store the result
    /// only if `f` succeeds.
    ///
    /// The entry is created on first successful write. A failing closure
    /// leaves the stored list (or its absence) untouched.
    pub fn update<F, E>(&self, id: ConversationId, f: F) -> Result<(), E>
    where
        F: FnOnce(&mut Vec<Message>) -> Result<(), E>,
    {
        match self.entries.entry(id) {
            Entry::Occupied(mut occupied) => {
                let mut candidate = occupied.get().clone();
                f(&mut candidate)?;
                *occupied.get_mut() = candidate;
            }
            Entry::Vacant(vacant) => {
                let mut candidate = Vec::new();
                f(&mut candidate)?;
                vacant.insert(candidate);
            }
        }
        Ok(())
    }

    /// Remove a conversation entirely (no tombstone).
    pub fn clear(&self, id: &ConversationId) -> bool {
        self.entries.remove(id).is_some()
    }

    pub fn contains(&self, id: &ConversationId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn conversation_ids(&self) -> Vec<ConversationId> {
        self.entries.iter().map(|e| *e.key()).collect()
    }

    /// Number of conversations currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! In-memory `ConversationRepository`.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use parley_types::conversation::{Conversation, ConversationId, ConversationSummary};
use parley_types::error::RepositoryError;
use parley_types::event::ConversationEvent;

use super::repository::{ConversationRepository, sort_summaries};

struct StoredConversation {
    conversation: Conversation,
    events: Vec<ConversationEvent>,
}

/// Volatile repository keyed by conversation id.
///
/// Each conversation is mutated under its DashMap shard lock, which gives the
/// per-conversation write ordering the trait requires.
#[derive(Default)]
pub struct InMemoryConversationRepository {
    conversations: DashMap<ConversationId, StoredConversation>,
}

impl InMemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(id: &ConversationId) -> RepositoryError {
    RepositoryError::NotFound(id.to_string())
}

impl ConversationRepository for InMemoryConversationRepository {
    async fn create_conversation(
        &self,
        conversation: &Conversation,
    ) -> Result<Conversation, RepositoryError> {
        match self.conversations.entry(conversation.id) {
            Entry::Occupied(_) => Err(RepositoryError::Conflict(format!(
                "conversation {} already exists",
                conversation.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(StoredConversation {
                    conversation: conversation.clone(),
                    events: Vec::new(),
                });
                Ok(conversation.clone())
            }
        }
    }

    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        Ok(self
            .conversations
            .get(id)
            .map(|stored| stored.conversation.clone()))
    }

    async fn append_event(
        &self,
        id: &ConversationId,
        event: &ConversationEvent,
    ) -> Result<Conversation, RepositoryError> {
        let mut stored = self.conversations.get_mut(id).ok_or_else(|| not_found(id))?;
        stored.events.push(event.clone());
        stored.conversation.record_event(event);
        Ok(stored.conversation.clone())
    }

    async fn update_conversation(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        let mut stored = self
            .conversations
            .get_mut(&conversation.id)
            .ok_or_else(|| not_found(&conversation.id))?;
        stored.conversation = conversation.clone();
        Ok(())
    }

    async fn mark_read(
        &self,
        id: &ConversationId,
        view_index: usize,
    ) -> Result<Conversation, RepositoryError> {
        let mut stored = self.conversations.get_mut(id).ok_or_else(|| not_found(id))?;
        stored.conversation.mark_read(view_index);
        Ok(stored.conversation.clone())
    }

    async fn delete_conversation(&self, id: &ConversationId) -> Result<(), RepositoryError> {
        self.conversations
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found(id))
    }

    async fn get_events(
        &self,
        id: &ConversationId,
    ) -> Result<Vec<ConversationEvent>, RepositoryError> {
        self.conversations
            .get(id)
            .map(|stored| stored.events.clone())
            .ok_or_else(|| not_found(id))
    }

    async fn list_summaries(&self) -> Result<Vec<ConversationSummary>, RepositoryError> {
        let mut summaries: Vec<ConversationSummary> = self
            .conversations
            .iter()
            .map(|stored| stored.conversation.summary())
            .collect();
        sort_summaries(&mut summaries);
        Ok(summaries)
    }

    async fn rebuild_index(&self) -> Result<Vec<ConversationSummary>, RepositoryError> {
        for mut stored in self.conversations.iter_mut() {
            let StoredConversation {
                conversation,
                events,
            } = &mut *stored;
            conversation.rebuild_from_events(events);
        }
        self.list_summaries().await
    }
}

//! ConversationRepository trait definition.
//!
//! Persists conversation metadata and each conversation's append-only event
//! sequence, plus a summary index for listings.

use parley_types::conversation::{Conversation, ConversationId, ConversationSummary};
use parley_types::error::RepositoryError;
use parley_types::event::ConversationEvent;

/// Repository trait for conversation persistence.
///
/// Implementations live in parley-infra (e.g., `FsConversationRepository`);
/// `InMemoryConversationRepository` in this crate backs tests and embedders
/// that need no durability. Uses native async fn in traits (RPITIT, Rust 2024
/// edition).
///
/// Writes to one conversation must be serialised by the implementation so
/// that event order on disk equals call order.
pub trait ConversationRepository: Send + Sync {
    /// Persist a new conversation. Fails with `Conflict` if the id exists.
    fn create_conversation(
        &self,
        conversation: &Conversation,
    ) -> impl std::future::Future<Output = Result<Conversation, RepositoryError>> + Send;

    /// Get conversation metadata by id.
    fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> impl std::future::Future<Output = Result<Option<Conversation>, RepositoryError>> + Send;

    /// Durably append one event and return the recomputed metadata.
    fn append_event(
        &self,
        id: &ConversationId,
        event: &ConversationEvent,
    ) -> impl std::future::Future<Output = Result<Conversation, RepositoryError>> + Send;

    /// Overwrite conversation metadata (e.g., title).
    fn update_conversation(
        &self,
        conversation: &Conversation,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Advance the read cursor to `view_index` and return the new metadata.
    fn mark_read(
        &self,
        id: &ConversationId,
        view_index: usize,
    ) -> impl std::future::Future<Output = Result<Conversation, RepositoryError>> + Send;

    /// Delete a conversation and all its events.
    fn delete_conversation(
        &self,
        id: &ConversationId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// All events of a conversation, in append order.
    fn get_events(
        &self,
        id: &ConversationId,
    ) -> impl std::future::Future<Output = Result<Vec<ConversationEvent>, RepositoryError>> + Send;

    /// Summaries of every conversation, most recently updated first.
    fn list_summaries(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<ConversationSummary>, RepositoryError>> + Send;

    /// Regenerate the summary index from the stored conversations.
    fn rebuild_index(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<ConversationSummary>, RepositoryError>> + Send;
}

/// Sort summaries for the index: most recently updated first.
pub fn sort_summaries(summaries: &mut [ConversationSummary]) {
    summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| b.id.cmp(&a.id)));
}

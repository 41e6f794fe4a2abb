//! ConversationLog service.
//!
//! Wraps a [`ConversationRepository`] and fans metadata snapshots out to
//! watchers. Every mutation is persisted first and published second, so a
//! watcher never observes state that is not yet durable.

use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::Stream;
use tokio::sync::watch;
use tracing::{debug, info};

use parley_types::conversation::{Conversation, ConversationId, ConversationSummary};
use parley_types::error::RepositoryError;
use parley_types::event::ConversationEvent;

use super::repository::ConversationRepository;

/// Stream of values observed from a conversation.
pub type ConversationStream<T> =
    Pin<Box<dyn Stream<Item = Result<T, RepositoryError>> + Send + 'static>>;

pub struct ConversationLog<R: ConversationRepository> {
    repo: Arc<R>,
    snapshots: DashMap<ConversationId, watch::Sender<Option<Conversation>>>,
}

impl<R: ConversationRepository + 'static> ConversationLog<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self {
            repo,
            snapshots: DashMap::new(),
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    pub async fn create(&self, title: Option<String>) -> Result<Conversation, RepositoryError> {
        let conversation = self
            .repo
            .create_conversation(&Conversation::new(title))
            .await?;
        info!(conversation_id = %conversation.id, "conversation created");
        Ok(conversation)
    }

    pub async fn get(&self, id: &ConversationId) -> Result<Conversation, RepositoryError> {
        self.repo
            .get_conversation(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    /// Durably append an event, then notify watchers.
    pub async fn append(
        &self,
        id: &ConversationId,
        event: ConversationEvent,
    ) -> Result<Conversation, RepositoryError> {
        let conversation = self.repo.append_event(id, &event).await?;
        debug!(
            conversation_id = %id,
            event_id = %event.id,
            event_count = conversation.event_count,
            "event appended"
        );
        self.publish(conversation.clone());
        Ok(conversation)
    }

    /// Every event of the conversation, in append order.
    pub async fn read(&self, id: &ConversationId) -> Result<Vec<ConversationEvent>, RepositoryError> {
        self.repo.get_events(id).await
    }

    /// Advance the read cursor. The cursor never moves backwards.
    pub async fn mark_read(
        &self,
        id: &ConversationId,
        view_index: usize,
    ) -> Result<Conversation, RepositoryError> {
        let conversation = self.repo.mark_read(id, view_index).await?;
        self.publish(conversation.clone());
        Ok(conversation)
    }

    pub async fn delete(&self, id: &ConversationId) -> Result<(), RepositoryError> {
        self.repo.delete_conversation(id).await?;
        if let Some((_, sender)) = self.snapshots.remove(id) {
            sender.send_replace(None);
        }
        info!(conversation_id = %id, "conversation deleted");
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<ConversationSummary>, RepositoryError> {
        self.repo.list_summaries().await
    }

    pub async fn rebuild_index(&self) -> Result<Vec<ConversationSummary>, RepositoryError> {
        let summaries = self.repo.rebuild_index().await?;
        info!(conversations = summaries.len(), "conversation index rebuilt");
        Ok(summaries)
    }

    /// Current metadata, then one snapshot per change. Ends when the
    /// conversation is deleted.
    pub fn watch_conversation(&self, id: ConversationId) -> ConversationStream<Conversation> {
        let mut rx = self.subscribe(id);
        let repo = self.repo.clone();
        Box::pin(async_stream::try_stream! {
            let current = repo
                .get_conversation(&id)
                .await?
                .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
            yield current;

            while rx.changed().await.is_ok() {
                let snapshot = rx.borrow_and_update().clone();
                match snapshot {
                    Some(conversation) => yield conversation,
                    None => break,
                }
            }
        })
    }

    /// Full event list now, then again after every change.
    pub fn watch_events(&self, id: ConversationId) -> ConversationStream<Vec<ConversationEvent>> {
        let mut rx = self.subscribe(id);
        let repo = self.repo.clone();
        Box::pin(async_stream::try_stream! {
            yield repo.get_events(&id).await?;

            while rx.changed().await.is_ok() {
                let deleted = rx.borrow_and_update().is_none();
                if deleted {
                    break;
                }
                yield repo.get_events(&id).await?;
            }
        })
    }

    fn subscribe(&self, id: ConversationId) -> watch::Receiver<Option<Conversation>> {
        // A fresh receiver has already seen the current value, so only later
        // changes wake it; the streams read current state themselves.
        self.snapshots
            .entry(id)
            .or_insert_with(|| watch::channel(None).0)
            .subscribe()
    }

    fn publish(&self, conversation: Conversation) {
        let id = conversation.id;
        if let Some(sender) = self.snapshots.get(&id) {
            // Concurrent appends may finish out of order; never publish an older snapshot.
            sender.send_if_modified(|current| {
                let stale = current
                    .as_ref()
                    .is_some_and(|c| c.event_count > conversation.event_count);
                if !stale {
                    *current = Some(conversation);
                }
                !stale
            });
        }
        self.snapshots
            .remove_if(&id, |_, sender| sender.receiver_count() == 0);
    }
}

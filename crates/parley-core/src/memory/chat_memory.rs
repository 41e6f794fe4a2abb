//! Windowed chat memory.
//!
//! `ChatMemory` scopes a shared [`MemoryStore`] to one conversation and runs
//! an [`EvictionPolicy`] after every insertion. System messages are kept as a
//! singleton at index 0.

use std::convert::Infallible;
use std::sync::Arc;

use tracing::debug;

use parley_types::conversation::ConversationId;
use parley_types::error::MemoryError;
use parley_types::message::Message;

use super::eviction::EvictionPolicy;
use super::store::MemoryStore;

/// Common contract for conversation memories.
pub trait Memory: Send + Sync {
    /// Record one message.
    fn add(&self, message: Message) -> Result<(), MemoryError>;

    /// Record several messages as one update: every insertion is applied,
    /// then the memory's bound is enforced once.
    fn add_all(&self, messages: Vec<Message>) -> Result<(), MemoryError>;

    /// Ordered snapshot of the stored messages.
    fn read(&self) -> Vec<Message>;

    /// Drop the leading system message, if any. Returns whether one was removed.
    fn remove_system(&self) -> bool;

    /// Forget the conversation entirely.
    fn clear(&self);

    fn conversation_id(&self) -> ConversationId;
}

/// Conversation memory bounded by an eviction policy.
pub struct ChatMemory<P: EvictionPolicy> {
    store: Arc<MemoryStore>,
    id: ConversationId,
    policy: P,
}

impl<P: EvictionPolicy> ChatMemory<P> {
    pub fn new(store: Arc<MemoryStore>, id: ConversationId, policy: P) -> Self {
        Self { store, id, policy }
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Insert one message following the system-singleton rule.
///
/// Returns `false` when the message was a no-op (identical system message).
pub(crate) fn insert(messages: &mut Vec<Message>, message: Message) -> bool {
    if !message.is_system() {
        messages.push(message);
        return true;
    }

    let leading_system = messages.first().is_some_and(Message::is_system);
    if leading_system {
        if messages[0].text() == message.text() {
            return false;
        }
        messages[0] = message;
    } else {
        messages.insert(0, message);
    }
    true
}

/// Remove the system message at index 0, if there is one.
pub(crate) fn remove_leading_system(store: &MemoryStore, id: ConversationId) -> bool {
    if !store.contains(&id) {
        return false;
    }
    let mut removed = false;
    store
        .update(id, |messages| {
            if messages.first().is_some_and(Message::is_system) {
                messages.remove(0);
                removed = true;
            }
            Ok::<(), Infallible>(())
        })
        .unwrap_or_else(|never| match never {});
    removed
}

impl<P: EvictionPolicy> Memory for ChatMemory<P> {
    fn add(&self, message: Message) -> Result<(), MemoryError> {
        self.add_all(vec![message])
    }

    fn add_all(&self, messages: Vec<Message>) -> Result<(), MemoryError> {
        self.store.update(self.id, |stored| {
            let before = stored.len();
            let mut changed = false;
            for message in messages {
                changed |= insert(stored, message);
            }
            if !changed {
                return Ok(());
            }
            self.policy.evict(stored)?;
            debug!(
                conversation_id = %self.id,
                before,
                after = stored.len(),
                "chat memory updated"
            );
            Ok(())
        })
    }

    fn read(&self) -> Vec<Message> {
        self.store.read(&self.id)
    }

    fn remove_system(&self) -> bool {
        remove_leading_system(&self.store, self.id)
    }

    fn clear(&self) {
        self.store.clear(&self.id);
    }

    fn conversation_id(&self) -> ConversationId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::eviction::{MessageWindow, TokenWindow};

    fn window(capacity: usize) -> ChatMemory<MessageWindow> {
        ChatMemory::new(
            Arc::new(MemoryStore::new()),
            ConversationId::new(),
            MessageWindow::new(capacity),
        )
    }

    #[test]
    fn read_before_any_write_is_empty() {
        let memory = window(10);
        assert!(memory.read().is_empty());
        assert!(memory.is_empty());
    }

    #[test]
    fn system_message_is_inserted_at_front() {
        let memory = window(10);
        memory.add(Message::user("hello")).unwrap();
        memory.add(Message::system("be nice")).unwrap();

        let msgs = memory.read();
        assert_eq!(msgs[0], Message::system("be nice"));
        assert_eq!(msgs[1], Message::user("hello"));
    }

    #[test]
    fn system_message_replaces_existing() {
        let memory = window(10);
        memory.add(Message::system("v1")).unwrap();
        memory.add(Message::user("hi")).unwrap();
        memory.add(Message::system("v2")).unwrap();

        let msgs = memory.read();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0], Message::system("v2"));
        assert_eq!(msgs.iter().filter(|m| m.is_system()).count(), 1);
    }

    #[test]
    fn identical_system_message_is_noop() {
        let memory = window(10);
        memory.add(Message::system("same").with_token_count(3)).unwrap();
        memory.add(Message::user("hi")).unwrap();
        let before = memory.read();

        memory.add(Message::system("same")).unwrap();
        assert_eq!(memory.read(), before);
    }

    #[test]
    fn window_scenario_evicts_oldest_non_system() {
        let memory = window(3);
        memory.add(Message::system("sys")).unwrap();
        memory.add(Message::user("a")).unwrap();
        memory.add(Message::assistant("b")).unwrap();

        memory.add(Message::user("c")).unwrap();
        assert_eq!(
            memory.read(),
            vec![Message::system("sys"), Message::assistant("b"), Message::user("c")]
        );

        memory.add(Message::assistant("d")).unwrap();
        assert_eq!(
            memory.read(),
            vec![Message::system("sys"), Message::user("c"), Message::assistant("d")]
        );
    }

    #[test]
    fn singleton_holds_across_many_adds() {
        let memory = window(4);
        for i in 0..20 {
            let msg = match i % 3 {
                0 => Message::system(format!("sys {i}")),
                1 => Message::user(format!("u {i}")),
                _ => Message::assistant(format!("a {i}")),
            };
            memory.add(msg).unwrap();
            let msgs = memory.read();
            let systems: Vec<usize> = msgs
                .iter()
                .enumerate()
                .filter(|(_, m)| m.is_system())
                .map(|(i, _)| i)
                .collect();
            assert!(systems.len() <= 1);
            if let Some(pos) = systems.first() {
                assert_eq!(*pos, 0);
            }
            assert!(msgs.len() <= 4);
        }
    }

    #[test]
    fn token_window_failure_leaves_memory_untouched() {
        let memory = ChatMemory::new(
            Arc::new(MemoryStore::new()),
            ConversationId::new(),
            TokenWindow::new(100),
        );
        memory.add(Message::user("counted").with_token_count(4)).unwrap();

        let err = memory.add(Message::assistant("uncounted")).unwrap_err();
        assert_eq!(err, MemoryError::MissingTokenCount { index: 1 });
        assert_eq!(memory.read(), vec![Message::user("counted").with_token_count(4)]);
    }

    #[test]
    fn add_all_evicts_once_after_every_insert() {
        use parley_types::message::{ToolCall, ToolCallResult};

        let memory = window(3);
        memory.add(Message::user("q")).unwrap();

        let call = ToolCall::new("c1", "clock");
        memory
            .add_all(vec![
                Message::assistant_with_calls("", vec![call.clone()]),
                Message::tool(
                    &call,
                    ToolCallResult::Success {
                        output: "noon".to_string(),
                    },
                ),
            ])
            .unwrap();
        assert_eq!(memory.len(), 3);

        memory.add(Message::assistant("It is noon.")).unwrap();
        // "q" goes first; the tool exchange survives intact.
        let msgs = memory.read();
        assert_eq!(msgs.len(), 3);
        assert!(msgs[0].has_tool_calls());
        assert!(msgs[1].is_tool());
    }

    #[test]
    fn clear_removes_conversation_from_store() {
        let store = Arc::new(MemoryStore::new());
        let id = ConversationId::new();
        let memory = ChatMemory::new(store.clone(), id, MessageWindow::new(5));
        memory.add(Message::user("x")).unwrap();
        assert!(store.contains(&id));

        memory.clear();
        assert!(!store.contains(&id));
        assert!(memory.read().is_empty());
    }

    #[test]
    fn memories_share_store_but_not_messages() {
        let store = Arc::new(MemoryStore::new());
        let a = ChatMemory::new(store.clone(), ConversationId::new(), MessageWindow::new(5));
        let b = ChatMemory::new(store.clone(), ConversationId::new(), MessageWindow::new(5));

        a.add(Message::user("for a")).unwrap();
        assert_eq!(a.read().len(), 1);
        assert!(b.read().is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_system_drops_only_the_leading_system_message() {
        let memory = window(10);
        assert!(!memory.remove_system());

        memory.add(Message::system("lore")).unwrap();
        memory.add(Message::user("hi")).unwrap();
        assert!(memory.remove_system());
        assert_eq!(memory.read(), vec![Message::user("hi")]);
        assert!(!memory.remove_system());
        assert_eq!(memory.len(), 1);
    }
}

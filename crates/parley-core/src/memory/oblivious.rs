//! Memory that only remembers the current exchange.
//!
//! Keeps at most one system message, the latest user message, and the
//! assistant/tool messages produced since that user message. A new user
//! message drops the previous exchange entirely.

use std::convert::Infallible;
use std::sync::Arc;

use parley_types::conversation::ConversationId;
use parley_types::error::MemoryError;
use parley_types::message::Message;

use super::chat_memory::{Memory, insert, remove_leading_system};
use super::store::MemoryStore;

pub struct ObliviousMemory {
    store: Arc<MemoryStore>,
    id: ConversationId,
}

impl ObliviousMemory {
    pub fn new(store: Arc<MemoryStore>, id: ConversationId) -> Self {
        Self { store, id }
    }
}

fn record(messages: &mut Vec<Message>, message: Message) {
    match message {
        Message::System(_) => {
            insert(messages, message);
        }
        Message::User(_) => {
            messages.retain(Message::is_system);
            messages.push(message);
        }
        Message::Assistant(_) | Message::Tool(_) => messages.push(message),
    }
}

impl Memory for ObliviousMemory {
    fn add(&self, message: Message) -> Result<(), MemoryError> {
        self.add_all(vec![message])
    }

    fn add_all(&self, messages: Vec<Message>) -> Result<(), MemoryError> {
        self.store
            .update(self.id, |stored| {
                for message in messages {
                    record(stored, message);
                }
                Ok::<(), Infallible>(())
            })
            .map_err(|never| match never {})
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

//! Conversation memory for Parley.
//!
//! - `MemoryStore`: keyed storage shared by all memories of a process
//! - `EvictionPolicy`: message-count and token-count windows
//! - `ChatMemory`: windowed memory with the system-message singleton rule
//! - `ObliviousMemory`: keeps only the current exchange

pub mod chat_memory;
pub mod eviction;
pub mod oblivious;
pub mod store;

use std::sync::Arc;

use parley_types::config::{MemoryConfig, MemoryStrategy};
use parley_types::conversation::ConversationId;

use self::chat_memory::{ChatMemory, Memory};
use self::eviction::{MessageWindow, TokenWindow};
use self::oblivious::ObliviousMemory;
use self::store::MemoryStore;

/// Build the memory variant selected by configuration.
pub fn build_memory(
    config: &MemoryConfig,
    store: Arc<MemoryStore>,
    id: ConversationId,
) -> Box<dyn Memory> {
    match config.strategy {
        MemoryStrategy::MessageWindow => Box::new(ChatMemory::new(
            store,
            id,
            MessageWindow::new(config.max_messages),
        )),
        MemoryStrategy::TokenWindow => {
            Box::new(ChatMemory::new(store, id, TokenWindow::new(config.max_tokens)))
        }
        MemoryStrategy::Oblivious => Box::new(ObliviousMemory::new(store, id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::message::Message;

    #[test]
    fn build_memory_respects_strategy() {
        let store = Arc::new(MemoryStore::new());

        let window = build_memory(
            &MemoryConfig {
                strategy: MemoryStrategy::MessageWindow,
                max_messages: 2,
                ..MemoryConfig::default()
            },
            store.clone(),
            ConversationId::new(),
        );
        for i in 0..5 {
            window.add(Message::user(format!("{i}"))).unwrap();
        }
        assert_eq!(window.read().len(), 2);

        let tokens = build_memory(
            &MemoryConfig {
                strategy: MemoryStrategy::TokenWindow,
                ..MemoryConfig::default()
            },
            store.clone(),
            ConversationId::new(),
        );
        assert!(tokens.add(Message::user("no count")).is_err());

        let oblivious = build_memory(
            &MemoryConfig {
                strategy: MemoryStrategy::Oblivious,
                ..MemoryConfig::default()
            },
            store,
            ConversationId::new(),
        );
        oblivious.add(Message::user("a")).unwrap();
        oblivious.add(Message::user("b")).unwrap();
        assert_eq!(oblivious.read(), vec![Message::user("b")]);
    }
}

//! Token counting for messages.
//!
//! The token-window eviction policy and the lorebook budget both need a count
//! per message. Exact tokenizers are provider-specific; `ApproxTokenCounter`
//! is the default used when nothing better is plugged in.

use std::sync::Arc;

use parley_types::message::{Message, ToolCall};

/// Counts tokens for text and messages.
pub trait TokenCounter: Send + Sync {
    /// Count tokens in a piece of plain text.
    fn count_text(&self, text: &str) -> u32;

    /// Count tokens in a whole message, including tool-call payloads.
    fn count(&self, message: &Message) -> u32 {
        let mut total = self.count_text(&message.text());
        if let Message::Assistant(assistant) = message {
            total += assistant
                .tool_calls
                .iter()
                .map(|call| self.count_text(&call_text(call)))
                .sum::<u32>();
        }
        total
    }

    /// Stamp the message with its count if it doesn't carry one yet.
    fn stamp(&self, message: &mut Message) {
        if message.token_count().is_none() {
            let count = self.count(message);
            message.set_token_count(count);
        }
    }
}

fn call_text(call: &ToolCall) -> String {
    let args = serde_json::Value::Object(call.arguments.clone());
    format!("{} {}", call.name, args)
}

impl<T: TokenCounter + ?Sized> TokenCounter for Arc<T> {
    fn count_text(&self, text: &str) -> u32 {
        (**self).count_text(text)
    }

    fn count(&self, message: &Message) -> u32 {
        (**self).count(message)
    }
}

/// Rough estimate of one token per four characters, rounded up.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxTokenCounter;

const CHARS_PER_TOKEN: usize = 4;

impl TokenCounter for ApproxTokenCounter {
    fn count_text(&self, text: &str) -> u32 {
        let chars = text.chars().count();
        u32::try_from(chars.div_ceil(CHARS_PER_TOKEN)).unwrap_or(u32::MAX)
    }
}

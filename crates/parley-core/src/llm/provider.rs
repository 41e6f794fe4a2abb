//! ChatProvider trait definition.
//!
//! The engine's only view of a model: one round-trip from an ordered history
//! (plus optional tool descriptors) to an assistant message. HTTP clients for
//! concrete providers live outside this workspace.

use parley_types::error::ProviderError;
use parley_types::message::{AssistantMessage, Message, ToolDescriptor};

/// Trait for model backends.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition). Returning an
/// `AssistantMessage` rather than a `Message` makes "the model answered with
/// some other role" unrepresentable.
pub trait ChatProvider: Send + Sync {
    /// Human-readable provider name (e.g., "anthropic", "local").
    fn name(&self) -> &str;

    /// Send the conversation and receive the next assistant message, which
    /// may carry zero or more tool calls.
    fn send(
        &self,
        history: &[Message],
        tools: Option<&[ToolDescriptor]>,
    ) -> impl std::future::Future<Output = Result<AssistantMessage, ProviderError>> + Send;
}

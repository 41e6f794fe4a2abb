//! BoxChatProvider -- object-safe dynamic dispatch wrapper for ChatProvider.
//!
//! 1. Define an object-safe `ChatProviderDyn` trait with boxed futures
//! 2. Blanket-impl `ChatProviderDyn` for all `T: ChatProvider`
//! 3. `BoxChatProvider` wraps `Box<dyn ChatProviderDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use parley_types::error::ProviderError;
use parley_types::message::{AssistantMessage, Message, ToolDescriptor};

use super::provider::ChatProvider;

/// Object-safe version of [`ChatProvider`] with boxed futures.
pub trait ChatProviderDyn: Send + Sync {
    fn name(&self) -> &str;

    fn send_boxed<'a>(
        &'a self,
        history: &'a [Message],
        tools: Option<&'a [ToolDescriptor]>,
    ) -> Pin<Box<dyn Future<Output = Result<AssistantMessage, ProviderError>> + Send + 'a>>;
}

impl<T: ChatProvider> ChatProviderDyn for T {
    fn name(&self) -> &str {
        ChatProvider::name(self)
    }

    fn send_boxed<'a>(
        &'a self,
        history: &'a [Message],
        tools: Option<&'a [ToolDescriptor]>,
    ) -> Pin<Box<dyn Future<Output = Result<AssistantMessage, ProviderError>> + Send + 'a>> {
        Box::pin(self.send(history, tools))
    }
}

/// Type-erased chat provider for runtime provider selection.
///
/// `BoxChatProvider` itself implements [`ChatProvider`], so it can be handed
/// to anything generic over the trait.
pub struct BoxChatProvider {
    inner: Box<dyn ChatProviderDyn>,
}

impl BoxChatProvider {
    pub fn new<T: ChatProvider + 'static>(provider: T) -> Self {
        Self {
            inner: Box::new(provider),
        }
    }
}

impl ChatProvider for BoxChatProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn send(
        &self,
        history: &[Message],
        tools: Option<&[ToolDescriptor]>,
    ) -> Result<AssistantMessage, ProviderError> {
        self.inner.send_boxed(history, tools).await
    }
}

impl std::fmt::Debug for BoxChatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxChatProvider")
            .field("name", &self.inner.name())
            .finish()
    }
}

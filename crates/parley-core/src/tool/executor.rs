//! Tool execution capability.
//!
//! Execution only accepts an [`ApprovedCall`], which can only be minted inside
//! this crate once the vetting coordinator has approved the call.

use std::ops::Deref;

use parley_types::message::{ToolCall, ToolCallResult};
use tracing::debug;

use super::registry::ToolRegistry;

/// A tool call that has passed vetting.
#[derive(Debug, Clone, Copy)]
pub struct ApprovedCall<'a> {
    call: &'a ToolCall,
}

impl<'a> ApprovedCall<'a> {
    pub(crate) fn new(call: &'a ToolCall) -> Self {
        Self { call }
    }

    pub fn call(&self) -> &'a ToolCall {
        self.call
    }
}

impl Deref for ApprovedCall<'_> {
    type Target = ToolCall;

    fn deref(&self) -> &ToolCall {
        self.call
    }
}

/// Executes approved tool calls. `Err` carries a human-readable failure reason.
pub trait ToolExecutor: Send + Sync {
    fn execute(
        &self,
        call: ApprovedCall<'_>,
    ) -> impl std::future::Future<Output = Result<String, String>> + Send;
}

/// Run one approved call and map the outcome onto a [`ToolCallResult`].
pub async fn run_tool_call<E: ToolExecutor>(
    executor: &E,
    registry: &ToolRegistry,
    call: ApprovedCall<'_>,
) -> ToolCallResult {
    if !registry.contains(&call.name) {
        debug!(tool = %call.name, call_id = %call.id, "model called an unregistered tool");
        return ToolCallResult::NoSuchTool;
    }
    match executor.execute(call).await {
        Ok(output) => ToolCallResult::Success { output },
        Err(reason) => {
            debug!(tool = %call.name, call_id = %call.id, %reason, "tool execution failed");
            ToolCallResult::ExecutionFailure { reason }
        }
    }
}

//! Chat message and tool call types for Parley.
//!
//! `Message` is the closed set of roles exchanged with a model. Tool calls and
//! their results live here as well because assistant and tool messages carry
//! them directly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(MessageRole::System),
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "tool" => Ok(MessageRole::Tool),
            other => Err(format!("invalid message role: '{other}'")),
        }
    }
}

/// A single tool invocation proposed by the model.
///
/// Immutable once created. The `id` is assigned by the provider and is what
/// the resulting tool message points back to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: serde_json::Map::new(),
        }
    }

    /// Builder-style helper to attach an argument.
    pub fn with_argument(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.arguments.insert(key.into(), value);
        self
    }
}

/// Outcome of a tool call. Assigned exactly once per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolCallResult {
    Success { output: String },
    ExecutionFailure { reason: String },
    /// A reviewer rejected the call.
    NotAllowed,
    /// No tool with the requested name is registered.
    NoSuchTool,
}

impl ToolCallResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolCallResult::Success { .. })
    }

    /// Text handed back to the model for this result.
    pub fn to_model_text(&self) -> String {
        match self {
            ToolCallResult::Success { output } => output.clone(),
            ToolCallResult::ExecutionFailure { reason } => {
                format!("Tool execution failed: {reason}")
            }
            ToolCallResult::NotAllowed => {
                "The user did not allow this tool call.".to_string()
            }
            ToolCallResult::NoSuchTool => "No such tool exists.".to_string(),
        }
    }
}

/// Describes a tool the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON schema for the arguments object.
    #[serde(default = "empty_schema")]
    pub parameters: serde_json::Value,
    /// Whether calls to this tool need explicit human approval.
    #[serde(default)]
    pub requires_vetting: bool,
}

fn empty_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: empty_schema(),
            requires_vetting: false,
        }
    }

    pub fn with_vetting(mut self, requires_vetting: bool) -> Self {
        self.requires_vetting = requires_vetting;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMessage {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u32>,
}

impl AssistantMessage {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Result of one tool call, addressed to the assistant message that asked for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMessage {
    pub tool_call_id: String,
    pub tool_name: String,
    pub result: ToolCallResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u32>,
}

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System(SystemMessage),
    User(UserMessage),
    Assistant(AssistantMessage),
    Tool(ToolMessage),
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System(SystemMessage {
            content: content.into(),
            token_count: None,
        })
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::User(UserMessage {
            content: content.into(),
            token_count: None,
        })
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant(AssistantMessage {
            content: content.into(),
            tool_calls: Vec::new(),
            token_count: None,
        })
    }

    pub fn assistant_with_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Message::Assistant(AssistantMessage {
            content: content.into(),
            tool_calls,
            token_count: None,
        })
    }

    pub fn tool(call: &ToolCall, result: ToolCallResult) -> Self {
        Message::Tool(ToolMessage {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            result,
            token_count: None,
        })
    }

    pub fn role(&self) -> MessageRole {
        match self {
            Message::System(_) => MessageRole::System,
            Message::User(_) => MessageRole::User,
            Message::Assistant(_) => MessageRole::Assistant,
            Message::Tool(_) => MessageRole::Tool,
        }
    }

    /// Text content as seen by the model. Tool messages render their result.
    pub fn text(&self) -> String {
        match self {
            Message::System(m) => m.content.clone(),
            Message::User(m) => m.content.clone(),
            Message::Assistant(m) => m.content.clone(),
            Message::Tool(m) => m.result.to_model_text(),
        }
    }

    pub fn token_count(&self) -> Option<u32> {
        match self {
            Message::System(m) => m.token_count,
            Message::User(m) => m.token_count,
            Message::Assistant(m) => m.token_count,
            Message::Tool(m) => m.token_count,
        }
    }

    pub fn set_token_count(&mut self, count: u32) {
        let slot = match self {
            Message::System(m) => &mut m.token_count,
            Message::User(m) => &mut m.token_count,
            Message::Assistant(m) => &mut m.token_count,
            Message::Tool(m) => &mut m.token_count,
        };
        *slot = Some(count);
    }

    /// Builder-style variant of [`Message::set_token_count`].
    pub fn with_token_count(mut self, count: u32) -> Self {
        self.set_token_count(count);
        self
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Message::System(_))
    }

    pub fn is_tool(&self) -> bool {
        matches!(self, Message::Tool(_))
    }

    /// True for assistant messages that proposed at least one tool call.
    pub fn has_tool_calls(&self) -> bool {
        matches!(self, Message::Assistant(m) if m.has_tool_calls())
    }
}

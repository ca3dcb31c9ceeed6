use super::role::Role;
use super::tool::ToolCall;
use crate::errors::AgentResult;
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A tool invocation requested by the assistant.
///
/// The call is kept as a result so that a request the provider could not
/// decode still carries its id, and can be answered with an error.
pub struct ToolRequest {
    pub id: String,
    pub tool_call: AgentResult<ToolCall>,
}

impl ToolRequest {
    /// The requested tool name, if the request could be decoded
    pub fn name(&self) -> Option<&str> {
        self.tool_call.as_ref().ok().map(|call| call.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A single turn of the conversation
pub struct Message {
    pub role: Role,
    pub created: i64,
    /// Text content, empty for assistant turns that only request tools
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolRequest>,
    /// Set on tool-role messages, the id of the request being answered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Message {
    fn new(role: Role) -> Self {
        Message {
            role,
            created: Utc::now().timestamp(),
            content: String::new(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
        }
    }

    /// Create a new user message with the current timestamp
    pub fn user() -> Self {
        Self::new(Role::User)
    }

    /// Create a new assistant message with the current timestamp
    pub fn assistant() -> Self {
        Self::new(Role::Assistant)
    }

    /// Create a tool-role message answering the request `id`
    pub fn tool<I: Into<String>, N: Into<String>>(id: I, name: N) -> Self {
        let mut message = Self::new(Role::Tool);
        message.tool_call_id = Some(id.into());
        message.tool_name = Some(name.into());
        message
    }

    /// Append text to the message content
    pub fn with_text<S: AsRef<str>>(mut self, text: S) -> Self {
        self.content.push_str(text.as_ref());
        self
    }

    /// Add a tool request to the message
    pub fn with_tool_request<S: Into<String>>(
        mut self,
        id: S,
        tool_call: AgentResult<ToolCall>,
    ) -> Self {
        self.tool_calls.push(ToolRequest {
            id: id.into(),
            tool_call,
        });
        self
    }

    pub fn text(&self) -> &str {
        &self.content
    }

    pub fn tool_requests(&self) -> &[ToolRequest] {
        &self.tool_calls
    }

    pub fn has_tool_requests(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

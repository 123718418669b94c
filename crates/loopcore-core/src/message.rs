//! The `Message` and `ToolCall` data model shared by every crate that talks
//! to an LLM or a tool.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// The role a message plays in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System prompt / instructions.
    System,
    /// User input.
    User,
    /// LLM output — may carry tool calls.
    Assistant,
    /// A tool's result, replying to one assistant tool call.
    Tool,
}

/// A request from the LLM to invoke a named tool with arguments.
///
/// `raw_arguments` is kept as the on-wire string the LLM produced; the
/// [`loopcore-runtime`](../loopcore_runtime/index.html) scheduler is
/// responsible for parsing it (tolerant of double-escaped JSON — see the
/// scheduler's `validating` state).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique id for this call, scoped to the assistant message that issued it.
    pub id: String,
    /// Tool name to invoke.
    pub name: String,
    /// Serialized arguments exactly as produced by the LLM.
    pub raw_arguments: String,
}

impl ToolCall {
    /// Construct a tool call with arguments already serialized.
    pub fn new(id: impl Into<String>, name: impl Into<String>, raw_arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            raw_arguments: raw_arguments.into(),
        }
    }
}

/// One turn in the conversation sent to or received from the LLM.
///
/// System, user, assistant, and tool turns are all represented by this one
/// struct with role-dependent optional fields, rather than four separate
/// structs — this mirrors how the wire format and every adapter in
/// `loopcore-llm` actually shapes the JSON payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who produced this message.
    pub role: MessageRole,
    /// Text content. May be empty (e.g. an assistant message that is only
    /// tool calls).
    #[serde(default)]
    pub content: String,
    /// The model's private scratchpad, when the provider exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    /// Tool calls requested by an assistant message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// For tool-role messages: the call this message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For tool-role messages: the tool name that produced this result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    /// Build a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::System, content)
    }

    /// Build a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::User, content)
    }

    /// Build a plain-text assistant message (no tool calls).
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::Assistant, content)
    }

    /// Build an assistant message carrying tool calls, with optional text
    /// and reasoning content alongside them.
    #[must_use]
    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        reasoning_content: Option<String>,
        tool_calls: Vec<ToolCall>,
    ) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            reasoning_content,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
            name: None,
        }
    }

    /// Build a tool-result message answering `tool_call_id`.
    #[must_use]
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: MessageRole::Tool,
            content: content.into(),
            reasoning_content: None,
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
        }
    }

    fn plain(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            reasoning_content: None,
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    /// Ids of the tool calls this assistant message is carrying, if any.
    #[must_use]
    pub fn tool_call_ids(&self) -> Vec<&str> {
        self.tool_calls
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|c| c.id.as_str())
            .collect()
    }
}

/// Check tool-call linkage over a full message sequence: every tool-call id
/// introduced by an assistant message must be answered by exactly one later
/// tool-role message, and every tool-role message must reference an id
/// introduced earlier.
///
/// Used by tests and by the context manager's sanitizer to confirm a
/// sequence is LLM-legal before it is sent.
///
/// # Errors
///
/// Returns [`CoreError::DanglingToolCallId`] if a tool message references an
/// id that was never introduced by an earlier assistant message, or
/// [`CoreError::UnansweredToolCall`] if an assistant tool call is never
/// answered.
pub fn validate_tool_call_linkage(messages: &[Message]) -> CoreResult<()> {
    let mut introduced: HashSet<&str> = HashSet::new();
    let mut answered: HashSet<&str> = HashSet::new();

    for message in messages {
        match message.role {
            MessageRole::Assistant => {
                for id in message.tool_call_ids() {
                    introduced.insert(id);
                }
            },
            MessageRole::Tool => {
                if let Some(id) = message.tool_call_id.as_deref() {
                    if !introduced.contains(id) {
                        return Err(CoreError::DanglingToolCallId {
                            call_id: id.to_string(),
                        });
                    }
                    answered.insert(id);
                }
            },
            MessageRole::System | MessageRole::User => {},
        }
    }

    for id in introduced {
        if !answered.contains(id) {
            return Err(CoreError::UnansweredToolCall {
                call_id: id.to_string(),
            });
        }
    }

    Ok(())
}

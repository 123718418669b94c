//! Shared error type for message-sequence validity checks.

use thiserror::Error;

/// Errors raised validating message sequences: every tool message's
/// `tool_call_id` must match an assistant message earlier in the same
/// sequence, and every assistant tool call must eventually be answered.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A tool-role message referenced a `tool_call_id` with no matching
    /// preceding assistant tool call.
    #[error("tool message references unknown call id: {call_id}")]
    DanglingToolCallId {
        /// The id that could not be resolved.
        call_id: String,
    },

    /// An assistant message's tool call was never answered before the
    /// sequence ended.
    #[error("assistant tool call {call_id} has no matching tool-role reply")]
    UnansweredToolCall {
        /// The id that was never answered.
        call_id: String,
    },
}

/// Result type for core message-validity operations.
pub type CoreResult<T> = Result<T, CoreError>;

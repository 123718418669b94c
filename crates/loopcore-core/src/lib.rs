#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Shared types for the agent execution core.
//!
//! This crate has no opinion on LLM vendor, tool implementation, or approval
//! policy — it only defines the message/tool-call shapes that every other
//! crate in the workspace exchanges, plus the identifiers and error types
//! that would otherwise be duplicated at every seam.

mod error;
mod ids;
mod message;

pub use error::{CoreError, CoreResult};
pub use ids::{CallId, SessionId};
pub use message::{Message, MessageRole, ToolCall};

/// Commonly used types for convenient import.
pub mod prelude {
    pub use crate::{CallId, CoreError, CoreResult, Message, MessageRole, SessionId, ToolCall};
}

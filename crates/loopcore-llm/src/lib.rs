#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! LLM provider abstraction with streaming support for the agent execution
//! core.
//!
//! [`LlmProvider`] is the seam the execution engine programs against; this
//! crate stays agnostic about which concrete vendor backs it, providing an
//! Anthropic Claude adapter and a generic OpenAI-compatible adapter (LM
//! Studio, vLLM, Ollama, and the `OpenAI` API itself all speak this wire
//! format).

mod claude;
mod error;
mod openai_compat;
mod provider;
pub mod prelude;
mod types;

pub use claude::ClaudeProvider;
pub use error::{LlmError, LlmResult};
pub use openai_compat::OpenAiCompatProvider;
pub use provider::{LlmProvider, ProviderConfig, StreamBox};
pub use types::{
    ContentPart, LlmResponse, LlmToolDefinition, Message, MessageContent, MessageRole, StopReason,
    StreamEvent, ToolCall, ToolCallResult, Usage,
};

//! Runtime error types.

use thiserror::Error;

/// Errors surfaced by the execution engine, scheduler, and context manager.
///
/// Only overflow, cancellation, and budget-exhaustion are engine-terminal;
/// parse, approval, and tool errors are recovered locally by the scheduler
/// and never reach this type (see `ToolLoopResult` in [`crate::engine`]).
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The LLM provider returned an error.
    #[error("LLM error: {0}")]
    Llm(#[from] loopcore_llm::LlmError),

    /// A tool handler failed in a way the scheduler could not recover from
    /// locally (infrastructure failure, not an ordinary tool error).
    #[error("tool error: {0}")]
    Tool(#[from] loopcore_tools::ToolError),

    /// An approval-gate decision could not be honored.
    #[error("approval error: {0}")]
    Approval(#[from] loopcore_approval::ApprovalError),

    /// A message sequence violated the tool-call linkage invariant.
    #[error("context error: {0}")]
    Context(#[from] loopcore_core::CoreError),

    /// The context exceeded its token budget.
    #[error("context overflow: {current} tokens exceeds limit of {max}")]
    ContextOverflow {
        /// Estimated or reported token count that triggered the overflow.
        current: usize,
        /// Configured token budget.
        max: usize,
    },

    /// Sub-agent pool or executor failure (depth/concurrency limits,
    /// propagated child error).
    #[error("sub-agent error: {0}")]
    SubAgent(String),

    /// Serialization failure persisting or restoring runtime state.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid runtime configuration supplied at construction.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

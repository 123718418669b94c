//! Errors the approval gate can surface.

use thiserror::Error;

/// Failures raised while deciding whether a tool call may proceed.
#[derive(Debug, Error)]
pub enum ApprovalError {
    /// The confirmation callback itself failed (panicked, disconnected,
    /// etc.) rather than returning a decision.
    #[error("confirmation callback failed: {reason}")]
    CallbackFailed {
        /// Description of the failure.
        reason: String,
    },
}

/// Result type for approval operations.
pub type ApprovalResult<T> = Result<T, ApprovalError>;

//! Allowlist and human-in-the-loop approval gate for tool dispatch.
//!
//! The [`ApprovalGate`] decides whether a tool call may run without asking a
//! human, consulting the current [`ApprovalMode`] and a shared [`Allowlist`]
//! before falling back to a UI-provided [`ConfirmCallback`].

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod allowlist;
mod error;
mod gate;
mod types;

pub use allowlist::{Allowlist, allowlist_key};
pub use error::{ApprovalError, ApprovalResult};
pub use gate::{ApprovalGate, ConfirmCallback};
pub use types::{
    ApprovalMode, ConfirmDetails, ConfirmKind, ConfirmOutcome, GateDecision, ToolCategory,
};

/// Commonly used types for convenient import.
pub mod prelude {
    pub use crate::{
        Allowlist, ApprovalError, ApprovalGate, ApprovalMode, ApprovalResult, ConfirmCallback,
        ConfirmDetails, ConfirmKind, ConfirmOutcome, GateDecision, ToolCategory, allowlist_key,
    };
}

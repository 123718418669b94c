//! Commonly used types for convenient import.
//!
//! `use loopcore_runtime::prelude::*;` pulls in the facade plus the pieces
//! most callers need to configure a run without reaching into every module
//! individually.

pub use crate::{RuntimeError, RuntimeResult};

pub use crate::{Agent, AgentConfig, AgentResult, LoadHistoryOptions, ProviderKind, RunOptions};

pub use crate::{EngineConfig, ExecutionEngine, ToolLoopResult};

pub use crate::{Context, TokenUsage};

pub use crate::{Statistics, tokens_to_usd};

pub use crate::{SubAgentHandle, SubAgentId, SubAgentPool, SubAgentPoolStats, SubAgentStatus};

pub use crate::{Allowlist, ApprovalMode, ConfirmCallback};

pub use crate::{EventBus, EventReceiver, ExecutionEvent, ExecutionState};

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! The Agent Execution Core's reason-act loop: context management, tool
//! scheduling, sub-agents, and the thin [`Agent`](facade::Agent) facade that
//! ties them together.
//!
//! # Example
//!
//! ```rust,no_run
//! use loopcore_runtime::prelude::*;
//!
//! # async fn example() -> RuntimeResult<()> {
//! let mut agent = Agent::new(AgentConfig {
//!     provider: ProviderKind::Claude,
//!     model: "claude-opus-4-20250514".to_string(),
//!     api_key: Some(std::env::var("ANTHROPIC_API_KEY").unwrap_or_default()),
//!     system_prompt: "You are a focused coding assistant.".to_string(),
//!     ..AgentConfig::default()
//! });
//! agent.init()?;
//!
//! let result = agent.run("list the files in this directory", RunOptions::default()).await?;
//! println!("{:?}", result.content);
//! # Ok(())
//! # }
//! ```

pub mod prelude;

mod context;
mod engine;
mod error;
mod estimator;
mod facade;
mod scheduler;
mod statistics;
pub mod subagent;
pub mod subagent_executor;
mod summarizer;

pub use context::{Context, TokenUsage, DEFAULT_COMPRESSION_THRESHOLD, DEFAULT_MODEL_LIMIT};
pub use engine::{EngineConfig, ExecutionEngine, ToolLoopResult};
pub use error::{RuntimeError, RuntimeResult};
pub use estimator::estimate_tokens;
pub use facade::{Agent, AgentConfig, AgentResult, LoadHistoryOptions, ProviderKind, RunOptions};
pub use scheduler::{ToolOutcome, ToolScheduler};
pub use statistics::{tokens_to_usd, Statistics};
pub use subagent::{SubAgentHandle, SubAgentId, SubAgentPool, SubAgentPoolStats, SubAgentStatus};
pub use subagent_executor::{SubAgentExecutor, DEFAULT_SUBAGENT_TIMEOUT};
pub use summarizer::{OutputSummarizer, SummarizeOutcome, DEFAULT_SUMMARIZE_THRESHOLD_TOKENS};

// Re-export collaborating crates' central types for convenience so most
// callers only need this one crate on their direct dependency line.
pub use loopcore_approval::{Allowlist, ApprovalMode, ConfirmCallback};
pub use loopcore_events::{EventBus, EventReceiver, ExecutionEvent, ExecutionState};
pub use loopcore_tools::ToolRegistry;

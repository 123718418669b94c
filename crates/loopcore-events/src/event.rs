//! The typed event set emitted by a running execution.

use chrono::{DateTime, Utc};
use loopcore_core::ToolCall;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::snapshot::ExecutionStats;

/// Common fields attached to every event: when it happened and which
/// component emitted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique id for this event instance.
    pub event_id: String,
    /// Wall-clock time the event was constructed.
    pub timestamp: DateTime<Utc>,
    /// Name of the component that emitted the event (engine, scheduler, ...).
    pub source: String,
}

impl EventMetadata {
    /// Stamp a new metadata block for an event about to be emitted by
    /// `source`.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            source: source.into(),
        }
    }
}

/// High-level phase of an execution, as seen by subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// No turn in progress.
    Idle,
    /// Waiting on the LLM for the next completion.
    Thinking,
    /// A tool call is running.
    ToolExecuting,
    /// A tool call is waiting on a human decision.
    AwaitingApproval,
    /// The context manager is compressing history.
    Compressing,
    /// The run ended because it was cancelled.
    Cancelled,
    /// The run ended in an unrecoverable error.
    Error,
    /// The run produced a final assistant message.
    Complete,
}

/// One event in the execution's typed event stream.
///
/// Every terminal tool state (`ToolComplete` / `ToolError` / `ToolCancelled`)
/// is guaranteed to be preceded by exactly one `ToolValidating` and one
/// `ToolExecuting` for the same `call_id` — the scheduler is responsible for
/// this ordering invariant, not the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    /// A new turn has begun.
    ExecutionStart {
        /// Event metadata.
        metadata: EventMetadata,
    },
    /// The turn produced a final, non-tool-call assistant message.
    ExecutionComplete {
        /// Event metadata.
        metadata: EventMetadata,
    },
    /// The turn was cancelled before completion.
    ExecutionCancel {
        /// Event metadata.
        metadata: EventMetadata,
    },
    /// The turn ended in an unrecoverable error.
    ExecutionError {
        /// Human-readable description of what went wrong.
        message: String,
        /// Event metadata.
        metadata: EventMetadata,
    },
    /// The execution's high-level state changed.
    StateChange {
        /// New state.
        state: ExecutionState,
        /// Rotating human-facing status phrase for this state.
        phrase: String,
        /// Event metadata.
        metadata: EventMetadata,
    },
    /// The LLM has begun streaming a reasoning/thinking segment.
    ThinkingStart {
        /// Event metadata.
        metadata: EventMetadata,
    },
    /// One chunk of a reasoning/thinking segment.
    ThinkingDelta {
        /// Text delta.
        delta: String,
        /// Event metadata.
        metadata: EventMetadata,
    },
    /// The reasoning/thinking segment has ended.
    ThinkingComplete {
        /// Event metadata.
        metadata: EventMetadata,
    },
    /// A complete assistant message, including any tool calls it carries.
    AssistantMessage {
        /// Text content (may be empty if the message is tool-calls only).
        content: String,
        /// Tool calls requested by this message.
        tool_calls: Vec<ToolCall>,
        /// Event metadata.
        metadata: EventMetadata,
    },
    /// A tool request has been accepted and is being checked against the
    /// approval gate.
    ToolValidating {
        /// Id of the tool call.
        call_id: String,
        /// Tool name.
        name: String,
        /// The call's raw, on-wire argument string, carried here so the
        /// Event Stream's snapshot can build a full `ToolRecord` without
        /// reaching back into the Scheduler.
        raw_arguments: String,
        /// Event metadata.
        metadata: EventMetadata,
    },
    /// A tool call is now running.
    ToolExecuting {
        /// Id of the tool call.
        call_id: String,
        /// Tool name.
        name: String,
        /// Event metadata.
        metadata: EventMetadata,
    },
    /// Incremental output from a running tool call.
    ToolOutput {
        /// Id of the tool call.
        call_id: String,
        /// Output chunk.
        chunk: String,
        /// Event metadata.
        metadata: EventMetadata,
    },
    /// A tool call finished successfully.
    ToolComplete {
        /// Id of the tool call.
        call_id: String,
        /// Tool name.
        name: String,
        /// Final output (possibly summarized if it was large).
        output: String,
        /// Event metadata.
        metadata: EventMetadata,
    },
    /// A tool call finished with an error.
    ToolError {
        /// Id of the tool call.
        call_id: String,
        /// Tool name.
        name: String,
        /// Error message.
        message: String,
        /// Event metadata.
        metadata: EventMetadata,
    },
    /// A tool call is paused waiting on a human decision.
    ToolAwaitingApproval {
        /// Id of the tool call.
        call_id: String,
        /// Tool name.
        name: String,
        /// Category shown to the reviewer (e.g. `"edit"`, `"exec"`).
        category: String,
        /// One-line human-readable summary of the action requested.
        summary: String,
        /// Event metadata.
        metadata: EventMetadata,
    },
    /// A tool call was cancelled before or during execution.
    ToolCancelled {
        /// Id of the tool call.
        call_id: String,
        /// Tool name.
        name: String,
        /// Event metadata.
        metadata: EventMetadata,
    },
    /// An event re-emitted from a sub-agent spawned by a `Task` tool call,
    /// scoped under the parent call's id.
    ToolProgress {
        /// Id of the parent tool call the sub-agent is running under.
        call_id: String,
        /// The sub-agent's own event.
        inner: Box<ExecutionEvent>,
        /// Event metadata.
        metadata: EventMetadata,
    },
    /// Streaming text delta for the current assistant message.
    ContentDelta {
        /// Text delta.
        delta: String,
        /// Event metadata.
        metadata: EventMetadata,
    },
    /// The current assistant message's content is final.
    ContentComplete {
        /// Full content.
        content: String,
        /// Event metadata.
        metadata: EventMetadata,
    },
    /// Updated running statistics for the execution.
    StatsUpdate {
        /// Running statistics snapshot.
        stats: ExecutionStats,
        /// Running cost in USD, if cost accounting is enabled.
        total_cost_usd: Option<f64>,
        /// Event metadata.
        metadata: EventMetadata,
    },
    /// Context compression has begun.
    CompressionStart {
        /// Token count before compression.
        before_tokens: usize,
        /// Event metadata.
        metadata: EventMetadata,
    },
    /// Context compression has finished.
    CompressionComplete {
        /// Token count before compression.
        before_tokens: usize,
        /// Token count after compression.
        after_tokens: usize,
        /// Event metadata.
        metadata: EventMetadata,
    },
}

impl ExecutionEvent {
    /// A stable, lowercase, colon-separated name for this event, matching
    /// the wire vocabulary documented for the event stream (e.g.
    /// `"tool:awaiting_approval"`).
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ExecutionStart { .. } => "execution:start",
            Self::ExecutionComplete { .. } => "execution:complete",
            Self::ExecutionCancel { .. } => "execution:cancel",
            Self::ExecutionError { .. } => "execution:error",
            Self::StateChange { .. } => "state:change",
            Self::ThinkingStart { .. } => "thinking:start",
            Self::ThinkingDelta { .. } => "thinking:delta",
            Self::ThinkingComplete { .. } => "thinking:complete",
            Self::AssistantMessage { .. } => "assistant:message",
            Self::ToolValidating { .. } => "tool:validating",
            Self::ToolExecuting { .. } => "tool:executing",
            Self::ToolOutput { .. } => "tool:output",
            Self::ToolComplete { .. } => "tool:complete",
            Self::ToolError { .. } => "tool:error",
            Self::ToolAwaitingApproval { .. } => "tool:awaiting_approval",
            Self::ToolCancelled { .. } => "tool:cancelled",
            Self::ToolProgress { .. } => "tool:progress",
            Self::ContentDelta { .. } => "content:delta",
            Self::ContentComplete { .. } => "content:complete",
            Self::StatsUpdate { .. } => "stats:update",
            Self::CompressionStart { .. } => "compression:start",
            Self::CompressionComplete { .. } => "compression:complete",
        }
    }

    /// The metadata block common to every variant.
    #[must_use]
    pub fn metadata(&self) -> &EventMetadata {
        match self {
            Self::ExecutionStart { metadata }
            | Self::ExecutionComplete { metadata }
            | Self::ExecutionCancel { metadata }
            | Self::ExecutionError { metadata, .. }
            | Self::StateChange { metadata, .. }
            | Self::ThinkingStart { metadata }
            | Self::ThinkingDelta { metadata, .. }
            | Self::ThinkingComplete { metadata }
            | Self::AssistantMessage { metadata, .. }
            | Self::ToolValidating { metadata, .. }
            | Self::ToolExecuting { metadata, .. }
            | Self::ToolOutput { metadata, .. }
            | Self::ToolComplete { metadata, .. }
            | Self::ToolError { metadata, .. }
            | Self::ToolAwaitingApproval { metadata, .. }
            | Self::ToolCancelled { metadata, .. }
            | Self::ToolProgress { metadata, .. }
            | Self::ContentDelta { metadata, .. }
            | Self::ContentComplete { metadata, .. }
            | Self::StatsUpdate { metadata, .. }
            | Self::CompressionStart { metadata, .. }
            | Self::CompressionComplete { metadata, .. } => metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_matches_wire_vocabulary() {
        let event = ExecutionEvent::ToolAwaitingApproval {
            call_id: "call_1".to_string(),
            name: "bash".to_string(),
            category: "exec".to_string(),
            summary: "run `ls`".to_string(),
            metadata: EventMetadata::new("scheduler"),
        };
        assert_eq!(event.event_type(), "tool:awaiting_approval");
    }

    #[test]
    fn metadata_roundtrips_through_every_variant_family() {
        let events = vec![
            ExecutionEvent::ExecutionStart {
                metadata: EventMetadata::new("engine"),
            },
            ExecutionEvent::CompressionComplete {
                before_tokens: 9000,
                after_tokens: 4000,
                metadata: EventMetadata::new("context"),
            },
        ];
        for event in events {
            assert!(!event.metadata().event_id.is_empty());
        }
    }
}

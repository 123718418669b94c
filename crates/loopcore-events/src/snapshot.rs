//! The execution snapshot: mutable state visible to subscribers without
//! having to replay the event stream.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{ExecutionEvent, ExecutionState};

/// Running counters for one execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    /// Wall-clock time elapsed since execution start, in milliseconds.
    pub elapsed_ms: u64,
    /// Prompt tokens consumed across all completions so far.
    pub input_tokens: u64,
    /// Completion tokens produced across all completions so far.
    pub output_tokens: u64,
    /// `input_tokens + output_tokens`.
    pub total_tokens: u64,
    /// Number of tool calls dispatched so far.
    pub tool_call_count: u64,
    /// Number of reason-act loop iterations completed so far.
    pub loop_count: u64,
}

impl ExecutionStats {
    /// Fold in the usage of one completion and one batch of tool calls.
    pub fn record_completion(&mut self, input_tokens: u64, output_tokens: u64) {
        self.input_tokens = self.input_tokens.saturating_add(input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(output_tokens);
        self.total_tokens = self.input_tokens.saturating_add(self.output_tokens);
        self.loop_count = self.loop_count.saturating_add(1);
    }

    /// Fold in one dispatched tool call.
    pub fn record_tool_call(&mut self) {
        self.tool_call_count = self.tool_call_count.saturating_add(1);
    }
}

/// State-machine label for one tool call, per the Scheduler's dispatch
/// sequence: `validating -> awaiting_approval -> scheduled -> executing ->
/// {success | error | cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolRecordStatus {
    /// Arguments are being parsed and the tool looked up.
    Validating,
    /// Waiting on a human decision via the Approval Gate.
    AwaitingApproval,
    /// Approved and queued to run.
    Scheduled,
    /// The handler is running.
    Executing,
    /// Finished successfully.
    Success,
    /// Finished with an error.
    Error,
    /// Cancelled before or during execution.
    Cancelled,
}

/// The Scheduler's journal entry for one tool call: request, current status,
/// and terminal outcome once reached. Retained for the duration of the
/// execution, whether still in flight (`current_tool_call`) or terminal
/// (`tool_history`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRecord {
    /// Id of the call.
    pub call_id: String,
    /// Tool name.
    pub name: String,
    /// The call's raw, on-wire argument string.
    pub raw_arguments: String,
    /// Current state-machine label.
    pub status: ToolRecordStatus,
    /// When this record was created (reset at the `executing` transition so
    /// `duration_ms` reflects actual execution, not time spent waiting on
    /// approval).
    pub start_time: DateTime<Utc>,
    /// Human-readable summary shown for the approval prompt, if one was
    /// required.
    pub confirm_summary: Option<String>,
    /// Output, once the call finishes successfully.
    pub result: Option<String>,
    /// Error message, if the call finished in `error`.
    pub error: Option<String>,
    /// Milliseconds elapsed since `start_time`, set once a terminal state is
    /// reached.
    pub duration_ms: Option<u64>,
}

impl ToolRecord {
    /// A freshly validated call, not yet subject to approval or execution.
    #[must_use]
    pub fn new(call_id: impl Into<String>, name: impl Into<String>, raw_arguments: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            raw_arguments: raw_arguments.into(),
            status: ToolRecordStatus::Validating,
            start_time: Utc::now(),
            confirm_summary: None,
            result: None,
            error: None,
            duration_ms: None,
        }
    }
}

/// Mutable state visible to subscribers for one execution: created fresh at
/// `execution:start` and discarded (not reused) at the next one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    /// Current high-level state, or `None` before the first `state:change`.
    pub state: Option<ExecutionState>,
    /// Rotating human-facing status phrase for the current state.
    pub status_phrase: String,
    /// Running statistics.
    pub stats: ExecutionStats,
    /// The tool call in flight, if any.
    pub current_tool_call: Option<ToolRecord>,
    /// Tool calls that have reached a terminal state this execution.
    pub tool_history: Vec<ToolRecord>,
    /// Assistant content streamed so far for the current turn.
    pub streaming_content: String,
    /// Reasoning/thinking content streamed so far, if the provider exposes it.
    pub thinking_buffer: Option<String>,
    /// The error message if the execution ended in `Error`.
    pub error: Option<String>,
}

impl ExecutionSnapshot {
    /// A fresh snapshot for a new execution.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one published event into this snapshot, so subscribers can read
    /// current state without replaying the stream themselves.
    pub fn apply(&mut self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::ExecutionStart { .. } => *self = Self::new(),
            ExecutionEvent::StateChange { state, phrase, .. } => {
                self.state = Some(*state);
                self.status_phrase = phrase.clone();
            },
            ExecutionEvent::ThinkingStart { .. } => self.thinking_buffer = Some(String::new()),
            ExecutionEvent::ThinkingDelta { delta, .. } => {
                self.thinking_buffer.get_or_insert_with(String::new).push_str(delta);
            },
            ExecutionEvent::ContentDelta { delta, .. } => self.streaming_content.push_str(delta),
            ExecutionEvent::ContentComplete { content, .. } => self.streaming_content = content.clone(),
            ExecutionEvent::ToolValidating { call_id, name, raw_arguments, .. } => {
                self.current_tool_call = Some(ToolRecord::new(call_id.clone(), name.clone(), raw_arguments.clone()));
            },
            ExecutionEvent::ToolAwaitingApproval { call_id, summary, .. } => {
                if let Some(record) = self.current_record_mut(call_id) {
                    record.status = ToolRecordStatus::AwaitingApproval;
                    record.confirm_summary = Some(summary.clone());
                }
            },
            ExecutionEvent::ToolExecuting { call_id, .. } => {
                if let Some(record) = self.current_record_mut(call_id) {
                    record.status = ToolRecordStatus::Executing;
                    record.start_time = Utc::now();
                }
            },
            ExecutionEvent::ToolComplete { call_id, output, .. } => {
                self.finish_tool_call(call_id, ToolRecordStatus::Success, Some(output.clone()), None);
            },
            ExecutionEvent::ToolError { call_id, message, .. } => {
                self.finish_tool_call(call_id, ToolRecordStatus::Error, None, Some(message.clone()));
            },
            ExecutionEvent::ToolCancelled { call_id, .. } => {
                self.finish_tool_call(call_id, ToolRecordStatus::Cancelled, None, None);
            },
            ExecutionEvent::StatsUpdate { stats, .. } => self.stats = *stats,
            ExecutionEvent::ExecutionError { message, .. } => self.error = Some(message.clone()),
            _ => {},
        }
    }

    fn current_record_mut(&mut self, call_id: &str) -> Option<&mut ToolRecord> {
        self.current_tool_call.as_mut().filter(|record| record.call_id == call_id)
    }

    fn finish_tool_call(&mut self, call_id: &str, status: ToolRecordStatus, result: Option<String>, error: Option<String>) {
        let mut record = match self.current_tool_call.take() {
            Some(record) if record.call_id == call_id => record,
            Some(other) => {
                self.current_tool_call = Some(other);
                ToolRecord::new(call_id, String::new(), String::new())
            },
            None => ToolRecord::new(call_id, String::new(), String::new()),
        };
        let elapsed = (Utc::now() - record.start_time).num_milliseconds().max(0);
        record.status = status;
        record.result = result;
        record.error = error;
        record.duration_ms = Some(u64::try_from(elapsed).unwrap_or(u64::MAX));
        self.tool_history.push(record);
    }
}

/// Vocabulary the status phrase is rotated through while the state is
/// `thinking` or `tool_executing`.
pub const THINKING_PHRASES: &[&str] = &["Thinking…", "Reasoning…", "Considering the request…"];

/// Vocabulary used while a tool call is executing.
pub const TOOL_EXECUTING_PHRASES: &[&str] = &["Working…", "Running tool…", "Executing…"];

/// Minimum interval between status phrase rotations.
pub const PHRASE_ROTATE_MIN: Duration = Duration::from_secs(3);

/// Maximum interval between status phrase rotations.
pub const PHRASE_ROTATE_MAX: Duration = Duration::from_secs(5);

/// Pick the phrase vocabulary for a given state, or `None` if the state does
/// not rotate a phrase at all.
#[must_use]
pub fn phrase_vocabulary_for(state: ExecutionState) -> Option<&'static [&'static str]> {
    match state {
        ExecutionState::Thinking => Some(THINKING_PHRASES),
        ExecutionState::ToolExecuting => Some(TOOL_EXECUTING_PHRASES),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_accumulate_across_multiple_completions() {
        let mut stats = ExecutionStats::default();
        stats.record_completion(100, 50);
        stats.record_completion(200, 80);
        assert_eq!(stats.input_tokens, 300);
        assert_eq!(stats.output_tokens, 130);
        assert_eq!(stats.total_tokens, 430);
        assert_eq!(stats.loop_count, 2);
    }

    #[test]
    fn tool_executing_has_a_distinct_vocabulary_from_thinking() {
        let thinking = phrase_vocabulary_for(ExecutionState::Thinking).unwrap();
        let executing = phrase_vocabulary_for(ExecutionState::ToolExecuting).unwrap();
        assert_ne!(thinking, executing);
        assert!(phrase_vocabulary_for(ExecutionState::Idle).is_none());
    }

    fn meta() -> EventMetadata {
        EventMetadata::new("test")
    }

    #[test]
    fn tool_call_moves_from_current_to_history_on_completion() {
        let mut snapshot = ExecutionSnapshot::new();
        snapshot.apply(&ExecutionEvent::ToolValidating {
            call_id: "call_1".to_string(),
            name: "read_file".to_string(),
            raw_arguments: r#"{"path": "a.txt"}"#.to_string(),
            metadata: meta(),
        });
        assert_eq!(snapshot.current_tool_call.as_ref().unwrap().status, ToolRecordStatus::Validating);

        snapshot.apply(&ExecutionEvent::ToolAwaitingApproval {
            call_id: "call_1".to_string(),
            name: "read_file".to_string(),
            category: "read".to_string(),
            summary: "read a.txt".to_string(),
            metadata: meta(),
        });
        assert_eq!(snapshot.current_tool_call.as_ref().unwrap().status, ToolRecordStatus::AwaitingApproval);
        assert_eq!(snapshot.current_tool_call.as_ref().unwrap().confirm_summary.as_deref(), Some("read a.txt"));

        snapshot.apply(&ExecutionEvent::ToolExecuting {
            call_id: "call_1".to_string(),
            name: "read_file".to_string(),
            metadata: meta(),
        });
        assert_eq!(snapshot.current_tool_call.as_ref().unwrap().status, ToolRecordStatus::Executing);

        snapshot.apply(&ExecutionEvent::ToolComplete {
            call_id: "call_1".to_string(),
            name: "read_file".to_string(),
            output: "file contents".to_string(),
            metadata: meta(),
        });
        assert!(snapshot.current_tool_call.is_none());
        assert_eq!(snapshot.tool_history.len(), 1);
        let record = &snapshot.tool_history[0];
        assert_eq!(record.status, ToolRecordStatus::Success);
        assert_eq!(record.result.as_deref(), Some("file contents"));
        assert!(record.duration_ms.is_some());
    }

    #[test]
    fn execution_start_resets_a_prior_snapshot() {
        let mut snapshot = ExecutionSnapshot::new();
        snapshot.apply(&ExecutionEvent::ContentDelta { delta: "partial".to_string(), metadata: meta() });
        assert_eq!(snapshot.streaming_content, "partial");

        snapshot.apply(&ExecutionEvent::ExecutionStart { metadata: meta() });
        assert!(snapshot.streaming_content.is_empty());
        assert!(snapshot.tool_history.is_empty());
    }

    #[test]
    fn stats_update_replaces_the_snapshot_stats() {
        let mut snapshot = ExecutionSnapshot::new();
        let mut stats = ExecutionStats::default();
        stats.record_completion(10, 5);
        snapshot.apply(&ExecutionEvent::StatsUpdate { stats, total_cost_usd: None, metadata: meta() });
        assert_eq!(snapshot.stats.input_tokens, 10);
    }
}

//! Validates, gates, and executes one batch of tool calls from a single
//! assistant message, in the strict order the LLM requested them.

use std::sync::Arc;
use std::time::Duration;

use loopcore_approval::{allowlist_key, ApprovalGate, ConfirmDetails, ToolCategory};
use loopcore_core::{Message, ToolCall};
use loopcore_events::{EventBus, EventMetadata, ExecutionEvent};
use loopcore_llm::LlmProvider;
use loopcore_tools::{truncate_output, BuiltinTool, ToolContext, ToolError, ToolRegistry};
use serde_json::Value;

use crate::summarizer::OutputSummarizer;

/// Default timeout applied to every tool call, modeled as cancelling the
/// call's own [`ToolContext::cancellation_token`] rather than a separate
/// abort mechanism.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause between sequential calls in one batch.
pub const INTER_CALL_PAUSE: Duration = Duration::from_millis(500);

/// Terminal outcome of one tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// The tool ran and returned output (possibly condensed).
    Success {
        /// Final output appended to history.
        output: String,
    },
    /// The tool was rejected (parse failure, missing tool, approval
    /// denial, or handler failure) without crashing the run.
    Error {
        /// Human-readable description of what went wrong.
        message: String,
    },
    /// The call was cancelled before or during execution.
    Cancelled,
}

/// Validates tool-call arguments, runs them past the approval gate, and
/// executes them against the tool registry.
pub struct ToolScheduler {
    registry: Arc<ToolRegistry>,
    approval_gate: Arc<ApprovalGate>,
    summarizer: OutputSummarizer,
}

impl ToolScheduler {
    /// Build a scheduler over a shared tool registry and approval gate.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, approval_gate: Arc<ApprovalGate>, summarizer: OutputSummarizer) -> Self {
        Self { registry, approval_gate, summarizer }
    }

    /// Execute every call in `calls`, strictly sequentially, pausing
    /// [`INTER_CALL_PAUSE`] between calls. `contexts` must be the same
    /// length as `calls`, one already-built [`ToolContext`] per call — built
    /// ahead of time by the caller so per-call async setup (e.g. registering
    /// a sub-agent spawner) can run before the batch starts.
    pub async fn execute_batch(
        &self,
        calls: &[ToolCall],
        contexts: Vec<ToolContext>,
        events: &EventBus,
        provider: &(dyn LlmProvider + Send + Sync),
    ) -> Vec<(ToolCall, ToolOutcome, Message)> {
        let mut results = Vec::with_capacity(calls.len());

        for (index, (call, ctx)) in calls.iter().zip(contexts.iter()).enumerate() {
            if index > 0 {
                tokio::time::sleep(INTER_CALL_PAUSE).await;
            }
            let (outcome, message) = self.execute_one(call, ctx, events, provider).await;
            results.push((call.clone(), outcome, message));
        }

        results
    }

    async fn execute_one(
        &self,
        call: &ToolCall,
        ctx: &ToolContext,
        events: &EventBus,
        provider: &(dyn LlmProvider + Send + Sync),
    ) -> (ToolOutcome, Message) {
        events.publish(ExecutionEvent::ToolValidating {
            call_id: call.id.clone(),
            name: call.name.clone(),
            raw_arguments: call.raw_arguments.clone(),
            metadata: EventMetadata::new("scheduler"),
        });

        let args = match parse_tool_arguments(&call.raw_arguments) {
            Ok(args) => args,
            Err(message) => return self.terminal_error(call, events, message),
        };

        let Some(tool) = self.registry.get(&call.name) else {
            return self.terminal_error(call, events, format!("unknown tool: {}", call.name));
        };

        let is_read_only = tool.is_read_only();
        let category = tool.category();
        let key = allowlist_key(tool.name(), extract_str(&args, "file_path").or_else(|| extract_str(&args, "path")), extract_str(&args, "command"));

        let needs_preview = approval_preview_needed(&self.approval_gate, category, is_read_only);
        let details: Option<ConfirmDetails> = if needs_preview { tool.confirm_predicate(&args) } else { None };

        if let Some(details) = &details {
            events.publish(ExecutionEvent::ToolAwaitingApproval {
                call_id: call.id.clone(),
                name: call.name.clone(),
                category: category_label(category).to_string(),
                summary: details.title.clone(),
                metadata: EventMetadata::new("scheduler"),
            });
        }

        let decision = self
            .approval_gate
            .decide(&call.id, tool.name(), is_read_only, category, &key, move || details)
            .await;

        if let loopcore_approval::GateDecision::Cancel { reason } = decision {
            return self.terminal_cancelled(call, events, Some(reason));
        }

        events.publish(ExecutionEvent::ToolExecuting {
            call_id: call.id.clone(),
            name: call.name.clone(),
            metadata: EventMetadata::new("scheduler"),
        });

        match run_with_cancellation(tool, args, ctx, DEFAULT_TOOL_TIMEOUT).await {
            Ok(output) => {
                let summarized = self.summarizer.summarize(call.name.as_str(), &output, provider).await;
                let final_output = truncate_output(summarized.output);
                events.publish(ExecutionEvent::ToolComplete {
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                    output: final_output.clone(),
                    metadata: EventMetadata::new("scheduler"),
                });
                let message = Message::tool_result(call.id.clone(), call.name.clone(), final_output.clone());
                (ToolOutcome::Success { output: final_output }, message)
            },
            Err(ToolError::Cancelled) => self.terminal_cancelled(call, events, None),
            Err(other) => self.terminal_error(call, events, other.to_string()),
        }
    }

    fn terminal_error(&self, call: &ToolCall, events: &EventBus, message: String) -> (ToolOutcome, Message) {
        events.publish(ExecutionEvent::ToolError {
            call_id: call.id.clone(),
            name: call.name.clone(),
            message: message.clone(),
            metadata: EventMetadata::new("scheduler"),
        });
        let reply = Message::tool_result(call.id.clone(), call.name.clone(), format!("error: {message}"));
        (ToolOutcome::Error { message }, reply)
    }

    fn terminal_cancelled(&self, call: &ToolCall, events: &EventBus, reason: Option<String>) -> (ToolOutcome, Message) {
        events.publish(ExecutionEvent::ToolCancelled {
            call_id: call.id.clone(),
            name: call.name.clone(),
            metadata: EventMetadata::new("scheduler"),
        });
        let content = match reason {
            Some(reason) => format!("cancelled: {reason}"),
            None => "cancelled".to_string(),
        };
        let reply = Message::tool_result(call.id.clone(), call.name.clone(), content);
        (ToolOutcome::Cancelled, reply)
    }
}

/// Whether the approval gate's cheap, predicate-free shortcuts (yolo,
/// read-only, auto-edit, allowlist hit) could already resolve this call —
/// if so there's no point paying for `confirm_predicate`, and no approval
/// prompt will be shown.
fn approval_preview_needed(gate: &ApprovalGate, category: ToolCategory, is_read_only: bool) -> bool {
    use loopcore_approval::ApprovalMode;

    if gate.mode() == ApprovalMode::Yolo || is_read_only {
        return false;
    }
    if gate.mode() == ApprovalMode::AutoEdit && category.is_edit_like() {
        return false;
    }
    true
}

fn category_label(category: ToolCategory) -> &'static str {
    match category {
        ToolCategory::Read => "read",
        ToolCategory::Edit => "edit",
        ToolCategory::Exec => "exec",
        ToolCategory::Search => "search",
        ToolCategory::Agent => "agent",
        ToolCategory::Other => "other",
    }
}

fn extract_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

/// Race a tool's execution against its own cancellation token and a fixed
/// timeout, biased toward cancellation so a call aborted at the same
/// instant it would have timed out is reported as cancelled.
async fn run_with_cancellation(
    tool: &dyn BuiltinTool,
    args: Value,
    ctx: &ToolContext,
    timeout: Duration,
) -> Result<String, ToolError> {
    tokio::select! {
        biased;
        () = ctx.cancellation_token.cancelled() => Err(ToolError::Cancelled),
        result = tokio::time::timeout(timeout, tool.execute(args, ctx)) => {
            match result {
                Ok(inner) => inner,
                Err(_elapsed) => Err(ToolError::Timeout(timeout.as_millis() as u64)),
            }
        }
    }
}

/// Parse a tool call's raw argument string into JSON.
///
/// Tries a direct parse first, then retries after collapsing doubled
/// backslashes (a common artifact of double-encoded LLM output). A value
/// that still fails to parse is reported as a parse error only if it looks
/// like it was meant to be JSON (starts with `{` or `[`); otherwise it is
/// treated as a bare string argument. Any string value found inside the
/// parsed structure that itself looks like embedded JSON is recursively
/// materialized.
///
/// # Errors
///
/// Returns a human-readable message when the input looks like JSON but
/// could not be parsed under either attempt.
pub fn parse_tool_arguments(raw: &str) -> Result<Value, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }

    let parsed = serde_json::from_str::<Value>(trimmed)
        .or_else(|_| serde_json::from_str::<Value>(&trimmed.replace("\\\\", "\\")));

    match parsed {
        Ok(value) => Ok(materialize_nested_json(value)),
        Err(_) if trimmed.starts_with('{') || trimmed.starts_with('[') => {
            Err(format!("parse error: could not parse tool arguments: {trimmed}"))
        },
        Err(_) => Ok(Value::String(trimmed.to_string())),
    }
}

fn materialize_nested_json(value: Value) -> Value {
    match value {
        Value::String(text) => {
            let candidate = text.trim();
            let looks_like_json =
                (candidate.starts_with('{') && candidate.ends_with('}')) || (candidate.starts_with('[') && candidate.ends_with(']'));
            if looks_like_json {
                if let Ok(nested) = serde_json::from_str::<Value>(candidate) {
                    return materialize_nested_json(nested);
                }
            }
            Value::String(text)
        },
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, materialize_nested_json(v))).collect()),
        Value::Array(items) => Value::Array(items.into_iter().map(materialize_nested_json).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use loopcore_approval::{Allowlist, ApprovalMode};
    use loopcore_llm::{LlmResponse, LlmResult, LlmToolDefinition, StopReason, Usage};
    use tokio_util::sync::CancellationToken;

    use super::*;

    struct StubProvider;

    #[async_trait]
    impl LlmProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        fn model(&self) -> &str {
            "stub-model"
        }

        async fn stream(
            &self,
            _messages: &[loopcore_llm::Message],
            _tools: &[LlmToolDefinition],
            _system: &str,
        ) -> LlmResult<loopcore_llm::StreamBox> {
            unimplemented!("not exercised by these tests")
        }

        async fn complete(
            &self,
            _messages: &[loopcore_llm::Message],
            _tools: &[LlmToolDefinition],
            _system: &str,
        ) -> LlmResult<LlmResponse> {
            Ok(LlmResponse {
                message: loopcore_llm::Message::assistant("summary"),
                has_tool_calls: false,
                stop_reason: StopReason::EndTurn,
                usage: Usage { input_tokens: 1, output_tokens: 1 },
            })
        }

        fn max_context_length(&self) -> usize {
            100_000
        }
    }

    struct EchoTool;

    #[async_trait]
    impl BuiltinTool for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn description(&self) -> &'static str {
            "echoes its input"
        }

        fn input_schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }

        fn category(&self) -> ToolCategory {
            ToolCategory::Read
        }

        async fn execute(&self, args: Value, _ctx: &ToolContext) -> loopcore_tools::ToolResult {
            Ok(args.to_string())
        }
    }

    struct SlowTool;

    #[async_trait]
    impl BuiltinTool for SlowTool {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn description(&self) -> &'static str {
            "never finishes"
        }

        fn input_schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }

        fn category(&self) -> ToolCategory {
            ToolCategory::Read
        }

        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> loopcore_tools::ToolResult {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("unreachable".to_string())
        }
    }

    struct WriteLikeTool;

    #[async_trait]
    impl BuiltinTool for WriteLikeTool {
        fn name(&self) -> &'static str {
            "write_like"
        }

        fn description(&self) -> &'static str {
            "pretends to write a file"
        }

        fn input_schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }

        fn category(&self) -> ToolCategory {
            ToolCategory::Edit
        }

        fn confirm_predicate(&self, args: &Value) -> Option<ConfirmDetails> {
            Some(ConfirmDetails::edit("write a file", extract_str(args, "file_path").unwrap_or("?"), "new content"))
        }

        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> loopcore_tools::ToolResult {
            Ok("wrote".to_string())
        }
    }

    fn test_ctx(token: CancellationToken) -> ToolContext {
        ToolContext::new(
            std::env::temp_dir(),
            "session-1",
            "call-1",
            token,
            ApprovalMode::Default,
            None,
        )
    }

    #[test]
    fn parses_plain_json() {
        let value = parse_tool_arguments(r#"{"path": "a.txt"}"#).unwrap();
        assert_eq!(value, serde_json::json!({"path": "a.txt"}));
    }

    #[test]
    fn retries_with_unescaped_backslashes() {
        let raw = r#"{"path": "C:\\\\Users\\\\x"}"#;
        let value = parse_tool_arguments(raw).unwrap();
        assert_eq!(value["path"], "C:\\Users\\x");
    }

    #[test]
    fn reports_parse_error_for_malformed_json_looking_input() {
        let err = parse_tool_arguments("{not json at all").unwrap_err();
        assert!(err.starts_with("parse error"));
    }

    #[test]
    fn non_json_scalar_is_treated_as_bare_string() {
        let value = parse_tool_arguments("just a plain word").unwrap();
        assert_eq!(value, Value::String("just a plain word".to_string()));
    }

    #[test]
    fn recursively_materializes_nested_json_strings() {
        let raw = r#"{"payload": "{\"inner\": 1}"}"#;
        let value = parse_tool_arguments(raw).unwrap();
        assert_eq!(value["payload"]["inner"], 1);
    }

    #[tokio::test]
    async fn read_only_tool_executes_without_approval() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let gate = Arc::new(ApprovalGate::new(ApprovalMode::Default, Arc::new(Allowlist::new())));
        let scheduler = ToolScheduler::new(Arc::new(registry), gate, OutputSummarizer::new(false));
        let events = EventBus::new();
        let call = ToolCall::new("call_1", "echo", "{}");
        let contexts = vec![test_ctx(CancellationToken::new())];
        let results = scheduler.execute_batch(&[call], contexts, &events, &StubProvider).await;
        assert!(matches!(results[0].1, ToolOutcome::Success { .. }));
    }

    #[tokio::test]
    async fn unknown_tool_is_a_local_error_not_a_crash() {
        let registry = ToolRegistry::new();
        let gate = Arc::new(ApprovalGate::new(ApprovalMode::Default, Arc::new(Allowlist::new())));
        let scheduler = ToolScheduler::new(Arc::new(registry), gate, OutputSummarizer::new(false));
        let events = EventBus::new();
        let call = ToolCall::new("call_1", "nonexistent", "{}");
        let contexts = vec![test_ctx(CancellationToken::new())];
        let results = scheduler.execute_batch(&[call], contexts, &events, &StubProvider).await;
        assert!(matches!(results[0].1, ToolOutcome::Error { .. }));
    }

    #[tokio::test]
    async fn missing_confirmation_callback_cancels_edit_like_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(WriteLikeTool));
        let gate = Arc::new(ApprovalGate::new(ApprovalMode::Default, Arc::new(Allowlist::new())));
        let scheduler = ToolScheduler::new(Arc::new(registry), gate, OutputSummarizer::new(false));
        let events = EventBus::new();
        let call = ToolCall::new("call_1", "write_like", r#"{"file_path": "x.txt"}"#);
        let contexts = vec![test_ctx(CancellationToken::new())];
        let results = scheduler.execute_batch(&[call], contexts, &events, &StubProvider).await;
        assert!(matches!(results[0].1, ToolOutcome::Cancelled));
    }

    #[tokio::test]
    async fn cancelled_token_aborts_a_running_call() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(SlowTool));
        let gate = Arc::new(ApprovalGate::new(ApprovalMode::Yolo, Arc::new(Allowlist::new())));
        let scheduler = ToolScheduler::new(Arc::new(registry), gate, OutputSummarizer::new(false));
        let events = EventBus::new();
        let call = ToolCall::new("call_1", "slow", "{}");
        let token = CancellationToken::new();
        let token_clone = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token_clone.cancel();
        });
        let contexts = vec![test_ctx(token)];
        let results = scheduler.execute_batch(&[call], contexts, &events, &StubProvider).await;
        assert!(matches!(results[0].1, ToolOutcome::Cancelled));
    }
}

//! Sub-agent executor — implements [`SubAgentSpawner`] by driving a child
//! [`ExecutionEngine`], so a `Task` tool call and a top-level turn share the
//! exact same reason-act loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use loopcore_approval::{Allowlist, ApprovalMode, ConfirmCallback};
use loopcore_core::{Message, MessageRole};
use loopcore_events::{EventBus, EventMetadata, ExecutionEvent};
use loopcore_llm::LlmProvider;
use loopcore_tools::{SubAgentRequest, SubAgentResult, SubAgentSpawner, ToolRegistry};
use tracing::{debug, info, warn};

use crate::context::DEFAULT_COMPRESSION_THRESHOLD;
use crate::engine::{EngineConfig, ExecutionEngine, ToolLoopResult};
use crate::subagent::{SubAgentId, SubAgentPool};

/// Default sub-agent timeout (5 minutes).
pub const DEFAULT_SUBAGENT_TIMEOUT: Duration = Duration::from_secs(300);

/// Spawns sub-agents by building a fresh [`ExecutionEngine`] per call and
/// forwarding its event stream to the parent's bus as [`ExecutionEvent::ToolProgress`].
///
/// Built once per turn and injected into `ToolContext` as
/// `Arc<dyn SubAgentSpawner>` so the `Task` tool can reach it.
pub struct SubAgentExecutor {
    provider: Arc<dyn LlmProvider + Send + Sync>,
    registry: Arc<ToolRegistry>,
    confirm_callback: Option<Arc<dyn ConfirmCallback>>,
    allowlist: Arc<Allowlist>,
    pool: Arc<SubAgentPool>,
    parent_events: EventBus,
    parent_subagent_id: Option<SubAgentId>,
    approval_mode: ApprovalMode,
    workspace_root: PathBuf,
    model_limit: usize,
    max_loops: usize,
    default_timeout: Duration,
}

impl SubAgentExecutor {
    /// Build an executor whose children are scoped under
    /// `parent_subagent_id` (`None` if nothing spawned by this executor has
    /// a sub-agent parent of its own — i.e. this executor itself belongs to
    /// the top-level turn).
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        provider: Arc<dyn LlmProvider + Send + Sync>,
        registry: Arc<ToolRegistry>,
        confirm_callback: Option<Arc<dyn ConfirmCallback>>,
        allowlist: Arc<Allowlist>,
        pool: Arc<SubAgentPool>,
        parent_events: EventBus,
        parent_subagent_id: Option<SubAgentId>,
        approval_mode: ApprovalMode,
        workspace_root: PathBuf,
        model_limit: usize,
    ) -> Self {
        Self {
            provider,
            registry,
            confirm_callback,
            allowlist,
            pool,
            parent_events,
            parent_subagent_id,
            approval_mode,
            workspace_root,
            model_limit,
            max_loops: 50,
            default_timeout: DEFAULT_SUBAGENT_TIMEOUT,
        }
    }

    /// Override the default loop budget given to each spawned sub-agent.
    #[must_use]
    pub fn with_max_loops(mut self, max_loops: usize) -> Self {
        self.max_loops = max_loops;
        self
    }
}

#[async_trait]
impl SubAgentSpawner for SubAgentExecutor {
    #[allow(clippy::too_many_lines)]
    async fn spawn(&self, request: SubAgentRequest) -> Result<SubAgentResult, String> {
        let start = std::time::Instant::now();
        let timeout = request.timeout.unwrap_or(self.default_timeout);

        let handle = self
            .pool
            .spawn(&request.description, self.parent_subagent_id.clone())
            .await
            .map_err(|err| err.to_string())?;
        let handle_id = handle.id.clone();

        info!(subagent_id = %handle.id, depth = handle.depth, description = %request.description, "sub-agent spawned");
        handle.mark_running().await;

        let safe_description =
            if request.description.len() > 200 { format!("{}...", &request.description[..200]) } else { request.description.clone() };
        let system_prompt = format!(
            "You are a focused sub-agent. Your task:\n\n{safe_description}\n\n\
             Complete this task and provide a clear, concise result. \
             Do not ask for clarification — work with what you have. \
             When done, provide your final answer as a clear summary.",
        );

        let child_events = EventBus::new();
        let mut child_receiver = child_events.subscribe();
        let parent_events = self.parent_events.clone();
        let forward_call_id = handle_id.to_string();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = child_receiver.recv().await {
                parent_events.publish(ExecutionEvent::ToolProgress {
                    call_id: forward_call_id.clone(),
                    inner: Box::new((*event).clone()),
                    metadata: EventMetadata::new("subagent"),
                });
            }
        });

        let config = EngineConfig {
            max_loops: self.max_loops,
            model_limit: self.model_limit,
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            enable_tool_summarization: true,
            enable_compression: true,
            approval_mode: self.approval_mode,
            workspace_root: self.workspace_root.clone(),
            session_id: loopcore_core::SessionId::generate().0,
        };

        let mut engine = ExecutionEngine::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.registry),
            self.confirm_callback.clone(),
            Arc::clone(&self.allowlist),
            child_events,
            config,
        );
        engine.set_system_prompt(system_prompt);

        let cancel_token = self.pool.cancellation_token();
        let run_result = tokio::select! {
            biased;
            () = cancel_token.cancelled() => None,
            result = tokio::time::timeout(timeout, engine.run(&request.prompt)) => Some(result),
        };

        let tool_calls = engine.statistics().tool_call_count as usize;
        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = start.elapsed().as_millis() as u64;
        let partial_output = extract_last_assistant_text(&engine.transcript());

        let result = match run_result {
            Some(Ok(ToolLoopResult::Success { content })) => {
                debug!(subagent_id = %handle_id, duration_ms, tool_calls, "sub-agent completed");
                handle.complete(&content).await;
                SubAgentResult { success: true, output: content, duration_ms, tool_calls, error: None }
            },
            Some(Ok(ToolLoopResult::Cancelled { loop_count })) => {
                warn!(subagent_id = %handle_id, duration_ms, loop_count, "sub-agent cancelled mid-run");
                handle.cancel().await;
                SubAgentResult {
                    success: false,
                    output: partial_output,
                    duration_ms,
                    tool_calls,
                    error: Some("sub-agent cancelled".to_string()),
                }
            },
            Some(Ok(ToolLoopResult::ContextOverflow { used, limit })) => {
                let message = format!("context overflow: {used} tokens exceeds limit of {limit}");
                warn!(subagent_id = %handle_id, duration_ms, %message, "sub-agent failed");
                handle.fail(&message).await;
                SubAgentResult { success: false, output: partial_output, duration_ms, tool_calls, error: Some(message) }
            },
            Some(Ok(ToolLoopResult::MaxLoopsExceeded)) => {
                let message = "sub-agent exceeded its loop budget without a final answer".to_string();
                warn!(subagent_id = %handle_id, duration_ms, "sub-agent exhausted loop budget");
                handle.fail(&message).await;
                SubAgentResult { success: false, output: partial_output, duration_ms, tool_calls, error: Some(message) }
            },
            Some(Ok(ToolLoopResult::LlmError(message) | ToolLoopResult::ToolFatalError(message))) => {
                warn!(subagent_id = %handle_id, duration_ms, %message, "sub-agent failed");
                handle.fail(&message).await;
                SubAgentResult { success: false, output: partial_output, duration_ms, tool_calls, error: Some(message) }
            },
            Some(Err(_elapsed)) => {
                let message = format!("sub-agent timed out after {} seconds", timeout.as_secs());
                warn!(subagent_id = %handle_id, duration_ms, "sub-agent timed out");
                handle.timeout().await;
                SubAgentResult { success: false, output: partial_output, duration_ms, tool_calls, error: Some(message) }
            },
            None => {
                warn!(subagent_id = %handle_id, duration_ms, "sub-agent cancelled via pool token");
                handle.cancel().await;
                SubAgentResult {
                    success: false,
                    output: partial_output,
                    duration_ms,
                    tool_calls,
                    error: Some("sub-agent cancelled".to_string()),
                }
            },
        };

        forwarder.abort();
        self.pool.release(&handle_id).await;
        Ok(result)
    }
}

/// Extract the last assistant text message from a transcript, falling back
/// to a placeholder when the sub-agent produced no text (e.g. it was
/// cancelled before its first completion).
fn extract_last_assistant_text(messages: &[Message]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::Assistant && !m.content.is_empty())
        .map(|m| m.content.clone())
        .unwrap_or_else(|| "(sub-agent produced no text output)".to_string())
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait as async_trait_attr;
    use futures::stream;
    use loopcore_llm::{
        LlmResponse, LlmResult, LlmToolDefinition, Message as LlmMessage, StopReason, StreamBox, StreamEvent, Usage,
    };

    use super::*;

    #[test]
    fn extract_last_assistant_text_picks_most_recent_nonempty() {
        let messages = vec![
            Message::user("hello"),
            Message::assistant("first"),
            Message::user("more"),
            Message::assistant("final answer"),
        ];
        assert_eq!(extract_last_assistant_text(&messages), "final answer");
    }

    #[test]
    fn extract_last_assistant_text_falls_back_when_absent() {
        assert_eq!(extract_last_assistant_text(&[]), "(sub-agent produced no text output)");
        assert_eq!(extract_last_assistant_text(&[Message::user("hi")]), "(sub-agent produced no text output)");
    }

    struct OneShotProvider(&'static str);

    #[async_trait_attr]
    impl LlmProvider for OneShotProvider {
        fn name(&self) -> &str {
            "one-shot"
        }

        fn model(&self) -> &str {
            "one-shot-model"
        }

        async fn stream(&self, _messages: &[LlmMessage], _tools: &[LlmToolDefinition], _system: &str) -> LlmResult<StreamBox> {
            let text = self.0;
            Ok(Box::pin(stream::iter(vec![Ok(StreamEvent::TextDelta(text.to_string())), Ok(StreamEvent::Done)])))
        }

        async fn complete(&self, _messages: &[LlmMessage], _tools: &[LlmToolDefinition], _system: &str) -> LlmResult<LlmResponse> {
            Ok(LlmResponse {
                message: LlmMessage::assistant(self.0),
                has_tool_calls: false,
                stop_reason: StopReason::EndTurn,
                usage: Usage { input_tokens: 0, output_tokens: 0 },
            })
        }

        fn max_context_length(&self) -> usize {
            100_000
        }
    }

    #[tokio::test]
    async fn spawn_drives_a_child_engine_to_completion() {
        let executor = SubAgentExecutor::new(
            Arc::new(OneShotProvider("sub-agent result")),
            Arc::new(ToolRegistry::with_defaults()),
            None,
            Arc::new(Allowlist::new()),
            Arc::new(SubAgentPool::new(4, 3)),
            EventBus::new(),
            None,
            ApprovalMode::Yolo,
            std::env::temp_dir(),
            100_000,
        );

        let result = executor
            .spawn(SubAgentRequest { description: "summarize a file".to_string(), prompt: "go".to_string(), timeout: None })
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.output, "sub-agent result");
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn spawn_reports_pool_exhaustion_as_an_error() {
        let pool = Arc::new(SubAgentPool::new(1, 3));
        let _occupying = pool.spawn("busy", None).await.unwrap();

        let executor = SubAgentExecutor::new(
            Arc::new(OneShotProvider("unused")),
            Arc::new(ToolRegistry::with_defaults()),
            None,
            Arc::new(Allowlist::new()),
            pool,
            EventBus::new(),
            None,
            ApprovalMode::Yolo,
            std::env::temp_dir(),
            100_000,
        );

        let result = executor.spawn(SubAgentRequest { description: "overflow".to_string(), prompt: "go".to_string(), timeout: None }).await;
        assert!(result.is_err());
    }
}

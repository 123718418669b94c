//! Drives the bounded reason-act loop: call the LLM, dispatch whatever
//! tools it asked for, feed results back, repeat until a final message,
//! cancellation, overflow, or the loop budget runs out.

use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use loopcore_approval::{ApprovalGate, ApprovalMode, ConfirmCallback};
use loopcore_core::{Message as CoreMessage, MessageRole as CoreMessageRole, ToolCall as CoreToolCall};
use loopcore_events::{EventBus, EventMetadata, ExecutionEvent, ExecutionState, ExecutionStats};
use loopcore_llm::{LlmError, LlmProvider, LlmToolDefinition, Message as LlmMessage, StreamEvent, ToolCall as LlmToolCall};
use loopcore_tools::{SubAgentSpawner, ToolContext, ToolRegistry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::context::Context;
use crate::error::{RuntimeError, RuntimeResult};
use crate::estimator;
use crate::scheduler::ToolScheduler;
use crate::statistics::Statistics;
use crate::summarizer::OutputSummarizer;

/// Outcome of one call to [`ExecutionEngine::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum ToolLoopResult {
    /// The loop produced a final, non-tool-call assistant message.
    Success {
        /// The assistant's final text.
        content: String,
    },
    /// The run was cancelled. `loop_count` is how many reason-act
    /// iterations completed first.
    Cancelled {
        /// Completed iterations before cancellation.
        loop_count: u64,
    },
    /// The context exceeded its token budget and could not be reduced
    /// enough by compression to proceed.
    ContextOverflow {
        /// Tokens the last completion's prompt used.
        used: usize,
        /// Configured limit.
        limit: usize,
    },
    /// The loop ran `max_loops` iterations without reaching a final
    /// message.
    MaxLoopsExceeded,
    /// The LLM provider returned an error that could not be recovered
    /// locally.
    LlmError(String),
    /// A tool infrastructure failure the scheduler could not recover from
    /// locally.
    ToolFatalError(String),
}

/// Construction parameters for an [`ExecutionEngine`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum reason-act iterations before giving up.
    pub max_loops: usize,
    /// Model context-window size, in tokens.
    pub model_limit: usize,
    /// Fraction of `model_limit` at which history compression runs.
    pub compression_threshold: f64,
    /// Whether oversized tool output is summarized via a secondary LLM
    /// call (`false` forces deterministic truncation).
    pub enable_tool_summarization: bool,
    /// Whether the context manager is allowed to compress history when it
    /// crosses `compression_threshold`. Disabling this risks `context_overflow`
    /// on long-running turns but guarantees the model always sees verbatim
    /// history.
    pub enable_compression: bool,
    /// Human-in-the-loop approval policy.
    pub approval_mode: ApprovalMode,
    /// Root directory tools are confined to.
    pub workspace_root: PathBuf,
    /// Identifies this execution's session to tools and events.
    pub session_id: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_loops: 50,
            model_limit: crate::context::DEFAULT_MODEL_LIMIT,
            compression_threshold: crate::context::DEFAULT_COMPRESSION_THRESHOLD,
            enable_tool_summarization: true,
            enable_compression: true,
            approval_mode: ApprovalMode::default(),
            workspace_root: PathBuf::from("."),
            session_id: loopcore_core::SessionId::generate().0,
        }
    }
}

/// Owns one execution's context, scheduler, and statistics, and drives the
/// reason-act loop against a concrete LLM provider.
pub struct ExecutionEngine {
    provider: Arc<dyn LlmProvider + Send + Sync>,
    registry: Arc<ToolRegistry>,
    context: Context,
    scheduler: ToolScheduler,
    events: EventBus,
    statistics: Statistics,
    cancellation_token: CancellationToken,
    cwd: Arc<RwLock<PathBuf>>,
    subagent_spawner: Option<Arc<dyn SubAgentSpawner>>,
    confirm_callback: Option<Arc<dyn ConfirmCallback>>,
    config: EngineConfig,
    turn_started_at: std::time::Instant,
}

impl ExecutionEngine {
    /// Build a new engine over a provider, tool registry, and approval
    /// callback, sharing `events` with whatever else is observing this
    /// execution (e.g. a parent agent, if this is a sub-agent).
    #[must_use]
    pub fn new(
        provider: Arc<dyn LlmProvider + Send + Sync>,
        registry: Arc<ToolRegistry>,
        confirm_callback: Option<Arc<dyn ConfirmCallback>>,
        allowlist: Arc<loopcore_approval::Allowlist>,
        events: EventBus,
        config: EngineConfig,
    ) -> Self {
        let approval_gate = match &confirm_callback {
            Some(callback) => Arc::new(ApprovalGate::with_callback(config.approval_mode, allowlist, Arc::clone(callback))),
            None => Arc::new(ApprovalGate::new(config.approval_mode, allowlist)),
        };
        let tool_confirm_callback = confirm_callback.clone();
        let summarizer = OutputSummarizer::new(config.enable_tool_summarization);
        let scheduler = ToolScheduler::new(Arc::clone(&registry), approval_gate, summarizer);
        let context = Context::new(config.model_limit).with_compression_threshold(config.compression_threshold);
        let cwd = Arc::new(RwLock::new(config.workspace_root.clone()));

        Self {
            provider,
            registry,
            context,
            scheduler,
            events,
            statistics: Statistics::new(),
            cancellation_token: CancellationToken::new(),
            cwd,
            subagent_spawner: None,
            confirm_callback: tool_confirm_callback,
            config,
            turn_started_at: std::time::Instant::now(),
        }
    }

    /// The token this execution watches for cooperative cancellation.
    /// Clone it out to cancel the run from another task.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Register (or clear) the spawner `Task` calls use to run sub-agents.
    pub fn set_subagent_spawner(&mut self, spawner: Option<Arc<dyn SubAgentSpawner>>) {
        self.subagent_spawner = spawner;
    }

    /// Set the system prompt for this execution.
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.context.set_system_prompt(prompt);
    }

    /// Replace history, e.g. when resuming a prior session.
    pub fn load_history(&mut self, messages: Vec<CoreMessage>) {
        self.context.load_history(messages);
    }

    /// Running statistics for this execution so far.
    #[must_use]
    pub fn statistics(&self) -> Statistics {
        self.statistics
    }

    /// Snapshot of everything said so far (history plus the turn in
    /// progress). Callers recover partial output from this after a
    /// cancelled, timed-out, or failed run.
    #[must_use]
    pub fn transcript(&self) -> Vec<CoreMessage> {
        self.context.transcript()
    }

    /// Run the bounded reason-act loop for one user turn.
    pub async fn run(&mut self, user_input: &str) -> ToolLoopResult {
        self.turn_started_at = std::time::Instant::now();
        self.events.publish(ExecutionEvent::ExecutionStart { metadata: EventMetadata::new("engine") });
        self.context.set_user_input(user_input);

        let mut loop_count: u64 = 0;

        loop {
            if self.cancellation_token.is_cancelled() {
                return self.cancel(loop_count);
            }

            if loop_count as usize >= self.config.max_loops {
                self.context.sanitize_current_turn();
                self.events.publish(ExecutionEvent::ExecutionError {
                    message: "max loop count exceeded".to_string(),
                    metadata: EventMetadata::new("engine"),
                });
                return ToolLoopResult::MaxLoopsExceeded;
            }

            self.publish_state(ExecutionState::Thinking);

            let messages = match self
                .context
                .get_context(self.config.enable_compression, self.provider.as_ref(), &self.events)
                .await
            {
                Ok(messages) => messages,
                Err(err) => return self.fatal(err),
            };

            if self.context.is_overflow() {
                let usage = self.context.get_token_usage();
                self.context.sanitize_current_turn();
                return ToolLoopResult::ContextOverflow { used: usage.used, limit: usage.limit };
            }

            let (system, wire_messages) = to_wire_format(&messages);
            let tools = tool_definitions(self.registry.as_ref());

            let stream_result = self.provider.stream(&wire_messages, &tools, &system).await;

            if self.cancellation_token.is_cancelled() {
                return self.cancel(loop_count);
            }

            let mut stream = match stream_result {
                Ok(stream) => stream,
                Err(err) => return self.fatal(RuntimeError::Llm(err)),
            };

            let mut content = String::new();
            let mut reasoning = String::new();
            let mut thinking_started = false;
            let mut tool_calls: Vec<CoreToolCall> = Vec::new();
            let mut pending_call: Option<(String, String, String)> = None;
            let mut input_tokens = 0usize;
            let mut output_tokens = 0usize;

            loop {
                let Some(event) = stream.next().await else { break };
                match event {
                    Ok(StreamEvent::TextDelta(delta)) => {
                        content.push_str(&delta);
                        self.events.publish(ExecutionEvent::ContentDelta { delta, metadata: EventMetadata::new("engine") });
                    },
                    Ok(StreamEvent::ReasoningDelta(delta)) => {
                        if !thinking_started {
                            thinking_started = true;
                            self.events.publish(ExecutionEvent::ThinkingStart { metadata: EventMetadata::new("engine") });
                        }
                        reasoning.push_str(&delta);
                        self.events.publish(ExecutionEvent::ThinkingDelta { delta, metadata: EventMetadata::new("engine") });
                    },
                    Ok(StreamEvent::ToolCallStart { id, name }) => {
                        if let Some((id, name, args)) = pending_call.take() {
                            tool_calls.push(CoreToolCall::new(id, name, args));
                        }
                        pending_call = Some((id, name, String::new()));
                    },
                    Ok(StreamEvent::ToolCallDelta { id, args_delta }) => {
                        if let Some((pending_id, _, args)) = pending_call.as_mut() {
                            if *pending_id == id {
                                args.push_str(&args_delta);
                            }
                        }
                    },
                    Ok(StreamEvent::ToolCallEnd { .. }) => {},
                    Ok(StreamEvent::Usage { input_tokens: i, output_tokens: o }) => {
                        input_tokens = i;
                        output_tokens = o;
                    },
                    Ok(StreamEvent::Done) => break,
                    Ok(StreamEvent::Error(message)) => return self.fatal(RuntimeError::Llm(LlmError::StreamingError(message))),
                    Err(err) => return self.fatal(RuntimeError::Llm(err)),
                }
            }

            if let Some((id, name, args)) = pending_call.take() {
                tool_calls.push(CoreToolCall::new(id, name, args));
            }

            if thinking_started {
                self.events.publish(ExecutionEvent::ThinkingComplete { metadata: EventMetadata::new("engine") });
            }
            self.events.publish(ExecutionEvent::ContentComplete { content: content.clone(), metadata: EventMetadata::new("engine") });

            self.context.update_token_count(input_tokens);
            self.statistics.record_completion(input_tokens as u64, output_tokens as u64);
            self.context.record_cost(crate::statistics::tokens_to_usd(input_tokens, output_tokens));
            self.publish_stats();

            let assistant_message = if tool_calls.is_empty() && reasoning.is_empty() {
                CoreMessage::assistant(content.clone())
            } else {
                CoreMessage::assistant_with_tool_calls(
                    content.clone(),
                    (!reasoning.is_empty()).then(|| reasoning.clone()),
                    tool_calls.clone(),
                )
            };

            self.events.publish(ExecutionEvent::AssistantMessage {
                content: content.clone(),
                tool_calls: tool_calls.clone(),
                metadata: EventMetadata::new("engine"),
            });
            self.context.add_to_current_turn(assistant_message);
            loop_count = loop_count.saturating_add(1);

            if self.cancellation_token.is_cancelled() {
                return self.cancel(loop_count);
            }

            if tool_calls.is_empty() {
                self.context.finish_turn();
                self.publish_state(ExecutionState::Complete);
                self.events.publish(ExecutionEvent::ExecutionComplete { metadata: EventMetadata::new("engine") });
                return ToolLoopResult::Success { content };
            }

            self.publish_state(ExecutionState::ToolExecuting);
            let contexts = self.build_tool_contexts(&tool_calls).await;
            let outcomes = self.scheduler.execute_batch(&tool_calls, contexts, &self.events, self.provider.as_ref()).await;

            for (_, _, message) in &outcomes {
                self.context.add_to_current_turn(message.clone());
            }
            for _ in &outcomes {
                self.statistics.record_tool_call();
            }
            self.publish_stats();

            if self.cancellation_token.is_cancelled() {
                return self.cancel(loop_count);
            }
        }
    }

    async fn build_tool_contexts(&self, calls: &[CoreToolCall]) -> Vec<ToolContext> {
        let mut contexts = Vec::with_capacity(calls.len());
        for call in calls {
            let ctx = ToolContext::with_shared_cwd(
                self.config.workspace_root.clone(),
                Arc::clone(&self.cwd),
                self.config.session_id.clone(),
                call.id.clone(),
                self.cancellation_token.clone(),
                self.config.approval_mode,
                self.scheduler_confirm_callback(),
            );
            ctx.set_subagent_spawner(self.subagent_spawner.clone()).await;
            contexts.push(ctx);
        }
        contexts
    }

    /// The confirmation callback each call's `ToolContext` is built with, so
    /// a tool handler that wants to ask its own follow-up question (as
    /// opposed to the Scheduler's own approval-gate prompt) can reach the
    /// same UI the engine was constructed with.
    fn scheduler_confirm_callback(&self) -> Option<Arc<dyn ConfirmCallback>> {
        self.confirm_callback.clone()
    }

    fn publish_state(&self, state: ExecutionState) {
        let phrase = loopcore_events::phrase_vocabulary_for(state).first().copied().unwrap_or("working...").to_string();
        self.events.publish(ExecutionEvent::StateChange { state, phrase, metadata: EventMetadata::new("engine") });
    }

    fn publish_stats(&self) {
        let stats = &self.statistics;
        #[allow(clippy::cast_possible_truncation)]
        let elapsed_ms = self.turn_started_at.elapsed().as_millis() as u64;
        let snapshot_stats = ExecutionStats {
            elapsed_ms,
            input_tokens: stats.input_tokens,
            output_tokens: stats.output_tokens,
            total_tokens: stats.total_tokens(),
            tool_call_count: stats.tool_call_count,
            loop_count: stats.loop_count,
        };
        self.events.publish(ExecutionEvent::StatsUpdate {
            stats: snapshot_stats,
            total_cost_usd: Some(stats.cost_usd),
            metadata: EventMetadata::new("engine"),
        });
    }

    fn cancel(&mut self, loop_count: u64) -> ToolLoopResult {
        self.context.sanitize_current_turn();
        self.publish_state(ExecutionState::Cancelled);
        self.events.publish(ExecutionEvent::ExecutionCancel { metadata: EventMetadata::new("engine") });
        ToolLoopResult::Cancelled { loop_count }
    }

    fn fatal(&mut self, err: RuntimeError) -> ToolLoopResult {
        self.context.sanitize_current_turn();
        self.publish_state(ExecutionState::Error);
        self.events.publish(ExecutionEvent::ExecutionError { message: err.to_string(), metadata: EventMetadata::new("engine") });
        match err {
            RuntimeError::Llm(llm_err) => ToolLoopResult::LlmError(llm_err.to_string()),
            RuntimeError::Tool(tool_err) => ToolLoopResult::ToolFatalError(tool_err.to_string()),
            other => ToolLoopResult::LlmError(other.to_string()),
        }
    }
}

/// Split an assembled domain-level context into the provider's expected
/// shape: a single leading system string plus a wire-format message list.
/// A synthetic compression checkpoint (also `System`-role, but not first)
/// is folded in as a user-visible summary rather than a second system
/// message, since most providers only accept one.
fn to_wire_format(messages: &[CoreMessage]) -> (String, Vec<LlmMessage>) {
    let mut system = String::new();
    let mut out = Vec::with_capacity(messages.len());

    for (index, message) in messages.iter().enumerate() {
        match message.role {
            CoreMessageRole::System if index == 0 => system = message.content.clone(),
            CoreMessageRole::System => out.push(LlmMessage::user(format!("[context summary]\n{}", message.content))),
            CoreMessageRole::User => out.push(LlmMessage::user(message.content.clone())),
            CoreMessageRole::Assistant => {
                if let Some(calls) = &message.tool_calls {
                    if !calls.is_empty() {
                        let wire_calls = calls
                            .iter()
                            .map(|call| {
                                let args: Value = serde_json::from_str(&call.raw_arguments).unwrap_or(Value::Null);
                                LlmToolCall::new(call.id.clone(), call.name.clone()).with_arguments(args)
                            })
                            .collect();
                        out.push(LlmMessage::assistant_with_tools(wire_calls));
                        continue;
                    }
                }
                out.push(LlmMessage::assistant(message.content.clone()));
            },
            CoreMessageRole::Tool => {
                let call_id = message.tool_call_id.clone().unwrap_or_default();
                out.push(LlmMessage::tool_result(loopcore_llm::ToolCallResult::success(call_id, message.content.clone())));
            },
        }
    }

    (system, out)
}

fn tool_definitions(registry: &ToolRegistry) -> Vec<LlmToolDefinition> {
    registry
        .iter()
        .map(|tool| LlmToolDefinition::new(tool.name()).with_description(tool.description()).with_schema(tool.input_schema()))
        .collect()
}

//! Agent Facade — the thin composition root most callers reach for.
//!
//! Wires a concrete LLM provider, a shared tool registry, and a fresh
//! [`ExecutionEngine`] per call behind one long-lived handle. Conversation
//! history is the facade's to own; the engine only borrows a copy of it for
//! the duration of one `run()`.

use std::path::PathBuf;
use std::sync::Arc;

use loopcore_approval::{Allowlist, ApprovalMode, ConfirmCallback};
use loopcore_core::{Message, MessageRole};
use loopcore_events::EventBus;
use loopcore_llm::{ClaudeProvider, LlmProvider, OpenAiCompatProvider, ProviderConfig};
use loopcore_tools::ToolRegistry;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::context::{DEFAULT_COMPRESSION_THRESHOLD, DEFAULT_MODEL_LIMIT};
use crate::engine::{EngineConfig, ExecutionEngine, ToolLoopResult};
use crate::error::{RuntimeError, RuntimeResult};
use crate::statistics::Statistics;
use crate::subagent::SubAgentPool;
use crate::subagent_executor::SubAgentExecutor;

/// Default maximum concurrent sub-agents.
const DEFAULT_MAX_CONCURRENT_SUBAGENTS: usize = 4;
/// Default maximum sub-agent nesting depth.
const DEFAULT_MAX_SUBAGENT_DEPTH: usize = 3;

/// Which concrete LLM backend an [`Agent`] should talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Anthropic's Claude Messages API.
    Claude,
    /// Any OpenAI-compatible chat-completions endpoint (OpenAI itself, a
    /// local LM Studio instance, or a self-hosted gateway).
    OpenAiCompat,
}

/// Configuration for an [`Agent`].
///
/// Mirrors the external configuration surface: provider selection, model
/// identity, credentials, the system prompt, and the per-run budgets an
/// [`ExecutionEngine`] understands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Which backend `init()` should build.
    pub provider: ProviderKind,
    /// Model identifier passed to the provider.
    pub model: String,
    /// API key. Required for `Claude`; optional for `OpenAiCompat` (a local
    /// server may need none).
    pub api_key: Option<String>,
    /// Override endpoint. Required for `OpenAiCompat` unless the default
    /// OpenAI or LM Studio endpoint is wanted.
    pub base_url: Option<String>,
    /// System prompt prepended to every run.
    pub system_prompt: String,
    /// Maximum reason-act iterations per `run()` call.
    pub max_loops: usize,
    /// Token budget the context manager compresses against.
    pub model_limit: usize,
    /// Fraction of `model_limit` that triggers compression.
    pub compression_threshold: f64,
    /// Whether the context manager may compress history at all.
    pub enable_compression: bool,
    /// Whether oversized tool output is summarized by the LLM before
    /// re-entering context.
    pub enable_tool_summarization: bool,
    /// Human-in-the-loop approval policy.
    pub approval_mode: ApprovalMode,
    /// Root directory tool calls and sub-agents are confined to.
    pub working_directory: PathBuf,
    /// Maximum concurrently running sub-agents.
    pub max_concurrent_subagents: usize,
    /// Maximum sub-agent nesting depth.
    pub max_subagent_depth: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Claude,
            model: String::new(),
            api_key: None,
            base_url: None,
            system_prompt: String::new(),
            max_loops: 50,
            model_limit: DEFAULT_MODEL_LIMIT,
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            enable_compression: true,
            enable_tool_summarization: true,
            approval_mode: ApprovalMode::default(),
            working_directory: PathBuf::from("."),
            max_concurrent_subagents: DEFAULT_MAX_CONCURRENT_SUBAGENTS,
            max_subagent_depth: DEFAULT_MAX_SUBAGENT_DEPTH,
        }
    }
}

/// Per-call overrides that don't belong to the Agent's standing configuration.
#[derive(Default)]
pub struct RunOptions {
    /// Event bus to publish this run's events on. A subscriber registered
    /// before the run starts observes it live; if omitted, a bus is created
    /// and discarded once the run completes.
    pub events: Option<EventBus>,
    /// Lets the caller cancel this specific run without tearing down the
    /// `Agent`. If omitted, the run cannot be cancelled externally.
    pub cancellation_token: Option<CancellationToken>,
}

/// Options controlling how [`Agent::load_history`] merges prior messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadHistoryOptions {
    /// Drop `system`-role messages from the incoming history; the Agent's
    /// own `system_prompt` is always used instead.
    pub drop_system_messages: bool,
    /// Keep only the most recent `N` messages (after any system-message
    /// filtering).
    pub max_messages: Option<usize>,
}

/// Outcome of one [`Agent::run`] call.
#[derive(Debug, Clone)]
pub struct AgentResult {
    /// Final assistant text, present only on [`ToolLoopResult::Success`].
    pub content: Option<String>,
    /// The engine's raw termination reason.
    pub loop_result: ToolLoopResult,
    /// Token/cost/tool-call counters accumulated during the run.
    pub statistics: Statistics,
}

/// Thin composition root: one provider, one tool registry, one approval
/// policy, wired into a fresh [`ExecutionEngine`] for every `run()` call.
/// History persists on the `Agent` across calls even though each run owns
/// its own transient `Context`.
pub struct Agent {
    config: AgentConfig,
    provider: Option<Arc<dyn LlmProvider + Send + Sync>>,
    registry: Arc<ToolRegistry>,
    allowlist: Arc<Allowlist>,
    confirm_callback: Option<Arc<dyn ConfirmCallback>>,
    subagent_pool: Arc<SubAgentPool>,
    history: Vec<Message>,
}

impl Agent {
    /// Create an uninitialized agent. Call [`Agent::init`] before [`Agent::run`].
    #[must_use]
    pub fn new(config: AgentConfig) -> Self {
        let subagent_pool = Arc::new(SubAgentPool::new(
            config.max_concurrent_subagents,
            config.max_subagent_depth,
        ));
        Self {
            config,
            provider: None,
            registry: Arc::new(ToolRegistry::with_defaults()),
            allowlist: Arc::new(Allowlist::new()),
            confirm_callback: None,
            subagent_pool,
            history: Vec::new(),
        }
    }

    /// Register the callback invoked when a tool call needs human approval.
    #[must_use]
    pub fn with_confirm_callback(mut self, callback: Arc<dyn ConfirmCallback>) -> Self {
        self.confirm_callback = Some(callback);
        self
    }

    /// Use a caller-supplied tool registry instead of the built-in default set.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Build the LLM client from `config`. Must be called (and succeed)
    /// before [`Agent::run`].
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Config`] if a required credential or endpoint
    /// is missing for the selected provider.
    pub fn init(&mut self) -> RuntimeResult<()> {
        self.provider = Some(build_provider(&self.config)?);
        Ok(())
    }

    /// Swap the active model, rebuilding the LLM client, while keeping
    /// conversation history intact.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Config`] under the same conditions as `init`.
    pub fn set_model(&mut self, provider: ProviderKind, model: impl Into<String>) -> RuntimeResult<()> {
        self.config.provider = provider;
        self.config.model = model.into();
        self.init()
    }

    /// Replace accumulated history, e.g. when resuming a prior session.
    pub fn load_history(&mut self, messages: Vec<Message>, options: LoadHistoryOptions) {
        let mut messages = messages;
        if options.drop_system_messages {
            messages.retain(|m| m.role != MessageRole::System);
        }
        if let Some(max) = options.max_messages
            && messages.len() > max
        {
            let drop = messages.len() - max;
            messages.drain(..drop);
        }
        self.history = messages;
    }

    /// Drop all history, retaining only the configured system prompt for
    /// the next run.
    pub fn clear_context(&mut self) {
        self.history.clear();
    }

    /// Current accumulated history (read-only snapshot).
    #[must_use]
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Run one turn: builds a fresh event bus (unless supplied) and engine,
    /// replays accumulated history into it, drives the reason-act loop for
    /// `user_input`, then folds the resulting transcript back into history.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Config`] if [`Agent::init`] was never called.
    pub async fn run(&mut self, user_input: &str, options: RunOptions) -> RuntimeResult<AgentResult> {
        let provider = self
            .provider
            .clone()
            .ok_or_else(|| RuntimeError::Config("Agent::init must be called before run".to_string()))?;

        let events = options.events.unwrap_or_default();

        let engine_config = EngineConfig {
            max_loops: self.config.max_loops,
            model_limit: self.config.model_limit,
            compression_threshold: self.config.compression_threshold,
            enable_tool_summarization: self.config.enable_tool_summarization,
            enable_compression: self.config.enable_compression,
            approval_mode: self.config.approval_mode,
            workspace_root: self.config.working_directory.clone(),
            session_id: loopcore_core::SessionId::generate().0,
        };

        let mut engine = ExecutionEngine::new(
            Arc::clone(&provider),
            Arc::clone(&self.registry),
            self.confirm_callback.clone(),
            Arc::clone(&self.allowlist),
            events,
            engine_config,
        );

        if let Some(token) = options.cancellation_token {
            let engine_token = engine.cancellation_token();
            tokio::spawn(async move {
                token.cancelled().await;
                engine_token.cancel();
            });
        }

        engine.set_system_prompt(self.config.system_prompt.clone());
        engine.load_history(self.history.clone());

        let executor = SubAgentExecutor::new(
            Arc::clone(&provider),
            Arc::clone(&self.registry),
            self.confirm_callback.clone(),
            Arc::clone(&self.allowlist),
            Arc::clone(&self.subagent_pool),
            EventBus::new(),
            None,
            self.config.approval_mode,
            self.config.working_directory.clone(),
            self.config.model_limit,
        );
        engine.set_subagent_spawner(Some(Arc::new(executor)));

        let loop_result = engine.run(user_input).await;
        let statistics = engine.statistics();
        self.history = engine.transcript();

        let content = match &loop_result {
            ToolLoopResult::Success { content } => Some(content.clone()),
            _ => None,
        };

        Ok(AgentResult { content, loop_result, statistics })
    }
}

/// Build the concrete LLM client named by `config.provider`.
fn build_provider(config: &AgentConfig) -> RuntimeResult<Arc<dyn LlmProvider + Send + Sync>> {
    match config.provider {
        ProviderKind::Claude => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                RuntimeError::Config("Claude provider requires an api_key".to_string())
            })?;
            let mut provider_config =
                ProviderConfig::new(api_key, config.model.clone()).context_window(config.model_limit);
            if let Some(base_url) = &config.base_url {
                provider_config = provider_config.base_url(base_url.clone());
            }
            Ok(Arc::new(ClaudeProvider::new(provider_config)))
        },
        ProviderKind::OpenAiCompat => {
            let provider = match (&config.api_key, &config.base_url) {
                (Some(key), Some(url)) => OpenAiCompatProvider::custom(url, Some(key), &config.model),
                (None, Some(url)) => OpenAiCompatProvider::custom(url, None, &config.model),
                (Some(key), None) => OpenAiCompatProvider::openai(key, &config.model),
                (None, None) => OpenAiCompatProvider::lm_studio_with_model(&config.model),
            }
            .with_max_context(config.model_limit);
            Ok(Arc::new(provider))
        },
    }
}

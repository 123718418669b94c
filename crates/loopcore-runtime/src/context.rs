//! Owns the message history for one execution: system prompt, prior turns,
//! the turn currently being built, and the token-budget accounting that
//! decides when history needs to be compressed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loopcore_core::{Message, MessageRole};
use loopcore_events::{EventBus, EventMetadata, ExecutionEvent};
use loopcore_llm::LlmProvider;

use crate::estimator::estimate_sequence_tokens;
use crate::error::RuntimeResult;

/// Default fraction of `model_limit` at which compression kicks in.
pub const DEFAULT_COMPRESSION_THRESHOLD: f64 = 0.8;

/// Default token budget assumed when a caller doesn't know the model's
/// actual context window.
pub const DEFAULT_MODEL_LIMIT: usize = 64_000;

/// Most recent messages that are never folded into a compression summary,
/// so the model keeps verbatim access to the immediate conversation.
const KEEP_RECENT_MESSAGES: usize = 6;

/// `name` tag stamped on the synthetic system message a compression pass
/// produces, so a later compression pass can recognize it and skip
/// re-summarizing an already-summarized prefix.
const CHECKPOINT_TAG: &str = "__context_checkpoint__";

const COMPRESSION_INSTRUCTION: &str = "Summarize the following conversation history into a compact briefing \
     that preserves: the user's original goal, key decisions made, files touched, and any unresolved \
     questions. This summary replaces the messages below in the context sent to the model.\n\nHistory:\n\n";

/// A persisted compression checkpoint.
///
/// The runtime has no opinion on how or where this is stored; callers that
/// want durability register a [`CheckpointSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    /// The summary text that replaced the compressed messages.
    pub summary_text: String,
    /// Index into the pre-compression history after which this checkpoint
    /// should be reloaded (i.e. how many leading messages it replaces).
    pub load_after_message_id: usize,
    /// When the checkpoint was created.
    pub created_at: DateTime<Utc>,
    /// Running cost in USD at the time compression ran.
    pub cumulative_cost: f64,
}

/// Receives checkpoints as they are produced. Storage format and transport
/// are entirely up to the implementor.
#[async_trait]
pub trait CheckpointSink: Send + Sync {
    /// Persist one checkpoint. Failures are logged by the caller and never
    /// abort the run.
    async fn save(&self, checkpoint: &Checkpoint);
}

/// Current token usage relative to the configured budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenUsage {
    /// Tokens used by the last assembled context.
    pub used: usize,
    /// Configured model context-window limit.
    pub limit: usize,
    /// `used / limit`, as a fraction (not a percentage despite the name
    /// used elsewhere in this ecosystem for the same ratio).
    pub percentage: f64,
}

/// Owns system prompt, history, and the in-progress turn for one execution,
/// and decides when that history needs compressing to stay under budget.
pub struct Context {
    system_prompt: String,
    history: Vec<Message>,
    current_turn: Vec<Message>,
    last_prompt_tokens: usize,
    model_limit: usize,
    compression_threshold: f64,
    cumulative_cost_usd: f64,
}

impl Context {
    /// Build a context for a model with the given context-window size.
    #[must_use]
    pub fn new(model_limit: usize) -> Self {
        Self {
            system_prompt: String::new(),
            history: Vec::new(),
            current_turn: Vec::new(),
            last_prompt_tokens: 0,
            model_limit,
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            cumulative_cost_usd: 0.0,
        }
    }

    /// Override the compression threshold (fraction of `model_limit`).
    #[must_use]
    pub fn with_compression_threshold(mut self, threshold: f64) -> Self {
        self.compression_threshold = threshold;
        self
    }

    /// Replace the system prompt.
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = prompt.into();
    }

    /// Append the user's input to the turn currently being built.
    pub fn set_user_input(&mut self, content: impl Into<String>) {
        self.current_turn.push(Message::user(content));
    }

    /// Append an arbitrary message (assistant reply, tool result) to the
    /// turn currently being built.
    pub fn add_to_current_turn(&mut self, message: Message) {
        self.current_turn.push(message);
    }

    /// Move the in-progress turn into history and start a fresh one.
    pub fn finish_turn(&mut self) {
        self.history.append(&mut self.current_turn);
    }

    /// Drop all history and the in-progress turn, keeping the system prompt.
    pub fn clear(&mut self) {
        self.history.clear();
        self.current_turn.clear();
        self.last_prompt_tokens = 0;
    }

    /// Replace history wholesale, e.g. when resuming a prior session.
    pub fn load_history(&mut self, messages: Vec<Message>) {
        self.history = messages;
    }

    /// Snapshot of history plus the in-progress turn, in order. Used to
    /// recover partial output after a cancelled or failed run.
    #[must_use]
    pub fn transcript(&self) -> Vec<Message> {
        let mut all = Vec::with_capacity(self.history.len() + self.current_turn.len());
        all.extend(self.history.iter().cloned());
        all.extend(self.current_turn.iter().cloned());
        all
    }

    /// Drop trailing assistant messages whose tool calls were never
    /// answered, leaving the turn safe to send to the LLM or fold into
    /// history after a cancellation.
    pub fn sanitize_current_turn(&mut self) {
        while let Some(last) = self.current_turn.last() {
            if last.role == MessageRole::Assistant && !last.tool_call_ids().is_empty() {
                self.current_turn.pop();
            } else {
                break;
            }
        }
    }

    /// Record the token count the provider reported using for the last
    /// completion. Providers' own counts are always trusted over the
    /// estimator.
    pub fn update_token_count(&mut self, tokens: usize) {
        self.last_prompt_tokens = tokens;
    }

    /// Whether the last reported prompt token count already exceeds the
    /// configured limit.
    #[must_use]
    pub fn is_overflow(&self) -> bool {
        self.last_prompt_tokens > self.model_limit
    }

    /// Current usage relative to the configured limit.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn get_token_usage(&self) -> TokenUsage {
        TokenUsage {
            used: self.last_prompt_tokens,
            limit: self.model_limit,
            percentage: self.last_prompt_tokens as f64 / self.model_limit.max(1) as f64,
        }
    }

    /// Assemble the message sequence to send to the LLM: system prompt,
    /// then history, then the in-progress turn. When `enable_compression`
    /// is set and estimated usage has crossed the compression threshold,
    /// history is compressed first.
    ///
    /// # Errors
    ///
    /// Returns an error if the compression pass's secondary LLM call fails.
    pub async fn get_context(
        &mut self,
        enable_compression: bool,
        provider: &(dyn LlmProvider + Send + Sync),
        events: &EventBus,
    ) -> RuntimeResult<Vec<Message>> {
        if enable_compression && self.should_compress() {
            self.compress(provider, events, None).await?;
        }

        let mut messages = Vec::with_capacity(self.history.len() + self.current_turn.len() + 1);
        if !self.system_prompt.is_empty() {
            messages.push(Message::system(self.system_prompt.clone()));
        }
        messages.extend(self.history.iter().cloned());
        messages.extend(self.current_turn.iter().cloned());
        Ok(messages)
    }

    /// Estimated usage, preferring the provider's last reported count over
    /// the character heuristic whenever one is available.
    fn estimated_usage_tokens(&self) -> usize {
        if self.last_prompt_tokens > 0 {
            self.last_prompt_tokens
        } else {
            let mut all = Vec::with_capacity(self.history.len() + self.current_turn.len() + 1);
            if !self.system_prompt.is_empty() {
                all.push(Message::system(self.system_prompt.clone()));
            }
            all.extend(self.history.iter().cloned());
            all.extend(self.current_turn.iter().cloned());
            estimate_sequence_tokens(&all)
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn should_compress(&self) -> bool {
        let usage = self.estimated_usage_tokens();
        usage as f64 >= self.compression_threshold * self.model_limit as f64
    }

    /// Fold the oldest portion of history (short of the most recent
    /// [`KEEP_RECENT_MESSAGES`]) into a single synthetic summary message.
    ///
    /// Idempotent: if the oldest portion is already a single checkpoint
    /// message, this is a no-op.
    async fn compress(
        &mut self,
        provider: &(dyn LlmProvider + Send + Sync),
        events: &EventBus,
        sink: Option<&dyn CheckpointSink>,
    ) -> RuntimeResult<()> {
        if self.history.len() <= KEEP_RECENT_MESSAGES {
            return Ok(());
        }

        let split = self.history.len() - KEEP_RECENT_MESSAGES;
        let to_summarize = &self.history[..split];

        if to_summarize.len() == 1 && is_checkpoint(&to_summarize[0]) {
            return Ok(());
        }

        let before_tokens = estimate_sequence_tokens(&self.history);
        events.publish(ExecutionEvent::CompressionStart { before_tokens, metadata: EventMetadata::new("context") });

        let transcript = render_transcript(to_summarize);
        let prompt = format!("{COMPRESSION_INSTRUCTION}{transcript}");
        let summary_text = provider.complete_simple(&prompt).await?;

        let checkpoint_message = Message {
            role: MessageRole::System,
            content: summary_text.clone(),
            reasoning_content: None,
            tool_calls: None,
            tool_call_id: None,
            name: Some(CHECKPOINT_TAG.to_string()),
        };

        let mut new_history = Vec::with_capacity(1 + KEEP_RECENT_MESSAGES);
        new_history.push(checkpoint_message);
        new_history.extend_from_slice(&self.history[split..]);
        self.history = new_history;

        let after_tokens = estimate_sequence_tokens(&self.history);
        events.publish(ExecutionEvent::CompressionComplete {
            before_tokens,
            after_tokens,
            metadata: EventMetadata::new("context"),
        });

        if let Some(sink) = sink {
            let checkpoint = Checkpoint {
                summary_text,
                load_after_message_id: split,
                created_at: Utc::now(),
                cumulative_cost: self.cumulative_cost_usd,
            };
            sink.save(&checkpoint).await;
        }

        Ok(())
    }

    /// Record cost accrued so future checkpoints carry an accurate running
    /// total.
    pub fn record_cost(&mut self, cost_usd: f64) {
        self.cumulative_cost_usd += cost_usd;
    }
}

fn is_checkpoint(message: &Message) -> bool {
    message.role == MessageRole::System && message.name.as_deref() == Some(CHECKPOINT_TAG)
}

fn render_transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        let role = match message.role {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        };
        out.push_str(role);
        out.push_str(": ");
        out.push_str(&message.content);
        out.push('\n');
    }
    out
}

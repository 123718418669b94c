//! Shrinks oversized tool outputs via a secondary LLM completion, or
//! deterministic head-tail truncation when that is disabled or fails.

use loopcore_llm::LlmProvider;

use crate::estimator::estimate_tokens;

/// Token threshold above which a tool output is summarized or truncated.
pub const DEFAULT_SUMMARIZE_THRESHOLD_TOKENS: usize = 2_000;

/// Fixed instruction given to the secondary completion. Kept short and
/// explicit about what must survive condensation.
const SUMMARIZE_INSTRUCTION: &str = "Summarize the following tool output. Preserve any error messages, \
     file paths, and line numbers, and any other key data. Remove duplicated log lines and compress long \
     lists. Keep the summary compact but do not drop errors or warnings.\n\nTool output:\n\n";

/// Outcome of summarizing one tool output.
#[derive(Debug, Clone, PartialEq)]
pub struct SummarizeOutcome {
    /// The (possibly condensed) output to append to the context.
    pub output: String,
    /// Whether a secondary LLM completion was used.
    pub summarized: bool,
    /// Whether deterministic truncation was used instead (mutually
    /// exclusive with `summarized`).
    pub truncated: bool,
    /// Estimated token count of the original output.
    pub original_tokens: usize,
    /// Estimated token count of the returned output.
    pub processed_tokens: usize,
}

/// Shrinks an oversized tool output.
///
/// `enable_tool_summarization = false` forces head-tail truncation
/// unconditionally, skipping the secondary LLM call entirely.
pub struct OutputSummarizer {
    threshold_tokens: usize,
    enable_tool_summarization: bool,
}

impl OutputSummarizer {
    /// Build a summarizer with the default threshold.
    #[must_use]
    pub fn new(enable_tool_summarization: bool) -> Self {
        Self { threshold_tokens: DEFAULT_SUMMARIZE_THRESHOLD_TOKENS, enable_tool_summarization }
    }

    /// Build a summarizer with an explicit threshold (used by tests and
    /// callers tuning the default for a particular model's context window).
    #[must_use]
    pub fn with_threshold(enable_tool_summarization: bool, threshold_tokens: usize) -> Self {
        Self { threshold_tokens, enable_tool_summarization }
    }

    /// Summarize one tool's output if it exceeds the configured threshold.
    pub async fn summarize(
        &self,
        tool_name: &str,
        output: &str,
        provider: &(dyn LlmProvider + Send + Sync),
    ) -> SummarizeOutcome {
        let original_tokens = estimate_tokens(output);

        if original_tokens <= self.threshold_tokens {
            return SummarizeOutcome {
                output: output.to_string(),
                summarized: false,
                truncated: false,
                original_tokens,
                processed_tokens: original_tokens,
            };
        }

        if self.enable_tool_summarization {
            let prompt = format!("{SUMMARIZE_INSTRUCTION}{output}");
            if let Ok(summary) = provider.complete_simple(&prompt).await {
                let processed_tokens = estimate_tokens(&summary);
                tracing::debug!(tool = tool_name, original_tokens, processed_tokens, "summarized tool output");
                return SummarizeOutcome { output: summary, summarized: true, truncated: false, original_tokens, processed_tokens };
            }
            tracing::warn!(tool = tool_name, "secondary completion failed, falling back to truncation");
        }

        let truncated = head_tail_truncate(output, self.threshold_tokens);
        let processed_tokens = estimate_tokens(&truncated);
        SummarizeOutcome { output: truncated, summarized: false, truncated: true, original_tokens, processed_tokens }
    }
}

/// Keep the first half and last half of `text` (by character budget derived
/// from `threshold_tokens`), with a visible truncation marker in between.
/// Errors and warnings near the start or end of a tool's output survive this
/// unconditionally; only the interior is ever dropped.
fn head_tail_truncate(text: &str, threshold_tokens: usize) -> String {
    let budget_chars = threshold_tokens.saturating_mul(4);
    if text.len() <= budget_chars {
        return text.to_string();
    }

    let half = budget_chars / 2;
    let head_end = loopcore_tools::truncate_at_char_boundary(text, half);
    let tail_start_byte = text.len().saturating_sub(half);
    let tail = loopcore_tools::truncate_at_char_boundary(&text[tail_start_byte..], half);
    let removed = text.len().saturating_sub(head_end.len()).saturating_sub(tail.len());

    format!("{head_end}\n\n… [truncated {removed} chars] …\n\n{tail}")
}

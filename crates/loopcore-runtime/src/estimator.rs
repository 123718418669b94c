//! Pure, cheap token-count heuristic used for budget decisions.
//!
//! The estimate is advisory: the context manager trusts the provider's
//! reported `last_prompt_tokens` over this function whenever one is
//! available (see [`crate::context::Context::update_token_count`]), falling
//! back to it only to decide whether compression should run *before* the
//! next completion.

use loopcore_core::{Message, MessageRole};

/// Flat per-message overhead added on top of the character-based estimate,
/// approximating role/delimiter tokens a real tokenizer would spend on
/// message framing.
const PER_MESSAGE_OVERHEAD: usize = 4;

/// Characters per token for content that is predominantly ASCII.
const ASCII_CHARS_PER_TOKEN: f64 = 4.0;

/// Characters per token for content that is predominantly CJK.
const CJK_CHARS_PER_TOKEN: f64 = 1.8;

/// Fraction of non-ASCII characters above which a string is treated as
/// CJK-dominant for the purposes of this heuristic.
const CJK_THRESHOLD: f64 = 0.3;

/// Estimate the token count of a single string.
///
/// Monotonic in string length and O(n) in characters: every character is
/// visited once to classify the string, then the estimate is a single
/// division. Mixed ASCII/CJK content is classified by whichever script
/// makes up the larger share of characters.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }

    let total_chars = text.chars().count();
    let non_ascii = text.chars().filter(|c| !c.is_ascii()).count();
    let non_ascii_ratio = non_ascii as f64 / total_chars as f64;

    let chars_per_token = if non_ascii_ratio >= CJK_THRESHOLD {
        CJK_CHARS_PER_TOKEN
    } else {
        ASCII_CHARS_PER_TOKEN
    };

    (total_chars as f64 / chars_per_token).ceil() as usize
}

/// Estimate the token count of a full message sequence, including the flat
/// per-message overhead and the (rough) weight of any tool calls an
/// assistant message carries.
#[must_use]
pub fn estimate_message_tokens(message: &Message) -> usize {
    let mut total = estimate_tokens(&message.content).saturating_add(PER_MESSAGE_OVERHEAD);

    if let Some(reasoning) = &message.reasoning_content {
        total = total.saturating_add(estimate_tokens(reasoning));
    }

    if let Some(tool_calls) = &message.tool_calls {
        for call in tool_calls {
            total = total
                .saturating_add(estimate_tokens(&call.name))
                .saturating_add(estimate_tokens(&call.raw_arguments))
                .saturating_add(PER_MESSAGE_OVERHEAD);
        }
    }

    total
}

/// Estimate the total token count of an ordered message sequence.
#[must_use]
pub fn estimate_sequence_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).fold(0, usize::saturating_add)
}

/// Whether a message carries content worth estimating at all (used by
/// callers that want to skip system-role scaffolding messages in a rough
/// preview).
#[must_use]
pub fn is_substantive(message: &Message) -> bool {
    !message.content.is_empty() || message.tool_calls.is_some() || message.role == MessageRole::Tool
}

#[cfg(test)]
mod tests {
    use loopcore_core::ToolCall;

    use super::*;

    #[test]
    fn empty_string_is_zero_tokens() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn ascii_uses_four_chars_per_token() {
        let text = "x".repeat(40);
        assert_eq!(estimate_tokens(&text), 10);
    }

    #[test]
    fn cjk_dominant_text_uses_fewer_chars_per_token() {
        let text = "中".repeat(40);
        let ascii_equivalent_len = 40;
        assert!(estimate_tokens(&text) > ascii_equivalent_len / 4);
    }

    #[test]
    fn monotonic_under_concatenation() {
        let a = "hello world, this is a test string";
        let b = format!("{a}{a}");
        assert!(estimate_tokens(&b) >= estimate_tokens(a));
    }

    #[test]
    fn message_tokens_include_overhead() {
        let message = Message::user("hi");
        assert!(estimate_message_tokens(&message) > estimate_tokens("hi"));
    }

    #[test]
    fn message_tokens_include_tool_calls() {
        let message =
            Message::assistant_with_tool_calls("", None, vec![ToolCall::new("call_1", "bash", r#"{"cmd":"ls"}"#)]);
        let without_content = estimate_message_tokens(&Message::assistant(""));
        assert!(estimate_message_tokens(&message) > without_content);
    }

    #[test]
    fn sequence_tokens_sum_every_message() {
        let messages = vec![Message::system("be helpful"), Message::user("hello"), Message::assistant("hi there")];
        let expected: usize = messages.iter().map(estimate_message_tokens).sum();
        assert_eq!(estimate_sequence_tokens(&messages), expected);
    }

    #[test]
    fn is_substantive_recognizes_tool_results() {
        let msg = Message::tool_result("call_1", "bash", "");
        assert!(is_substantive(&msg));
    }
}

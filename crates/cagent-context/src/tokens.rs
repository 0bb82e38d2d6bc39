use cagent_core::ChatMessage;

/// Per-message framing overhead added on top of content length, modeling
/// the role/delimiter tokens a real tokenizer would also count.
const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Heuristic token estimate: `ceil(chars / 4)`. Not a real tokenizer —
/// good enough to budget context windows without depending on a
/// model-specific vocabulary.
pub fn estimate_tokens(text: &str) -> usize {
    let chars = text.chars().count();
    chars.div_ceil(4)
}

pub fn estimate_message_tokens(message: &ChatMessage) -> usize {
    estimate_tokens(&message.content) + MESSAGE_OVERHEAD_TOKENS
}

pub fn estimate_history_tokens(history: &[ChatMessage]) -> usize {
    history.iter().map(estimate_message_tokens).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cagent_core::ChatMessage;

    #[test]
    fn estimate_rounds_up() {
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn message_estimate_includes_overhead() {
        let msg = ChatMessage::user("abcd");
        assert_eq!(estimate_message_tokens(&msg), 1 + MESSAGE_OVERHEAD_TOKENS);
    }

    #[test]
    fn history_estimate_sums_messages() {
        let history = vec![ChatMessage::user("abcd"), ChatMessage::assistant("abcd")];
        assert_eq!(estimate_history_tokens(&history), 2 * (1 + MESSAGE_OVERHEAD_TOKENS));
    }
}

use cagent_core::constants::{
    COMPACTION_MESSAGE_THRESHOLD, COMPACTION_TAIL_KEEP, COMPACTION_TOKEN_THRESHOLD,
};
use cagent_core::{ChatMessage, ChatRole, CompactionState};

use crate::tokens::estimate_history_tokens;

/// Whether `history` has grown past either compaction trigger: message
/// count or estimated token count.
pub fn needs_compaction(history: &[ChatMessage]) -> bool {
    history.len() > COMPACTION_MESSAGE_THRESHOLD
        || estimate_history_tokens(history) > COMPACTION_TOKEN_THRESHOLD
}

/// Collapse everything but the system messages and the most recent
/// `COMPACTION_TAIL_KEEP` turns into one running summary message, folded
/// into `compaction.summary`. The summary itself is a plain concatenation
/// of one-line digests — the engine is responsible for asking the model
/// to produce a better abstractive summary when one is available; this
/// is the always-available fallback that needs no model call.
pub fn compact(history: &mut Vec<ChatMessage>, compaction: &mut CompactionState, iteration: u32) {
    let (system, rest): (Vec<ChatMessage>, Vec<ChatMessage>) = history
        .drain(..)
        .partition(|m| m.role == ChatRole::System);

    if rest.len() <= COMPACTION_TAIL_KEEP {
        *history = system.into_iter().chain(rest).collect();
        return;
    }

    let split_at = rest.len() - COMPACTION_TAIL_KEEP;
    let (dropped, tail) = rest.split_at(split_at);

    for msg in dropped {
        let line = digest_line(msg);
        compaction.summary.push_str(&line);
        compaction.summary.push('\n');
    }
    compaction.dropped_messages += dropped.len() as u32;
    compaction.last_compacted_iteration = iteration;
    tracing::debug!(
        dropped = dropped.len(),
        total_dropped = compaction.dropped_messages,
        iteration,
        "compacted history"
    );

    let summary_message = ChatMessage::system(format!(
        "[compacted history, {} earlier message(s) summarized]\n{}",
        compaction.dropped_messages, compaction.summary
    ));

    *history = system
        .into_iter()
        .chain(std::iter::once(summary_message))
        .chain(tail.iter().cloned())
        .collect();
}

fn digest_line(msg: &ChatMessage) -> String {
    let role = match msg.role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
    };
    let preview: String = msg.content.chars().take(120).collect();
    format!("- {role}: {preview}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_compaction_triggers_on_message_count() {
        let history: Vec<ChatMessage> = (0..(COMPACTION_MESSAGE_THRESHOLD + 1))
            .map(|i| ChatMessage::user(format!("{i}")))
            .collect();
        assert!(needs_compaction(&history));
    }

    #[test]
    fn needs_compaction_false_under_thresholds() {
        let history = vec![ChatMessage::user("hi")];
        assert!(!needs_compaction(&history));
    }

    #[test]
    fn compact_keeps_system_messages_and_tail() {
        let mut history = vec![ChatMessage::system("rules")];
        for i in 0..(COMPACTION_TAIL_KEEP + 20) {
            history.push(ChatMessage::user(format!("turn {i}")));
        }
        let mut compaction = CompactionState::default();
        compact(&mut history, &mut compaction, 5);

        assert!(history.iter().any(|m| m.role == ChatRole::System && m.content == "rules"));
        assert!(compaction.dropped_messages > 0);
        assert_eq!(compaction.last_compacted_iteration, 5);
        let tail_user_count = history
            .iter()
            .filter(|m| m.role == ChatRole::User)
            .count();
        assert_eq!(tail_user_count, COMPACTION_TAIL_KEEP);
    }

    #[test]
    fn compact_is_noop_when_already_short() {
        let mut history = vec![ChatMessage::user("only one")];
        let mut compaction = CompactionState::default();
        compact(&mut history, &mut compaction, 1);
        assert_eq!(history.len(), 1);
        assert_eq!(compaction.dropped_messages, 0);
    }
}

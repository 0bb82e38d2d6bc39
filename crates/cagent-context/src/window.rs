use cagent_core::constants::{CONTEXT_BUDGET_LEVELS, CONTEXT_MIN_TAIL_MESSAGES};
use cagent_core::{ChatMessage, ChatRole};

use crate::tokens::estimate_message_tokens;

/// Select the tightest budget level from `CONTEXT_BUDGET_LEVELS` that
/// still fits within `attempt` escalations: attempt 0 uses the largest
/// level, each subsequent attempt (after the model reports an overflow)
/// steps down to the next-smaller level, floored at the smallest.
pub fn budget_for_attempt(attempt: u32) -> usize {
    let idx = (attempt as usize).min(CONTEXT_BUDGET_LEVELS.len() - 1);
    CONTEXT_BUDGET_LEVELS[idx]
}

/// Build the message list actually sent to the model: all system
/// messages, then as many of the most recent remaining messages as fit
/// the token budget, never dropping below `CONTEXT_MIN_TAIL_MESSAGES` of
/// the tail even if that exceeds budget (an oversized single exchange is
/// better sent over-budget than silently dropped).
pub fn build_window(history: &[ChatMessage], token_budget: usize) -> Vec<ChatMessage> {
    let (system, rest): (Vec<&ChatMessage>, Vec<&ChatMessage>) =
        history.iter().partition(|m| m.role == ChatRole::System);

    let mut system_tokens = 0usize;
    let mut kept_system = Vec::with_capacity(system.len());
    for msg in system {
        system_tokens += estimate_message_tokens(msg);
        kept_system.push(msg.clone());
    }

    let mut tail: Vec<ChatMessage> = Vec::new();
    let mut used = system_tokens;
    for (idx, msg) in rest.iter().enumerate().rev() {
        let cost = estimate_message_tokens(msg);
        let remaining_from_end = rest.len() - idx;
        if used + cost > token_budget && remaining_from_end > CONTEXT_MIN_TAIL_MESSAGES {
            break;
        }
        used += cost;
        tail.push((*msg).clone());
    }
    tail.reverse();

    kept_system.extend(tail);
    kept_system
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_steps_down_with_each_attempt() {
        assert_eq!(budget_for_attempt(0), CONTEXT_BUDGET_LEVELS[0]);
        assert_eq!(budget_for_attempt(1), CONTEXT_BUDGET_LEVELS[1]);
        assert_eq!(budget_for_attempt(99), *CONTEXT_BUDGET_LEVELS.last().unwrap());
    }

    #[test]
    fn build_window_keeps_all_system_messages() {
        let history = vec![
            ChatMessage::system("rules"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
        ];
        let window = build_window(&history, 10_000);
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn build_window_never_drops_below_minimum_tail() {
        let mut history = vec![ChatMessage::system("rules")];
        for i in 0..(CONTEXT_MIN_TAIL_MESSAGES + 10) {
            history.push(ChatMessage::user(format!("turn {i}")));
        }
        let window = build_window(&history, 1);
        let non_system = window.len() - 1;
        assert!(non_system >= CONTEXT_MIN_TAIL_MESSAGES);
    }

    #[test]
    fn build_window_drops_oldest_first_under_tight_budget() {
        let history = vec![
            ChatMessage::user("this is an old message with a fair bit of content in it"),
            ChatMessage::assistant("recent"),
        ];
        let window = build_window(&history, 1);
        assert!(window.iter().any(|m| m.content == "recent"));
    }
}

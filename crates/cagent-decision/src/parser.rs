use cagent_core::constants::MAX_PARSE_ATTEMPTS;
use cagent_core::{Action, AgentError};
use regex::Regex;
use serde_json::Value;

/// One parsed model turn: the optional free-text reasoning plus the
/// structured action it decided on.
pub struct ParsedDecision {
    pub thinking: Option<String>,
    pub action: Action,
}

/// Parse a model completion into a `ParsedDecision`, trying progressively
/// looser extraction strategies: the whole response as JSON, a fenced
/// ```json code block, then the substring between the first `{` and the
/// last `}`. This absorbs the common failure modes of models that wrap
/// their JSON in prose or markdown fencing despite being asked not to.
pub fn parse_decision(raw: &str) -> Result<ParsedDecision, AgentError> {
    let trimmed = raw.trim();

    let value = parse_strict(trimmed)
        .or_else(|| parse_fenced_block(trimmed))
        .or_else(|| parse_braces_substring(trimmed))
        .ok_or_else(|| {
            tracing::debug!(preview = %preview(trimmed), "all decision extraction strategies failed");
            AgentError::ParseFailure(format!(
                "could not extract a JSON decision from model output: {}",
                preview(trimmed)
            ))
        })?;

    decision_from_value(value)
}

fn parse_strict(text: &str) -> Option<Value> {
    serde_json::from_str(text).ok()
}

fn parse_fenced_block(text: &str) -> Option<Value> {
    let re = Regex::new(r"```(?:json)?\s*\n?(\{[\s\S]*?\})\s*```").ok()?;
    let captures = re.captures(text)?;
    serde_json::from_str(captures.get(1)?.as_str()).ok()
}

fn parse_braces_substring(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

fn decision_from_value(value: Value) -> Result<ParsedDecision, AgentError> {
    let thinking = value
        .get("thinking")
        .and_then(Value::as_str)
        .map(str::to_string);

    let action_value = value.get("action").cloned().unwrap_or(value);

    let action: Action = serde_json::from_value(action_value)
        .map_err(|e| AgentError::ParseFailure(format!("action did not match a known shape: {e}")))?;

    Ok(ParsedDecision { thinking, action })
}

fn preview(text: &str) -> String {
    let clipped: String = text.chars().take(200).collect();
    clipped
}

/// Upper bound on re-prompt attempts before the engine gives up and
/// surfaces a parse failure as a run-ending error.
pub const MAX_ATTEMPTS: u32 = MAX_PARSE_ATTEMPTS;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_strict_json() {
        let raw = r#"{"thinking":"inspecting","action":{"type":"list_tree"}}"#;
        let parsed = parse_decision(raw).unwrap();
        assert_eq!(parsed.thinking.as_deref(), Some("inspecting"));
        assert_eq!(parsed.action.type_name(), "list_tree");
    }

    #[test]
    fn parses_fenced_json_block_with_surrounding_prose() {
        let raw = "I'll look at the tree first.\n```json\n{\"action\":{\"type\":\"list_tree\"}}\n```\nDone.";
        let parsed = parse_decision(raw).unwrap();
        assert_eq!(parsed.action.type_name(), "list_tree");
    }

    #[test]
    fn parses_braces_substring_as_last_resort() {
        let raw = "Sure thing! {\"action\": {\"type\": \"read_file\", \"path\": \"a.rs\"}} Hope that helps.";
        let parsed = parse_decision(raw).unwrap();
        assert_eq!(parsed.action.type_name(), "read_file");
    }

    #[test]
    fn parses_bare_action_object_without_wrapper() {
        let raw = r#"{"type":"write_file","path":"a.rs","content":"x"}"#;
        let parsed = parse_decision(raw).unwrap();
        assert_eq!(parsed.action.type_name(), "write_file");
    }

    #[test]
    fn errors_on_unparseable_output() {
        let raw = "I don't know what to do here.";
        assert!(parse_decision(raw).is_err());
    }

    #[test]
    fn errors_on_json_that_is_not_a_known_action() {
        let raw = r#"{"action":{"type":"not_a_real_action"}}"#;
        assert!(parse_decision(raw).is_err());
    }
}

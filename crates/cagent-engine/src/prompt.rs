use cagent_core::{ChatMessage, RunRequest};

/// Build the system message describing the action schema and the run's
/// constraints. Sent once, at the head of every context window.
pub fn system_message(
    request: &RunRequest,
    memory_snippets: &[String],
    project_digest: Option<&str>,
) -> ChatMessage {
    let mut text = String::from(
        "You are an autonomous coding agent working against a single workspace. \
         Each turn, respond with exactly one JSON object describing your next action, \
         with no surrounding prose: either {\"thinking\": \"...\", \"action\": {...}} or the \
         action object directly. The `type` field of `action` must be one of: list_tree, \
         search_files, read_file, read_many_files, write_file, append_file, delete_file, \
         run_command, web_search, final. Call `final` only once the goal is verifiably done, \
         with a `summary` of what changed.\n",
    );

    if request.strict_verification {
        text.push_str(
            "Verification is strict: `final` will be rejected until the declared verification \
             commands have been run.\n",
        );
    }

    if let Some(digest) = project_digest {
        text.push_str("\nProject digest:\n");
        text.push_str(digest);
        text.push('\n');
    }

    if !memory_snippets.is_empty() {
        text.push_str("\nRelevant lessons from prior runs in this workspace:\n");
        for snippet in memory_snippets {
            text.push_str("- ");
            text.push_str(snippet);
            text.push('\n');
        }
    }

    ChatMessage::system(text)
}

pub fn goal_message(request: &RunRequest) -> ChatMessage {
    let mut text = format!("Goal: {}\nWorkspace: {}\n", request.goal, request.workspace);
    if !request.skill_files.is_empty() {
        text.push_str(&format!("Relevant skill files: {}\n", request.skill_files.join(", ")));
    }
    if !request.verification_commands.is_empty() {
        let commands: Vec<String> = request.verification_commands.iter().map(|c| c.display()).collect();
        text.push_str(&format!("Verification commands: {}\n", commands.join("; ")));
    }
    ChatMessage::user(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cagent_core::{Command, ExecutionMode};
    use std::collections::HashMap;

    fn request() -> RunRequest {
        RunRequest {
            goal: "add a config loader".into(),
            workspace: "/tmp/work".into(),
            execution_mode: ExecutionMode::Single,
            max_iterations: 10,
            max_file_writes: 40,
            max_command_runs: 40,
            team_size: 1,
            strict_verification: true,
            auto_fix_verification: false,
            dry_run: false,
            rollback_on_failure: false,
            run_preflight_checks: false,
            require_clarification_before_edits: false,
            resume_from_last_checkpoint: false,
            resume_run_id: None,
            skill_files: vec![],
            verification_commands: vec![Command::new("cargo", vec!["test".into()])],
            clarification_answers: HashMap::new(),
            critic_pass_threshold: 0.7,
            max_parallel_work_units: 1,
            model_override: None,
        }
    }

    #[test]
    fn system_message_mentions_strict_verification_when_enabled() {
        let msg = system_message(&request(), &[], None);
        assert!(msg.content.contains("strict"));
    }

    #[test]
    fn system_message_includes_memory_snippets() {
        let msg = system_message(&request(), &["past fix: use backoff on 429".to_string()], None);
        assert!(msg.content.contains("backoff on 429"));
    }

    #[test]
    fn system_message_includes_project_digest_when_present() {
        let msg = system_message(&request(), &[], Some("Language hints: rust"));
        assert!(msg.content.contains("Language hints: rust"));
    }

    #[test]
    fn goal_message_includes_verification_commands() {
        let msg = goal_message(&request());
        assert!(msg.content.contains("cargo test"));
    }
}

use cagent_core::constants::SUPERVISOR_MAX_CYCLES;
use cagent_core::{ChatMessage, Checkpoint, CompactionState, ExecutionMode, RunRequest, RunResult, RunStatus};
use std::collections::HashMap;

/// Build the request for the next supervisor cycle after a non-terminal-
/// good result: widen the iteration budget a little (capped at the data
/// model's bound) and, once a team-mode run has failed to make progress,
/// fall back to single-agent execution for the retry — the simpler mode
/// is more likely to converge than repeating the same multi-agent plan.
pub fn build_recovery_request(previous: &RunRequest, last_result: &RunResult, cycle: u32) -> RunRequest {
    let mut next = previous.clone();
    next.max_iterations = if next.is_unbounded() {
        0
    } else {
        (next.max_iterations + 4).min(40)
    };
    if cycle >= SUPERVISOR_MAX_CYCLES / 2 && next.execution_mode == ExecutionMode::Multi {
        next.execution_mode = ExecutionMode::Single;
        next.team_size = 1;
    }
    if last_result.status == RunStatus::VerificationFailed {
        next.auto_fix_verification = true;
    }
    next
}

/// Seed the checkpoint for a recovery cycle: carry forward the rollback
/// journal and changed-file set (so rollback still reaches back to the
/// true pre-run state) but start iteration counting and conversation
/// history fresh, with a directive summarizing what the previous attempt
/// left unresolved.
pub fn seed_recovery_checkpoint(previous: &Checkpoint, last_result: &RunResult, new_run_id: &str) -> Checkpoint {
    let directive = ChatMessage::user(format!(
        "A previous attempt at this goal ended with status {:?}. Summary: {}. \
         Remaining work reported: {}. Continue from here, avoiding the same mistakes.",
        last_result.status,
        if last_result.summary.is_empty() { "(none)" } else { &last_result.summary },
        if last_result.remaining_work.is_empty() {
            "(none)".to_string()
        } else {
            last_result.remaining_work.join("; ")
        }
    ));

    Checkpoint {
        resume_key: previous.resume_key.clone(),
        run_id: new_run_id.to_string(),
        resumed_from_run_id: Some(previous.run_id.clone()),
        status: RunStatus::InProgress,
        history: vec![directive],
        compaction: CompactionState::default(),
        steps: vec![],
        changed_files: previous.changed_files.clone(),
        file_writes_used: 0,
        command_runs_used: 0,
        verification_checks: vec![],
        preflight_checks: previous.preflight_checks.clone(),
        rollback_snapshots: previous.rollback_snapshots.clone(),
        change_journal: previous.change_journal.clone(),
        clarification_answers: HashMap::new(),
        clarification_questions: vec![],
        project_digest: previous.project_digest.clone(),
        intelligence_snapshot: previous.intelligence_snapshot.clone(),
        last_iteration: 0,
        updated_at: chrono::Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cagent_core::Command;

    fn sample_request() -> RunRequest {
        RunRequest {
            goal: "ship the feature".into(),
            workspace: "/tmp/work".into(),
            execution_mode: ExecutionMode::Multi,
            max_iterations: 10,
            max_file_writes: 40,
            max_command_runs: 40,
            team_size: 4,
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
            max_parallel_work_units: 4,
            model_override: None,
        }
    }

    fn sample_result(status: RunStatus) -> RunResult {
        let now = chrono::Utc::now();
        RunResult {
            status,
            run_id: "r1".into(),
            resumed_from_run_id: None,
            started_at: now,
            ended_at: now,
            summary: "partial progress".into(),
            verification: vec![],
            remaining_work: vec!["fix edge case".into()],
            steps: vec![],
            verification_checks: vec![],
            preflight_checks: vec![],
            files_changed: vec!["a.rs".into()],
            commands_run: vec![],
            rollback_summary: vec![],
            change_journal: vec![],
            clarification_questions: vec![],
            clarification_answers: HashMap::new(),
            project_digest: None,
            intelligence_snapshot: None,
            error: None,
        }
    }

    #[test]
    fn widens_iteration_budget_and_caps_at_forty() {
        let mut req = sample_request();
        req.max_iterations = 38;
        let next = build_recovery_request(&req, &sample_result(RunStatus::MaxIterations), 1);
        assert_eq!(next.max_iterations, 40);
    }

    #[test]
    fn falls_back_to_single_agent_after_enough_cycles() {
        let req = sample_request();
        let next = build_recovery_request(&req, &sample_result(RunStatus::Failed), SUPERVISOR_MAX_CYCLES / 2);
        assert_eq!(next.execution_mode, ExecutionMode::Single);
        assert_eq!(next.team_size, 1);
    }

    #[test]
    fn enables_auto_fix_after_verification_failure() {
        let req = sample_request();
        let next = build_recovery_request(&req, &sample_result(RunStatus::VerificationFailed), 1);
        assert!(next.auto_fix_verification);
    }

    #[test]
    fn seeded_checkpoint_carries_forward_rollback_state() {
        let previous = seed_recovery_checkpoint(
            &Checkpoint {
                resume_key: "ws".into(),
                run_id: "r0".into(),
                resumed_from_run_id: None,
                status: RunStatus::Failed,
                history: vec![],
                compaction: CompactionState::default(),
                steps: vec![],
                changed_files: vec!["a.rs".into()],
                file_writes_used: 3,
                command_runs_used: 1,
                verification_checks: vec![],
                preflight_checks: vec![],
                rollback_snapshots: vec![],
                change_journal: vec![],
                clarification_answers: HashMap::new(),
                clarification_questions: vec![],
                project_digest: None,
                intelligence_snapshot: None,
                last_iteration: 5,
                updated_at: chrono::Utc::now(),
            },
            &sample_result(RunStatus::Failed),
            "r1",
        );
        assert_eq!(previous.changed_files, vec!["a.rs".to_string()]);
        assert_eq!(previous.last_iteration, 0);
        assert_eq!(previous.resumed_from_run_id.as_deref(), Some("r0"));
        assert_eq!(previous.history.len(), 1);
    }
}

use std::path::Path;
use std::sync::Arc;

use cagent_checkpoint::CheckpointStore;
use cagent_core::{AgentError, ChatMessage, Checkpoint, ExecutionMode, RunMeta, RunRequest, RunResult, RunStatus};
use cagent_engine::{run_iteration_loop, RunEventSink, RunOutcome};
use cagent_llm::ChatComplete;
use cagent_tools::WebSearchClient;
use tokio_util::sync::CancellationToken;

/// Stand-in for the external multi-agent runner this core wraps: `teamSize`
/// members (capped by `maxParallelWorkUnits`) take turns extending the same
/// checkpoint, each bounded to an increasing slice of the overall iteration
/// budget. A member inherits the full history of the one before it, so
/// "coordination" falls out of shared context rather than message passing
/// between concurrent workers.
#[allow(clippy::too_many_arguments)]
pub async fn run_multi_agent_cycle(
    workspace: &Path,
    request: &RunRequest,
    checkpoint: Checkpoint,
    chat: &Arc<dyn ChatComplete>,
    web_search: &Arc<dyn WebSearchClient>,
    memory_snippets: &[String],
    memory_conflict_warning: Option<&str>,
    checkpoint_store: &CheckpointStore,
    meta: &mut RunMeta,
    cancel: &CancellationToken,
    event_sink: Option<&dyn RunEventSink>,
) -> Result<RunOutcome, AgentError> {
    let team_size = request.team_size.min(request.max_parallel_work_units).max(1);
    let per_member = if request.is_unbounded() {
        0
    } else {
        (request.max_iterations / team_size).max(1)
    };

    let mut member_request = request.clone();
    let mut next_checkpoint = checkpoint;
    let mut outcome: Option<RunOutcome> = None;

    for member in 0..team_size {
        if !request.is_unbounded() {
            member_request.max_iterations = ((member + 1) * per_member).min(request.max_iterations);
        }
        if let Some(prev) = outcome.take() {
            next_checkpoint = carry_forward(prev.checkpoint, &prev.result, member);
        }

        let member_outcome = run_iteration_loop(
            workspace,
            &member_request,
            next_checkpoint.clone(),
            chat,
            web_search,
            memory_snippets,
            memory_conflict_warning,
            checkpoint_store,
            meta,
            cancel,
            event_sink,
        )
        .await?;

        let done = matches!(
            member_outcome.result.status,
            RunStatus::Completed | RunStatus::Canceled | RunStatus::NeedsClarification
        );
        outcome = Some(member_outcome);
        if done {
            break;
        }
    }

    outcome.ok_or_else(|| AgentError::SupervisorExhaustion("multi-agent cycle ran zero team members".into()))
}

fn carry_forward(mut checkpoint: Checkpoint, result: &RunResult, next_member: u32) -> Checkpoint {
    checkpoint.status = RunStatus::InProgress;
    checkpoint.history.push(ChatMessage::user(format!(
        "Team member {next_member} is taking over this goal. The previous member ended with status \
         {:?} and summary: {}. Continue the work, avoiding repeated actions.",
        result.status,
        if result.summary.is_empty() { "(none)" } else { &result.summary }
    )));
    checkpoint
}

/// Mirrors the spec's `shouldFallbackToSingle`: a multi-agent cycle that
/// produced no file writes on a mutation-like goal and ended in one of the
/// terminal statuses a fallback could plausibly fix.
pub fn should_fallback_to_single(request: &RunRequest, result: &RunResult, canceled: bool) -> bool {
    request.execution_mode == ExecutionMode::Multi
        && !request.dry_run
        && !canceled
        && cagent_core::text::goal_looks_mutation_like(&request.goal)
        && result.files_changed.is_empty()
        && matches!(
            result.status,
            RunStatus::Completed | RunStatus::Failed | RunStatus::MaxIterations | RunStatus::VerificationFailed
        )
}

/// The simplified single-agent request used for an auto-fallback attempt:
/// no resume, the riskier knobs disabled, iterations clamped to a narrow
/// band so the fallback converges quickly instead of repeating the same
/// budget as the multi-agent attempt that just failed.
pub fn build_single_fallback_request(previous: &RunRequest) -> RunRequest {
    let mut next = previous.clone();
    next.execution_mode = ExecutionMode::Single;
    next.team_size = 1;
    next.resume_from_last_checkpoint = false;
    next.run_preflight_checks = false;
    next.strict_verification = false;
    next.rollback_on_failure = false;
    next.require_clarification_before_edits = false;
    next.max_iterations = next.max_iterations.clamp(6, 24);
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    fn request() -> RunRequest {
        RunRequest {
            goal: "implement the payment retry fix".into(),
            workspace: "/tmp/work".into(),
            execution_mode: ExecutionMode::Multi,
            max_iterations: 20,
            max_file_writes: 40,
            max_command_runs: 40,
            team_size: 3,
            strict_verification: true,
            auto_fix_verification: false,
            dry_run: false,
            rollback_on_failure: true,
            run_preflight_checks: true,
            require_clarification_before_edits: true,
            resume_from_last_checkpoint: true,
            resume_run_id: None,
            skill_files: vec![],
            verification_commands: vec![],
            clarification_answers: HashMap::new(),
            critic_pass_threshold: 0.7,
            max_parallel_work_units: 4,
            model_override: None,
        }
    }

    fn result(status: RunStatus, files_changed: Vec<String>) -> RunResult {
        let now = Utc::now();
        RunResult {
            status,
            run_id: "r1".into(),
            resumed_from_run_id: None,
            started_at: now,
            ended_at: now,
            summary: String::new(),
            verification: vec![],
            remaining_work: vec![],
            steps: vec![],
            verification_checks: vec![],
            preflight_checks: vec![],
            files_changed,
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
    fn falls_back_when_multi_mode_made_no_writes_on_mutation_goal() {
        let req = request();
        assert!(should_fallback_to_single(&req, &result(RunStatus::Failed, vec![]), false));
    }

    #[test]
    fn does_not_fall_back_when_writes_happened() {
        let req = request();
        assert!(!should_fallback_to_single(&req, &result(RunStatus::Failed, vec!["a.rs".into()]), false));
    }

    #[test]
    fn does_not_fall_back_when_canceled() {
        let req = request();
        assert!(!should_fallback_to_single(&req, &result(RunStatus::Failed, vec![]), true));
    }

    #[test]
    fn does_not_fall_back_in_dry_run() {
        let mut req = request();
        req.dry_run = true;
        assert!(!should_fallback_to_single(&req, &result(RunStatus::Failed, vec![]), false));
    }

    #[test]
    fn single_fallback_request_disables_risky_knobs_and_clamps_iterations() {
        let mut req = request();
        req.max_iterations = 40;
        let fallback = build_single_fallback_request(&req);
        assert_eq!(fallback.execution_mode, ExecutionMode::Single);
        assert_eq!(fallback.team_size, 1);
        assert!(!fallback.resume_from_last_checkpoint);
        assert!(!fallback.run_preflight_checks);
        assert!(!fallback.strict_verification);
        assert!(!fallback.rollback_on_failure);
        assert!(!fallback.require_clarification_before_edits);
        assert_eq!(fallback.max_iterations, 24);
    }

    #[test]
    fn single_fallback_request_floors_small_iteration_budgets() {
        let mut req = request();
        req.max_iterations = 2;
        let fallback = build_single_fallback_request(&req);
        assert_eq!(fallback.max_iterations, 6);
    }
}

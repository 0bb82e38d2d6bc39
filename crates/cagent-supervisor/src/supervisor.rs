use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use cagent_checkpoint::CheckpointStore;
use cagent_core::constants::{SUPERVISOR_MAX_CYCLES, SUPERVISOR_MAX_NO_PROGRESS_CYCLES, SUPERVISOR_MAX_RUNTIME_MS};
use cagent_core::{AgentError, Checkpoint, CompactionState, RunMeta, RunRequest, RunResult, RunStatus};
use cagent_engine::{run_iteration_loop, RunEventSink};
use cagent_llm::ChatComplete;
use cagent_tools::WebSearchClient;
use chrono::Utc;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use cagent_core::ExecutionMode;

use crate::contract::meets_completion_contract;
use crate::multi::{build_single_fallback_request, run_multi_agent_cycle, should_fallback_to_single};
use crate::recovery::{build_recovery_request, seed_recovery_checkpoint};

/// Drives one or more iteration-engine cycles for a single run request,
/// retrying with a widened and eventually simplified request when a
/// cycle ends without meeting the completion contract, until the
/// contract is met, a hard stop is reached, or the run needs a human.
#[allow(clippy::too_many_arguments)]
pub async fn run_with_recovery(
    workspace: &Path,
    base_request: &RunRequest,
    resume_key: &str,
    chat: Arc<dyn ChatComplete>,
    web_search: Arc<dyn WebSearchClient>,
    memory_snippets: &[String],
    memory_conflict_warning: Option<&str>,
    checkpoint_store: &CheckpointStore,
    cancel: CancellationToken,
    event_sink: Option<&dyn RunEventSink>,
) -> Result<RunResult, AgentError> {
    run_from_checkpoint(
        workspace,
        base_request,
        resume_key,
        None,
        chat,
        web_search,
        memory_snippets,
        memory_conflict_warning,
        checkpoint_store,
        cancel,
        event_sink,
    )
    .await
}

/// Same as [`run_with_recovery`], but the first cycle seeds from
/// `initial_checkpoint` when present instead of starting a fresh one —
/// the path the `resume` CLI subcommand uses to continue a checkpointed
/// run rather than begin a new one.
#[allow(clippy::too_many_arguments)]
pub async fn run_from_checkpoint(
    workspace: &Path,
    base_request: &RunRequest,
    resume_key: &str,
    initial_checkpoint: Option<Checkpoint>,
    chat: Arc<dyn ChatComplete>,
    web_search: Arc<dyn WebSearchClient>,
    memory_snippets: &[String],
    memory_conflict_warning: Option<&str>,
    checkpoint_store: &CheckpointStore,
    cancel: CancellationToken,
    event_sink: Option<&dyn RunEventSink>,
) -> Result<RunResult, AgentError> {
    let wall_clock_start = Instant::now();
    let mut request = base_request.clone();
    let mut pending_checkpoint: Option<Checkpoint> = initial_checkpoint;
    let mut last_changed_files = 0usize;
    let mut no_progress_cycles = 0u32;
    let mut last_result: Option<RunResult> = None;

    for cycle in 1..=SUPERVISOR_MAX_CYCLES {
        if wall_clock_start.elapsed().as_millis() as i64 > SUPERVISOR_MAX_RUNTIME_MS {
            tracing::warn!(cycle, "supervisor runtime budget exhausted");
            break;
        }

        let checkpoint = pending_checkpoint
            .take()
            .unwrap_or_else(|| fresh_checkpoint(resume_key, &format!("{resume_key}-cycle{cycle}")));
        let run_id = checkpoint.run_id.clone();
        let mut meta = RunMeta {
            run_id: run_id.clone(),
            resume_key: resume_key.to_string(),
            workspace: request.workspace.clone(),
            goal: request.goal.clone(),
            started_at: Utc::now(),
            updated_at: Utc::now(),
            status: RunStatus::InProgress,
            resumed_from_run_id: checkpoint.resumed_from_run_id.clone(),
            last_iteration: 0,
        };

        let dispatch = if request.execution_mode == ExecutionMode::Multi {
            run_multi_agent_cycle(
                workspace,
                &request,
                checkpoint,
                &chat,
                &web_search,
                memory_snippets,
                memory_conflict_warning,
                checkpoint_store,
                &mut meta,
                &cancel,
                event_sink,
            )
            .await
        } else {
            run_iteration_loop(
                workspace,
                &request,
                checkpoint,
                &chat,
                &web_search,
                memory_snippets,
                memory_conflict_warning,
                checkpoint_store,
                &mut meta,
                &cancel,
                event_sink,
            )
            .await
        };

        let mut outcome = match dispatch {
            Ok(outcome) => outcome,
            Err(e) if request.execution_mode == ExecutionMode::Multi && !cancel.is_cancelled() && !request.dry_run => {
                tracing::warn!(cycle, error = %e, "multi-agent cycle errored, falling back to single-agent");
                let fallback_request = build_single_fallback_request(&request);
                let fallback_checkpoint = fresh_checkpoint(resume_key, &format!("{resume_key}-fallback{cycle}"));
                let mut fallback_meta = RunMeta {
                    run_id: fallback_checkpoint.run_id.clone(),
                    resume_key: resume_key.to_string(),
                    workspace: fallback_request.workspace.clone(),
                    goal: fallback_request.goal.clone(),
                    started_at: Utc::now(),
                    updated_at: Utc::now(),
                    status: RunStatus::InProgress,
                    resumed_from_run_id: None,
                    last_iteration: 0,
                };
                let mut fallback_outcome = run_iteration_loop(
                    workspace,
                    &fallback_request,
                    fallback_checkpoint,
                    &chat,
                    &web_search,
                    memory_snippets,
                    memory_conflict_warning,
                    checkpoint_store,
                    &mut fallback_meta,
                    &cancel,
                    event_sink,
                )
                .await?;
                fallback_outcome.result.summary = format!(
                    "{}\nAuto-fallback triggered: multi-agent cycle failed ({e}).",
                    fallback_outcome.result.summary
                );
                request = fallback_request;
                fallback_outcome
            }
            Err(e) => return Err(e),
        };

        if should_fallback_to_single(&request, &outcome.result, cancel.is_cancelled()) {
            tracing::warn!(cycle, "multi-agent cycle made no changes, falling back to single-agent");
            let fallback_request = build_single_fallback_request(&request);
            let fallback_checkpoint = fresh_checkpoint(resume_key, &format!("{resume_key}-fallback{cycle}"));
            let mut fallback_meta = RunMeta {
                run_id: fallback_checkpoint.run_id.clone(),
                resume_key: resume_key.to_string(),
                workspace: fallback_request.workspace.clone(),
                goal: fallback_request.goal.clone(),
                started_at: Utc::now(),
                updated_at: Utc::now(),
                status: RunStatus::InProgress,
                resumed_from_run_id: None,
                last_iteration: 0,
            };
            let mut fallback_outcome = run_iteration_loop(
                workspace,
                &fallback_request,
                fallback_checkpoint,
                &chat,
                &web_search,
                memory_snippets,
                memory_conflict_warning,
                checkpoint_store,
                &mut fallback_meta,
                &cancel,
                event_sink,
            )
            .await?;
            fallback_outcome.result.summary = format!(
                "{}\nAuto-fallback triggered: multi-agent cycle made no file changes.",
                fallback_outcome.result.summary
            );
            request = fallback_request;
            outcome = fallback_outcome;
        }

        tracing::info!(cycle, status = ?outcome.result.status, "supervisor cycle finished");

        match outcome.result.status {
            RunStatus::Completed | RunStatus::NeedsClarification | RunStatus::Canceled => {
                return Ok(outcome.result);
            }
            RunStatus::Failed | RunStatus::MaxIterations | RunStatus::VerificationFailed => {
                let progressed = outcome.result.files_changed.len() > last_changed_files;
                last_changed_files = outcome.result.files_changed.len();
                if progressed {
                    no_progress_cycles = 0;
                } else {
                    no_progress_cycles += 1;
                }

                if no_progress_cycles >= SUPERVISOR_MAX_NO_PROGRESS_CYCLES {
                    tracing::warn!(cycle, "no progress across recovery cycles, giving up");
                    return Ok(outcome.result);
                }

                request = build_recovery_request(&request, &outcome.result, cycle);
                pending_checkpoint = Some(seed_recovery_checkpoint(
                    &outcome.checkpoint,
                    &outcome.result,
                    &format!("{resume_key}-cycle{}", cycle + 1),
                ));
                last_result = Some(outcome.result);
            }
            RunStatus::InProgress => unreachable!("engine never returns a non-terminal status"),
        }
    }

    last_result.ok_or_else(|| AgentError::SupervisorExhaustion("no cycle ever ran".to_string()))
}

fn fresh_checkpoint(resume_key: &str, run_id: &str) -> Checkpoint {
    let now = Utc::now();
    Checkpoint {
        resume_key: resume_key.to_string(),
        run_id: run_id.to_string(),
        resumed_from_run_id: None,
        status: RunStatus::InProgress,
        history: vec![],
        compaction: CompactionState::default(),
        steps: vec![],
        changed_files: vec![],
        file_writes_used: 0,
        command_runs_used: 0,
        verification_checks: vec![],
        preflight_checks: vec![],
        rollback_snapshots: vec![],
        change_journal: vec![],
        clarification_answers: HashMap::new(),
        clarification_questions: vec![],
        project_digest: None,
        intelligence_snapshot: None,
        last_iteration: 0,
        updated_at: now,
    }
}

pub fn completion_contract_met(result: &RunResult) -> bool {
    meets_completion_contract(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cagent_llm::NoopChatClient;
    use cagent_tools::NoopWebSearchClient;

    fn request(workspace: &Path) -> RunRequest {
        RunRequest {
            goal: "write a readme".into(),
            workspace: workspace.display().to_string(),
            execution_mode: ExecutionMode::Single,
            max_iterations: 4,
            max_file_writes: 10,
            max_command_runs: 10,
            team_size: 1,
            strict_verification: false,
            auto_fix_verification: false,
            dry_run: false,
            rollback_on_failure: false,
            run_preflight_checks: false,
            require_clarification_before_edits: false,
            resume_from_last_checkpoint: false,
            resume_run_id: None,
            skill_files: vec![],
            verification_commands: vec![],
            clarification_answers: HashMap::new(),
            critic_pass_threshold: 0.7,
            max_parallel_work_units: 1,
            model_override: None,
        }
    }

    #[tokio::test]
    async fn first_cycle_success_returns_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join(".cagent"));
        let chat: Arc<dyn ChatComplete> = Arc::new(NoopChatClient::new(vec![
            r#"{"action":{"type":"write_file","path":"README.md","content":"hi"}}"#.into(),
            r#"{"action":{"type":"final","summary":"done","verification":[],"remaining_work":[]}}"#.into(),
        ]));
        let web_search: Arc<dyn WebSearchClient> = Arc::new(NoopWebSearchClient);

        let result = run_with_recovery(
            dir.path(),
            &request(dir.path()),
            "ws-key",
            chat,
            web_search,
            &[],
            None,
            &store,
            CancellationToken::new(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(result.status, RunStatus::Completed);
        assert!(completion_contract_met(&result));
    }

    #[tokio::test]
    async fn gives_up_after_repeated_no_progress_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join(".cagent"));
        let chat: Arc<dyn ChatComplete> = Arc::new(NoopChatClient::new(vec![
            r#"{"action":{"type":"list_tree"}}"#.into(),
        ]));
        let web_search: Arc<dyn WebSearchClient> = Arc::new(NoopWebSearchClient);

        let result = run_with_recovery(
            dir.path(),
            &request(dir.path()),
            "ws-key2",
            chat,
            web_search,
            &[],
            None,
            &store,
            CancellationToken::new(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(result.status, RunStatus::MaxIterations);
        assert!(!completion_contract_met(&result));
    }
}

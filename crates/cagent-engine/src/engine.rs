use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use cagent_checkpoint::CheckpointStore;
use cagent_context::{build_window, compact, needs_compaction};
use cagent_core::constants::{CHECKPOINT_INTERVAL, MODEL_BACKOFF_CAP_MS};
use cagent_core::{
    AgentError, ChatMessage, Checkpoint, Command, RunMeta, RunRequest, RunResult, RunStatus, Step,
};
use cagent_decision::{parse_decision, MAX_ATTEMPTS};
use cagent_llm::ChatComplete;
use cagent_tools::{execute_action, Budgets, RollbackJournal, WebSearchClient};
use cagent_verify::{all_passed, failure_feedback, run_checks};
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::digest::{compute_intelligence_snapshot, compute_project_digest};
use crate::events::RunEventSink;
use crate::guards::{check_premature_final, StagnationTracker};
use crate::prompt::{goal_message, system_message};

/// Result of driving one run's iteration loop to a terminal state: the
/// caller-facing result plus the final checkpoint, so the supervisor can
/// persist it or hand it to a fallback attempt.
pub struct RunOutcome {
    pub result: RunResult,
    pub checkpoint: Checkpoint,
}

/// Drive `checkpoint` forward until the run reaches a terminal status,
/// checkpointing periodically and honoring cooperative cancellation.
/// `checkpoint` may already contain history (a resumed run) or be freshly
/// seeded by the caller (a first run).
#[allow(clippy::too_many_arguments)]
pub async fn run_iteration_loop(
    workspace: &Path,
    request: &RunRequest,
    mut checkpoint: Checkpoint,
    chat: &Arc<dyn ChatComplete>,
    web_search: &Arc<dyn WebSearchClient>,
    memory_snippets: &[String],
    memory_conflict_warning: Option<&str>,
    checkpoint_store: &CheckpointStore,
    meta: &mut RunMeta,
    cancel: &CancellationToken,
    event_sink: Option<&dyn RunEventSink>,
) -> Result<RunOutcome, AgentError> {
    let started_at = meta.started_at;

    if checkpoint.history.is_empty() {
        if checkpoint.project_digest.is_none() {
            checkpoint.project_digest = Some(compute_project_digest(workspace));
        }
        if checkpoint.intelligence_snapshot.is_none() {
            checkpoint.intelligence_snapshot = Some(compute_intelligence_snapshot(workspace));
        }
        checkpoint
            .history
            .push(system_message(request, memory_snippets, checkpoint.project_digest.as_deref()));
        checkpoint.history.push(goal_message(request));
    }

    let mut budgets = Budgets {
        file_writes_used: checkpoint.file_writes_used,
        max_file_writes: request.max_file_writes,
        command_runs_used: checkpoint.command_runs_used,
        max_command_runs: request.max_command_runs,
    };
    let mut journal = RollbackJournal::from_existing(
        checkpoint.rollback_snapshots.clone(),
        checkpoint.change_journal.clone(),
    );
    let mut stagnation = StagnationTracker::new();
    let unbounded = request.is_unbounded();
    let mut persistence_degraded = false;
    // Memory evidence gate: when retrieval surfaced conflicting guidance,
    // block the first mutation until the model has taken at least one
    // read-style action to investigate the conflict.
    let mut memory_gate_cleared = memory_conflict_warning.is_none();

    loop {
        if cancel.is_cancelled() {
            checkpoint.status = RunStatus::Canceled;
            break;
        }
        if !unbounded && checkpoint.last_iteration >= request.max_iterations {
            checkpoint.status = RunStatus::MaxIterations;
            break;
        }
        checkpoint.last_iteration += 1;
        let iteration = checkpoint.last_iteration;

        if needs_compaction(&checkpoint.history) {
            compact(&mut checkpoint.history, &mut checkpoint.compaction, iteration);
        }

        let (decision, raw) = match request_decision(chat, &checkpoint.history).await {
            Ok(pair) => pair,
            Err(e) if !e.is_recoverable() => return Err(e),
            Err(e) => {
                checkpoint.status = RunStatus::Failed;
                record_step(&mut checkpoint, iteration, None, false, e.to_string(), String::new(), 0, event_sink);
                break;
            }
        };
        checkpoint.history.push(ChatMessage::assistant(raw));

        match &decision.action {
            cagent_core::Action::Final {
                summary,
                verification,
                remaining_work,
            } => {
                if let Err(reason) =
                    check_premature_final(&request.goal, request.dry_run, budgets.file_writes_used)
                {
                    record_step(&mut checkpoint, iteration, None, false, reason.clone(), String::new(), 0, event_sink);
                    checkpoint.history.push(ChatMessage::user(reason));
                    continue;
                }

                if request.verification_commands.is_empty() {
                    finalize(&mut checkpoint, RunStatus::Completed, summary, verification, remaining_work, event_sink);
                    break;
                }

                let attempt = checkpoint.verification_checks.len() as u32 / request.verification_commands.len().max(1) as u32 + 1;
                let checks = run_checks(workspace, &request.verification_commands, attempt).await?;
                let passed = all_passed(&checks);
                checkpoint.verification_checks.extend(checks.clone());
                if let Some(sink) = event_sink {
                    for check in &checks {
                        sink.on_verification(check);
                    }
                }

                if passed {
                    finalize(&mut checkpoint, RunStatus::Completed, summary, verification, remaining_work, event_sink);
                    break;
                }

                if request.auto_fix_verification {
                    checkpoint
                        .history
                        .push(ChatMessage::user(format!(
                            "Verification failed:\n{}\nFix the issues and try again.",
                            failure_feedback(&checks)
                        )));
                    continue;
                }

                if request.rollback_on_failure {
                    let summary = journal.rollback_all(workspace);
                    tracing::warn!(?summary, "rolled back after verification failure");
                }
                checkpoint.status = RunStatus::VerificationFailed;
                break;
            }
            action => {
                if !memory_gate_cleared && action.is_mutation() {
                    let reason = format!(
                        "Memory evidence gate: {} Run a read-style action to review the conflict before mutating.",
                        memory_conflict_warning.unwrap_or("retrieved memory contains conflicting guidance.")
                    );
                    record_step(&mut checkpoint, iteration, Some(action.clone()), false, reason.clone(), String::new(), 0, event_sink);
                    checkpoint.history.push(ChatMessage::user(reason));
                    continue;
                }
                if !action.is_mutation() {
                    memory_gate_cleared = true;
                }

                if request.require_clarification_before_edits
                    && action.is_mutation()
                    && checkpoint.clarification_answers.is_empty()
                    && checkpoint.clarification_questions.is_empty()
                {
                    checkpoint
                        .clarification_questions
                        .push("Confirm it is safe to modify files in this workspace to pursue the stated goal.".to_string());
                    checkpoint.status = RunStatus::NeedsClarification;
                    break;
                }

                let outcome = execute_action(workspace, action, &mut budgets, &mut journal, web_search).await;
                match outcome {
                    Ok(outcome) => {
                        if action.is_mutation() {
                            if let Some(path) = mutation_path(action) {
                                if !checkpoint.changed_files.contains(&path) {
                                    checkpoint.changed_files.push(path);
                                }
                            }
                        }
                        record_step(
                            &mut checkpoint,
                            iteration,
                            Some(action.clone()),
                            outcome.ok,
                            outcome.summary.clone(),
                            outcome.output.clone(),
                            outcome.duration_ms,
                            event_sink,
                        );
                        checkpoint
                            .history
                            .push(ChatMessage::user(format!("{}\n{}", outcome.summary, outcome.output)));
                        if let Some(directive) = stagnation.observe(action) {
                            checkpoint.history.push(ChatMessage::user(directive));
                        }
                    }
                    Err(e) if e.is_recoverable() => {
                        record_step(&mut checkpoint, iteration, Some(action.clone()), false, e.to_string(), String::new(), 0, event_sink);
                        checkpoint.history.push(ChatMessage::user(format!("Action failed: {e}")));
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        checkpoint.file_writes_used = budgets.file_writes_used;
        checkpoint.command_runs_used = budgets.command_runs_used;
        checkpoint.rollback_snapshots = journal.snapshots().to_vec();
        checkpoint.change_journal = journal.entries.clone();
        checkpoint.updated_at = Utc::now();

        if iteration % CHECKPOINT_INTERVAL == 0 && !persistence_degraded {
            meta.updated_at = checkpoint.updated_at;
            meta.last_iteration = iteration;
            meta.status = checkpoint.status;
            if let Err(e) = checkpoint_store.save(meta, &checkpoint) {
                tracing::warn!(error = %e, "checkpoint persistence degraded; continuing without further saves");
                persistence_degraded = true;
            }
        }
    }

    checkpoint.updated_at = Utc::now();
    meta.updated_at = checkpoint.updated_at;
    meta.last_iteration = checkpoint.last_iteration;
    meta.status = checkpoint.status;
    if !persistence_degraded {
        if let Err(e) = checkpoint_store.save(meta, &checkpoint) {
            tracing::warn!(error = %e, "final checkpoint persistence degraded");
        }
    }

    let result = to_run_result(&checkpoint, started_at);
    Ok(RunOutcome { result, checkpoint })
}

/// Drive the decision parser's retry loop: up to `MAX_ATTEMPTS` attempts
/// shared between malformed-output retries and retryable model-transport
/// failures. Each failure raises the context degrade level by one step
/// (tightening the budget passed to `build_window` on the next attempt).
/// Non-retryable transport errors propagate immediately. On exhausting all
/// attempts without a usable decision, falls back to a safe `list_tree`
/// action rather than ending the run.
async fn request_decision(
    chat: &Arc<dyn ChatComplete>,
    history: &[ChatMessage],
) -> Result<(cagent_decision::ParsedDecision, String), AgentError> {
    let mut attempt_history = history.to_vec();
    let mut degrade_level = 0u32;
    for attempt in 0..MAX_ATTEMPTS {
        let window = build_window(&attempt_history, cagent_context::budget_for_attempt(degrade_level));
        match chat.complete(&window).await {
            Ok(raw) => match parse_decision(&raw) {
                Ok(decision) => return Ok((decision, raw)),
                Err(e) => {
                    if attempt + 1 == MAX_ATTEMPTS {
                        return Ok(safe_fallback_decision(&e.to_string()));
                    }
                    degrade_level += 1;
                    attempt_history.push(ChatMessage::assistant(raw));
                    attempt_history.push(ChatMessage::user(format!(
                        "Your last response could not be parsed: {e}. Respond with a single JSON \
                         object matching the action schema and nothing else."
                    )));
                }
            },
            Err(e) if !e.is_recoverable() => return Err(e),
            Err(AgentError::ModelTransportFailure(msg)) => {
                if attempt + 1 == MAX_ATTEMPTS {
                    return Ok(safe_fallback_decision(&msg));
                }
                degrade_level += 1;
                let backoff = decision_backoff_ms(attempt);
                tracing::warn!(attempt, backoff, %msg, "retrying model request in decision parser");
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }
            Err(e) => return Err(e),
        }
    }
    unreachable!("loop always returns within MAX_ATTEMPTS")
}

/// Exponential backoff for decision-parser retries, capped at
/// `MODEL_BACKOFF_CAP_MS` (6.5s).
fn decision_backoff_ms(attempt: u32) -> u64 {
    let raw = 250u64.saturating_mul(1u64 << attempt.min(16));
    raw.min(MODEL_BACKOFF_CAP_MS)
}

/// The degraded decision emitted once the parser exhausts all retry
/// attempts: a harmless, read-only action that keeps the run alive instead
/// of ending it on a string of malformed or unreachable model turns.
fn safe_fallback_decision(reason: &str) -> (cagent_decision::ParsedDecision, String) {
    let decision = cagent_decision::ParsedDecision {
        thinking: Some(format!(
            "Falling back to a safe default action after exhausting decision retries: {reason}"
        )),
        action: cagent_core::Action::ListTree {
            path: None,
            max_depth: Some(4),
        },
    };
    let raw = format!(
        r#"{{"thinking":"fallback after exhausted retries: {reason}","action":{{"type":"list_tree","max_depth":4}}}}"#
    );
    (decision, raw)
}

fn mutation_path(action: &cagent_core::Action) -> Option<String> {
    match action {
        cagent_core::Action::WriteFile { path, .. }
        | cagent_core::Action::AppendFile { path, .. }
        | cagent_core::Action::DeleteFile { path } => Some(path.clone()),
        _ => None,
    }
}

#[allow(clippy::too_many_arguments)]
fn record_step(
    checkpoint: &mut Checkpoint,
    iteration: u32,
    action: Option<cagent_core::Action>,
    ok: bool,
    summary: String,
    output: String,
    duration_ms: u64,
    event_sink: Option<&dyn RunEventSink>,
) {
    checkpoint.steps.push(Step {
        iteration,
        phase: cagent_core::Phase::Action,
        thinking: None,
        action,
        ok,
        summary,
        output: Step::truncated_output(&output),
        duration_ms,
    });
    if let Some(sink) = event_sink {
        sink.on_step(checkpoint.steps.last().expect("just pushed"));
    }
}

fn finalize(
    checkpoint: &mut Checkpoint,
    status: RunStatus,
    summary: &str,
    verification: &[String],
    remaining_work: &[String],
    event_sink: Option<&dyn RunEventSink>,
) {
    checkpoint.status = status;
    checkpoint.steps.push(Step {
        iteration: checkpoint.last_iteration,
        phase: cagent_core::Phase::Verification,
        thinking: None,
        action: Some(cagent_core::Action::Final {
            summary: summary.to_string(),
            verification: verification.to_vec(),
            remaining_work: remaining_work.to_vec(),
        }),
        ok: true,
        summary: summary.to_string(),
        output: String::new(),
        duration_ms: 0,
    });
    if let Some(sink) = event_sink {
        sink.on_step(checkpoint.steps.last().expect("just pushed"));
    }
}

fn to_run_result(checkpoint: &Checkpoint, started_at: chrono::DateTime<Utc>) -> RunResult {
    let (summary, verification, remaining_work) = checkpoint
        .steps
        .iter()
        .rev()
        .find_map(|s| match &s.action {
            Some(cagent_core::Action::Final {
                summary,
                verification,
                remaining_work,
            }) => Some((summary.clone(), verification.clone(), remaining_work.clone())),
            _ => None,
        })
        .unwrap_or_else(|| (default_summary(checkpoint.status), vec![], vec![]));

    let commands_run: Vec<Command> = checkpoint
        .steps
        .iter()
        .filter_map(|s| match &s.action {
            Some(cagent_core::Action::RunCommand { command }) => Some(command.clone()),
            _ => None,
        })
        .collect();

    RunResult {
        status: checkpoint.status,
        run_id: checkpoint.run_id.clone(),
        resumed_from_run_id: checkpoint.resumed_from_run_id.clone(),
        started_at,
        ended_at: checkpoint.updated_at,
        summary,
        verification,
        remaining_work,
        steps: checkpoint.steps.clone(),
        verification_checks: checkpoint.verification_checks.clone(),
        preflight_checks: checkpoint.preflight_checks.clone(),
        files_changed: checkpoint.changed_files.clone(),
        commands_run,
        rollback_summary: vec![],
        change_journal: checkpoint.change_journal.clone(),
        clarification_questions: checkpoint.clarification_questions.clone(),
        clarification_answers: checkpoint.clarification_answers.clone(),
        project_digest: checkpoint.project_digest.clone(),
        intelligence_snapshot: checkpoint.intelligence_snapshot.clone(),
        error: if checkpoint.status == RunStatus::Failed {
            Some("the run ended with an unrecovered error; see the last step for details".into())
        } else {
            None
        },
    }
}

fn default_summary(status: RunStatus) -> String {
    match status {
        RunStatus::Canceled => "run was canceled before completion".into(),
        RunStatus::MaxIterations => "run stopped after reaching the iteration limit".into(),
        RunStatus::VerificationFailed => "run stopped because verification did not pass".into(),
        RunStatus::NeedsClarification => "run is waiting on clarification before making changes".into(),
        RunStatus::Failed => "run failed".into(),
        RunStatus::Completed | RunStatus::InProgress => String::new(),
    }
}

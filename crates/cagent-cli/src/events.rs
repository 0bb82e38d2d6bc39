use cagent_core::{RunResult, Step, VerificationCheck};
use cagent_engine::RunEventSink;
use serde::Serialize;
use serde_json::json;

/// One line of the NDJSON run protocol emitted on stdout: a `started`
/// event, a `step`/`verification` event per action as the engine executes
/// it (via [`NdjsonEventSink`]), and a single terminal `completed`/`failed`
/// event — structured logs go to stderr via `tracing` instead.
#[derive(Serialize)]
struct Event<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(flatten)]
    data: serde_json::Value,
}

fn emit(kind: &str, data: serde_json::Value) {
    let event = Event { kind, data };
    match serde_json::to_string(&event) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::warn!("failed to serialize event: {e}"),
    }
}

pub fn emit_started(run_id: &str, goal: &str) {
    emit("started", json!({ "run_id": run_id, "goal": goal }));
}

pub fn emit_status(run_id: &str, status: &str) {
    emit("status", json!({ "run_id": run_id, "status": status }));
}

/// Surfaces the memory store's conflict count as structured data instead
/// of only the folded warning string the evidence gate consumes, so a
/// caller watching the NDJSON stream can tell how many conflicts were
/// found, not just whether at least one exists.
pub fn emit_memory_diagnostics(run_id: &str, conflict_count: usize, requires_verification_before_mutation: bool) {
    emit(
        "memory_diagnostics",
        json!({
            "run_id": run_id,
            "conflict_count": conflict_count,
            "requires_verification_before_mutation": requires_verification_before_mutation,
        }),
    );
}

/// Streams `step`/`verification` events to stdout as the iteration loop
/// records them, instead of waiting for the run to finish and replaying
/// the finished `RunResult` afterward.
pub struct NdjsonEventSink {
    run_id: String,
}

impl NdjsonEventSink {
    pub fn new(run_id: String) -> Self {
        Self { run_id }
    }
}

impl RunEventSink for NdjsonEventSink {
    fn on_step(&self, step: &Step) {
        emit(
            "step",
            json!({
                "run_id": self.run_id,
                "iteration": step.iteration,
                "phase": step.phase,
                "ok": step.ok,
                "summary": step.summary,
                "action": step.action,
            }),
        );
    }

    fn on_verification(&self, check: &VerificationCheck) {
        emit(
            "verification",
            json!({
                "run_id": self.run_id,
                "attempt": check.attempt,
                "command": check.command.display(),
                "ok": check.ok,
            }),
        );
    }
}

/// Emit only the terminal `completed`/`failed` event — steps and
/// verification checks were already streamed live via
/// [`NdjsonEventSink`] as the run executed.
pub fn emit_result(result: &RunResult) {
    let terminal_kind = if result.status == cagent_core::RunStatus::Completed {
        "completed"
    } else {
        "failed"
    };
    emit(
        terminal_kind,
        json!({
            "run_id": result.run_id,
            "status": result.status,
            "summary": result.summary,
            "remaining_work": result.remaining_work,
            "files_changed": result.files_changed,
        }),
    );
}

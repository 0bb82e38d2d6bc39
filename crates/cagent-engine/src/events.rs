use cagent_core::{Step, VerificationCheck};

/// Callback surface the iteration loop drives as it runs, so a caller (the
/// CLI's NDJSON writer, most directly) can stream progress instead of
/// waiting for the whole run to finish and replaying `RunResult` after the
/// fact.
pub trait RunEventSink: Send + Sync {
    fn on_step(&self, step: &Step);
    fn on_verification(&self, check: &VerificationCheck);
}

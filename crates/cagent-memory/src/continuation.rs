use std::path::PathBuf;

use cagent_checkpoint::atomic::{read_json, write_json_atomic};
use cagent_core::constants::{CONTINUATION_MAX_ITEMS, CONTINUATION_SUMMARY_MAX_CHARS};
use cagent_core::{AgentError, ContinuationPacket, Evidence, ExecutionMode, MemoryEntry, MemoryType};
use chrono::Utc;

/// A workspace keeps exactly one continuation packet: the latest run's
/// summary, pending work, and suggested next actions, overwritten on
/// every completed run so the next invocation can pick up where the last
/// one left off without replaying full history.
pub struct ContinuationStore {
    path: PathBuf,
}

impl ContinuationStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> Result<Option<ContinuationPacket>, AgentError> {
        if !self.path.exists() {
            return Ok(None);
        }
        read_json(&self.path).map(Some)
    }

    pub fn save(&self, mut packet: ContinuationPacket) -> Result<(), AgentError> {
        packet.summary.truncate(CONTINUATION_SUMMARY_MAX_CHARS);
        packet.pending_work.truncate(CONTINUATION_MAX_ITEMS);
        packet.next_actions.truncate(CONTINUATION_MAX_ITEMS);
        write_json_atomic(&self.path, &packet)
    }
}

/// Mirror `packet` into the memory store's own entry list as a
/// `continuation`-typed entry with `run_summary` evidence, so it is
/// retrievable alongside other memories and subject to the same
/// confidence/eviction rules, in addition to living as the standalone
/// "latest continuation" record.
pub fn continuation_as_memory_entry(packet: &ContinuationPacket, workspace: &str) -> MemoryEntry {
    let now = Utc::now();
    MemoryEntry {
        id: ulid::Ulid::new().to_string(),
        workspace: workspace.to_string(),
        kind: MemoryType::Continuation,
        title: format!("continuation: {}", packet.goal),
        content: packet.summary.clone(),
        tags: vec!["continuation".into()],
        pinned: false,
        success_score: 0.7,
        confidence_score: 0.7,
        use_count: 0,
        created_at: now,
        updated_at: now,
        last_used_at: None,
        last_validated_at: Some(now),
        invalidated_at: None,
        evidence: vec![Evidence {
            kind: "run_summary".into(),
            source: packet.run_id.clone(),
            summary: packet.summary.clone(),
            created_at: now,
        }],
        supersedes: vec![],
        contradicted_by: vec![],
        dedupe_key: String::new(),
    }
}

pub fn build_packet(
    run_id: impl Into<String>,
    execution_mode: ExecutionMode,
    goal: impl Into<String>,
    summary: impl Into<String>,
    pending_work: Vec<String>,
    next_actions: Vec<String>,
) -> ContinuationPacket {
    ContinuationPacket {
        run_id: run_id.into(),
        execution_mode,
        goal: goal.into(),
        summary: summary.into(),
        pending_work,
        next_actions,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContinuationStore::new(dir.path().join("continuation.json"));
        let packet = build_packet(
            "run-1",
            ExecutionMode::Single,
            "ship the feature",
            "implemented core logic, tests still pending",
            vec!["write integration tests".into()],
            vec!["run the test suite".into()],
        );
        store.save(packet).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.run_id, "run-1");
        assert_eq!(loaded.pending_work.len(), 1);
    }

    #[test]
    fn load_returns_none_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContinuationStore::new(dir.path().join("continuation.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn mirrors_into_a_continuation_typed_memory_entry_with_run_summary_evidence() {
        let packet = build_packet(
            "run-1",
            ExecutionMode::Single,
            "ship the feature",
            "implemented core logic, tests still pending",
            vec!["write integration tests".into()],
            vec![],
        );
        let entry = continuation_as_memory_entry(&packet, "/tmp/work");
        assert_eq!(entry.kind, MemoryType::Continuation);
        assert_eq!(entry.evidence.len(), 1);
        assert_eq!(entry.evidence[0].kind, "run_summary");
        assert_eq!(entry.evidence[0].source, "run-1");
    }

    #[test]
    fn save_truncates_oversized_summary() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContinuationStore::new(dir.path().join("continuation.json"));
        let packet = build_packet(
            "run-1",
            ExecutionMode::Single,
            "goal",
            "x".repeat(CONTINUATION_SUMMARY_MAX_CHARS + 500),
            vec![],
            vec![],
        );
        store.save(packet).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.summary.len(), CONTINUATION_SUMMARY_MAX_CHARS);
    }
}

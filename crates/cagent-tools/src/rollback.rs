use std::path::Path;

use cagent_core::{ChangeJournalEntry, FileSnapshot, JournalOp};
use chrono::Utc;

/// Append-only mutation journal plus the one-snapshot-per-path rollback
/// set for a run. A path's first mutation captures its pre-run state;
/// later mutations of the same path reuse that snapshot so rollback
/// always restores the path to how the run found it, not to an
/// intermediate state.
#[derive(Debug, Clone, Default)]
pub struct RollbackJournal {
    pub entries: Vec<ChangeJournalEntry>,
    snapshots: Vec<FileSnapshot>,
}

impl RollbackJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rehydrate a journal from a loaded checkpoint so a resumed run keeps
    /// rolling back to the state the run originally found, not to
    /// whatever the workspace looked like when the resume started.
    pub fn from_existing(snapshots: Vec<FileSnapshot>, entries: Vec<ChangeJournalEntry>) -> Self {
        Self { entries, snapshots }
    }

    /// Capture the pre-mutation state of `path` if this is the first time
    /// the journal has seen it this run.
    pub fn snapshot_if_new(&mut self, path: &Path, rel_path: &str) {
        if self.snapshots.iter().any(|s| s.path == rel_path) {
            return;
        }
        let existed = path.exists();
        let previous_content = if existed {
            std::fs::read_to_string(path).ok()
        } else {
            None
        };
        self.snapshots.push(FileSnapshot {
            path: rel_path.to_string(),
            existed,
            previous_content,
        });
    }

    pub fn record(&mut self, op: JournalOp, rel_path: &str, details: impl Into<String>) {
        self.entries.push(ChangeJournalEntry {
            op,
            path: rel_path.to_string(),
            timestamp: Utc::now(),
            details: details.into(),
        });
    }

    pub fn snapshots(&self) -> &[FileSnapshot] {
        &self.snapshots
    }

    /// Restore every snapshotted path to its pre-run state, in reverse
    /// mutation order. Best-effort: a failure restoring one path is
    /// recorded and does not stop the rest.
    pub fn rollback_all(&self, workspace: &Path) -> Vec<String> {
        let mut summary = Vec::new();
        for snapshot in self.snapshots.iter().rev() {
            let abs = workspace.join(&snapshot.path);
            let result = if snapshot.existed {
                match &snapshot.previous_content {
                    Some(content) => std::fs::write(&abs, content),
                    None => continue,
                }
            } else {
                match std::fs::remove_file(&abs) {
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    other => other,
                }
            };
            match result {
                Ok(()) => summary.push(format!("restored {}", snapshot.path)),
                Err(e) => {
                    tracing::warn!(path = %snapshot.path, error = %e, "rollback failed to restore path");
                    summary.push(format!("failed to restore {}: {e}", snapshot.path));
                }
            }
        }
        summary
    }
}

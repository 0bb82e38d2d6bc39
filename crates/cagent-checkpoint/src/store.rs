use std::path::{Path, PathBuf};

use cagent_core::constants::CHECKPOINT_STALE_SECS;
use cagent_core::{AgentError, Checkpoint, RunMeta, RunStatus};
use chrono::Utc;

use crate::atomic::{read_json, write_json_atomic};
use crate::lock::RunLock;

/// On-disk resumable run state under `<root>/<resume_key>/<run_id>/`:
/// `meta.json` (cheap-to-scan summary), `checkpoint.json` (full state),
/// and `events.ndjson` (append-only step log for the CLI's streaming
/// replay and for post-hoc debugging).
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn run_dir(&self, resume_key: &str, run_id: &str) -> PathBuf {
        path(&self.root, resume_key, run_id)
    }

    /// Persist `meta` and `checkpoint` atomically under an exclusive lock.
    pub fn save(&self, meta: &RunMeta, checkpoint: &Checkpoint) -> Result<(), AgentError> {
        let dir = self.run_dir(&meta.resume_key, &meta.run_id);
        std::fs::create_dir_all(&dir)
            .map_err(|e| AgentError::StorageDegraded(format!("failed to create {}: {e}", dir.display())))?;
        let _lock = RunLock::acquire(&dir.join(".lock"))?;

        write_json_atomic(&dir.join("meta.json"), meta)?;
        write_json_atomic(&dir.join("checkpoint.json"), checkpoint)?;
        tracing::debug!(run_id = %meta.run_id, iteration = checkpoint.last_iteration, "saved checkpoint");
        Ok(())
    }

    /// Append one NDJSON event line (already-serialized JSON text) to the
    /// run's event log, for CLI streaming and audit.
    pub fn append_event(&self, resume_key: &str, run_id: &str, event_json: &str) -> Result<(), AgentError> {
        use std::io::Write as _;
        let dir = self.run_dir(resume_key, run_id);
        std::fs::create_dir_all(&dir)
            .map_err(|e| AgentError::StorageDegraded(format!("failed to create {}: {e}", dir.display())))?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("events.ndjson"))
            .map_err(|e| AgentError::StorageDegraded(format!("failed to open events log: {e}")))?;
        writeln!(file, "{event_json}")
            .map_err(|e| AgentError::StorageDegraded(format!("failed to append event: {e}")))?;
        Ok(())
    }

    pub fn load_checkpoint(&self, resume_key: &str, run_id: &str) -> Result<Checkpoint, AgentError> {
        read_json(&self.run_dir(resume_key, run_id).join("checkpoint.json"))
    }

    pub fn load_meta(&self, resume_key: &str, run_id: &str) -> Result<RunMeta, AgentError> {
        read_json(&self.run_dir(resume_key, run_id).join("meta.json"))
    }

    /// Find the most recently updated in-progress, non-stale run under
    /// `resume_key`, if any.
    pub fn find_resumable(&self, resume_key: &str) -> Result<Option<RunMeta>, AgentError> {
        let key_dir = self.root.join(sanitize(resume_key));
        if !key_dir.exists() {
            return Ok(None);
        }

        let mut candidates = Vec::new();
        let entries = std::fs::read_dir(&key_dir)
            .map_err(|e| AgentError::StorageDegraded(format!("failed to scan {}: {e}", key_dir.display())))?;
        for entry in entries.filter_map(|e| e.ok()) {
            let meta_path = entry.path().join("meta.json");
            if !meta_path.exists() {
                continue;
            }
            if let Ok(meta) = read_json::<RunMeta>(&meta_path) {
                candidates.push(meta);
            }
        }

        let now = Utc::now();
        candidates.retain(|m| {
            m.status == RunStatus::InProgress
                && (now - m.updated_at).num_seconds() <= CHECKPOINT_STALE_SECS
        });
        candidates.sort_by_key(|m| m.updated_at);
        Ok(candidates.pop())
    }

    /// Like `find_resumable`, but scans every resume-key directory under
    /// the root instead of one. Used when the caller knows the workspace
    /// (the store root is already scoped to it) but not the exact goal
    /// that produced the resume key.
    pub fn find_resumable_any(&self) -> Result<Option<RunMeta>, AgentError> {
        let mut best: Option<RunMeta> = None;
        for key_dir in self.resume_key_dirs()? {
            let key = key_dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            if let Some(candidate) = self.find_resumable(&key)? {
                if best.as_ref().is_none_or(|b| candidate.updated_at > b.updated_at) {
                    best = Some(candidate);
                }
            }
        }
        Ok(best)
    }

    /// Locate a run's meta by id alone, scanning every resume-key
    /// directory. Used for explicit `--run-id` resume when the original
    /// goal (and hence the resume key) isn't known up front.
    pub fn find_meta_by_run_id(&self, run_id: &str) -> Result<Option<RunMeta>, AgentError> {
        for key_dir in self.resume_key_dirs()? {
            let meta_path = key_dir.join(sanitize(run_id)).join("meta.json");
            if meta_path.exists() {
                if let Ok(meta) = read_json::<RunMeta>(&meta_path) {
                    return Ok(Some(meta));
                }
            }
        }
        Ok(None)
    }

    fn resume_key_dirs(&self) -> Result<Vec<PathBuf>, AgentError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&self.root)
            .map_err(|e| AgentError::StorageDegraded(format!("failed to scan {}: {e}", self.root.display())))?;
        Ok(entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect())
    }
}

fn path(root: &Path, resume_key: &str, run_id: &str) -> PathBuf {
    root.join(sanitize(resume_key)).join(sanitize(run_id))
}

/// Replace path separators so a resume key or run id can never escape
/// the checkpoint root via directory traversal.
fn sanitize(segment: &str) -> String {
    segment.replace(['/', '\\', '\0'], "_")
}

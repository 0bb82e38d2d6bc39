use std::path::Path;

use cagent_core::AgentError;
use serde::Serialize;

/// Serialize `value` and write it to `path` atomically: write to a
/// temp file in the same directory, then rename over the destination.
/// A crash mid-write leaves the previous checkpoint intact rather than a
/// half-written one.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), AgentError> {
    let dir = path.parent().ok_or_else(|| {
        AgentError::StorageDegraded(format!("checkpoint path has no parent: {}", path.display()))
    })?;
    std::fs::create_dir_all(dir)
        .map_err(|e| AgentError::StorageDegraded(format!("failed to create {}: {e}", dir.display())))?;

    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| AgentError::StorageDegraded(format!("failed to serialize checkpoint: {e}")))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| AgentError::StorageDegraded(format!("failed to create temp file: {e}")))?;
    std::io::Write::write_all(&mut tmp, &json)
        .map_err(|e| AgentError::StorageDegraded(format!("failed to write temp file: {e}")))?;
    tmp.persist(path)
        .map_err(|e| AgentError::StorageDegraded(format!("failed to rename into place: {e}")))?;
    Ok(())
}

pub fn read_json<T: for<'de> serde::Deserialize<'de>>(path: &Path) -> Result<T, AgentError> {
    let bytes = std::fs::read(path)
        .map_err(|e| AgentError::StorageDegraded(format!("failed to read {}: {e}", path.display())))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AgentError::StorageDegraded(format!("corrupt checkpoint file {}: {e}", path.display())))
}

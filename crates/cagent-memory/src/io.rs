use cagent_core::{AgentError, MemoryEntry};

use crate::store::MemoryStore;

/// Serialize every entry in the store as pretty JSON, for the `memory
/// export` CLI subcommand.
pub fn export_json(store: &MemoryStore) -> Result<String, AgentError> {
    serde_json::to_string_pretty(store.all())
        .map_err(|e| AgentError::StorageDegraded(format!("failed to serialize memory export: {e}")))
}

/// Parse a JSON array of memory entries and merge each into the store
/// (same dedupe/cap rules as runtime `add_or_merge`), for the `memory
/// import` CLI subcommand. Returns the number of entries imported.
pub fn import_json(store: &mut MemoryStore, json: &str) -> Result<usize, AgentError> {
    let entries: Vec<MemoryEntry> = serde_json::from_str(json)
        .map_err(|e| AgentError::InvalidRequest(format!("invalid memory export file: {e}")))?;
    let count = entries.len();
    for entry in entries {
        store.add_or_merge(entry);
    }
    Ok(count)
}

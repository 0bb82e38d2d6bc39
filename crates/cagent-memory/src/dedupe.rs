use cagent_core::MemoryType;
use sha2::{Digest, Sha256};

/// Stable key used to recognize "the same memory" across runs: same
/// workspace, type, normalized title, and content. Entries that restate
/// the same lesson with different wording are treated as distinct unless
/// the content also matches, so evolving a fix pattern's phrasing creates
/// a new candidate rather than silently overwriting the old one.
pub fn dedupe_key(workspace: &str, kind: MemoryType, title: &str, content: &str) -> String {
    let normalized_title = title.trim().to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(workspace.as_bytes());
    hasher.update(b"\0");
    hasher.update(format!("{kind:?}"));
    hasher.update(b"\0");
    hasher.update(normalized_title.as_bytes());
    hasher.update(b"\0");
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

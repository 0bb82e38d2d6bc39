use std::path::Path;

use cagent_core::{AgentError, JournalOp};

use crate::rollback::RollbackJournal;

/// Overwrite (creating parent directories as needed) and journal `path`.
pub fn write_file(
    workspace: &Path,
    abs_path: &Path,
    rel_path: &str,
    content: &str,
    journal: &mut RollbackJournal,
) -> Result<(), AgentError> {
    journal.snapshot_if_new(abs_path, rel_path);
    if let Some(parent) = abs_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| AgentError::ToolFailure(format!("failed to create {}: {e}", parent.display())))?;
    }
    std::fs::write(abs_path, content)
        .map_err(|e| AgentError::ToolFailure(format!("failed to write {}: {e}", abs_path.display())))?;
    journal.record(JournalOp::Write, rel_path, format!("{} bytes", content.len()));
    let _ = workspace;
    Ok(())
}

/// Append to `path`, creating it (and parent directories) if absent.
pub fn append_file(
    workspace: &Path,
    abs_path: &Path,
    rel_path: &str,
    content: &str,
    journal: &mut RollbackJournal,
) -> Result<(), AgentError> {
    use std::io::Write as _;

    journal.snapshot_if_new(abs_path, rel_path);
    if let Some(parent) = abs_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| AgentError::ToolFailure(format!("failed to create {}: {e}", parent.display())))?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(abs_path)
        .map_err(|e| AgentError::ToolFailure(format!("failed to open {}: {e}", abs_path.display())))?;
    file.write_all(content.as_bytes())
        .map_err(|e| AgentError::ToolFailure(format!("failed to append to {}: {e}", abs_path.display())))?;
    journal.record(JournalOp::Append, rel_path, format!("{} bytes", content.len()));
    let _ = workspace;
    Ok(())
}

/// Delete `path` if it exists; deleting an already-absent path is not an
/// error, keeping the mutation tools idempotent.
pub fn delete_file(
    workspace: &Path,
    abs_path: &Path,
    rel_path: &str,
    journal: &mut RollbackJournal,
) -> Result<(), AgentError> {
    journal.snapshot_if_new(abs_path, rel_path);
    match std::fs::remove_file(abs_path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(AgentError::ToolFailure(format!(
                "failed to delete {}: {e}",
                abs_path.display()
            )))
        }
    }
    journal.record(JournalOp::Delete, rel_path, "removed");
    let _ = workspace;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_file_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let abs = dir.path().join("nested/dir/file.txt");
        let mut journal = RollbackJournal::new();
        write_file(dir.path(), &abs, "nested/dir/file.txt", "hi", &mut journal).unwrap();
        assert_eq!(std::fs::read_to_string(&abs).unwrap(), "hi");
        assert_eq!(journal.entries.len(), 1);
    }

    #[test]
    fn append_file_creates_then_appends() {
        let dir = tempfile::tempdir().unwrap();
        let abs = dir.path().join("log.txt");
        let mut journal = RollbackJournal::new();
        append_file(dir.path(), &abs, "log.txt", "a", &mut journal).unwrap();
        append_file(dir.path(), &abs, "log.txt", "b", &mut journal).unwrap();
        assert_eq!(std::fs::read_to_string(&abs).unwrap(), "ab");
    }

    #[test]
    fn delete_file_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let abs = dir.path().join("gone.txt");
        let mut journal = RollbackJournal::new();
        assert!(delete_file(dir.path(), &abs, "gone.txt", &mut journal).is_ok());
        assert!(delete_file(dir.path(), &abs, "gone.txt", &mut journal).is_ok());
    }
}

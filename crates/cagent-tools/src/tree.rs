use std::path::Path;

use cagent_core::AgentError;

const IGNORED_DIRS: &[&str] = &[".git", "node_modules", "target", "dist", "build", ".venv"];

/// Render a depth-limited directory tree rooted at `path` (workspace-
/// relative or `.` for the workspace root itself).
pub fn list_tree(workspace: &Path, path: &Path, max_depth: u32) -> Result<String, AgentError> {
    if !path.exists() {
        return Err(AgentError::ToolFailure(format!(
            "path does not exist: {}",
            path.display()
        )));
    }
    let mut out = String::new();
    walk(workspace, path, 0, max_depth, &mut out)?;
    if out.is_empty() {
        out.push_str("(empty)");
    }
    Ok(out)
}

fn walk(
    workspace: &Path,
    dir: &Path,
    depth: u32,
    max_depth: u32,
    out: &mut String,
) -> Result<(), AgentError> {
    if depth > max_depth {
        return Ok(());
    }
    if dir.is_file() {
        out.push_str(&rel(workspace, dir));
        out.push('\n');
        return Ok(());
    }
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| AgentError::ToolFailure(format!("failed to read {}: {e}", dir.display())))?
        .filter_map(|e| e.ok())
        .collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        if IGNORED_DIRS.contains(&name.as_str()) {
            continue;
        }
        let child = entry.path();
        let indent = "  ".repeat(depth as usize);
        if child.is_dir() {
            out.push_str(&format!("{indent}{name}/\n"));
            walk(workspace, &child, depth + 1, max_depth, out)?;
        } else {
            out.push_str(&format!("{indent}{name}\n"));
        }
    }
    Ok(())
}

fn rel(workspace: &Path, path: &Path) -> String {
    path.strip_prefix(workspace)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_nested_files_within_depth() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "").unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "").unwrap();

        let out = list_tree(dir.path(), dir.path(), 5).unwrap();
        assert!(out.contains("Cargo.toml"));
        assert!(out.contains("src/"));
        assert!(out.contains("main.rs"));
    }

    #[test]
    fn skips_ignored_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        std::fs::write(dir.path().join("node_modules/pkg/index.js"), "").unwrap();

        let out = list_tree(dir.path(), dir.path(), 5).unwrap();
        assert!(!out.contains("index.js"));
    }

    #[test]
    fn respects_max_depth() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
        std::fs::write(dir.path().join("a/b/c/deep.txt"), "").unwrap();

        let out = list_tree(dir.path(), dir.path(), 1).unwrap();
        assert!(!out.contains("deep.txt"));
    }
}

use std::path::Path;

use cagent_core::AgentError;
use regex::Regex;

const IGNORED_DIRS: &[&str] = &[".git", "node_modules", "target", "dist", "build", ".venv"];

/// One matching line from `search_files`.
pub struct SearchHit {
    pub path: String,
    pub line_number: usize,
    pub line: String,
}

/// Regex-search the workspace tree for `pattern`, optionally restricted to
/// files whose name matches `glob` (a simple `*`/suffix glob, not a full
/// glob grammar), capped at `max_results` hits.
pub fn search_files(
    workspace: &Path,
    pattern: &str,
    glob: Option<&str>,
    max_results: usize,
) -> Result<Vec<SearchHit>, AgentError> {
    if pattern.is_empty() {
        return Err(AgentError::ToolFailure("search pattern must not be empty".into()));
    }
    let re = Regex::new(pattern)
        .map_err(|e| AgentError::ToolFailure(format!("invalid search pattern: {e}")))?;
    let mut hits = Vec::new();
    walk(workspace, workspace, glob, &re, max_results, &mut hits)?;
    Ok(hits)
}

fn walk(
    workspace: &Path,
    dir: &Path,
    glob: Option<&str>,
    re: &Regex,
    max_results: usize,
    hits: &mut Vec<SearchHit>,
) -> Result<(), AgentError> {
    if hits.len() >= max_results {
        return Ok(());
    }
    let entries = std::fs::read_dir(dir)
        .map_err(|e| AgentError::ToolFailure(format!("failed to read {}: {e}", dir.display())))?;
    for entry in entries.filter_map(|e| e.ok()) {
        if hits.len() >= max_results {
            return Ok(());
        }
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if path.is_dir() {
            if IGNORED_DIRS.contains(&name.as_str()) {
                continue;
            }
            walk(workspace, &path, glob, re, max_results, hits)?;
            continue;
        }
        if let Some(g) = glob {
            if !matches_glob(&name, g) {
                continue;
            }
        }
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        let rel = path
            .strip_prefix(workspace)
            .unwrap_or(&path)
            .to_string_lossy()
            .into_owned();
        for (idx, line) in content.lines().enumerate() {
            if hits.len() >= max_results {
                break;
            }
            if re.is_match(line) {
                hits.push(SearchHit {
                    path: rel.clone(),
                    line_number: idx + 1,
                    line: line.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Minimal glob: `*ext` (suffix match) or an exact filename.
fn matches_glob(name: &str, glob: &str) -> bool {
    if let Some(suffix) = glob.strip_prefix('*') {
        name.ends_with(suffix)
    } else {
        name == glob
    }
}

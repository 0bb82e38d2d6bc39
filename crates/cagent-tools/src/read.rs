use std::path::Path;

use cagent_core::constants::{
    BINARY_FILE_EXTENSIONS, READ_FILE_MAX_BYTES, READ_MANY_FILES_DEFAULT_LINES,
    READ_MANY_FILES_MAX_LINES, READ_MANY_FILES_MAX_PATHS, READ_MANY_FILES_MIN_LINES,
};
use cagent_core::AgentError;

/// True if `path`'s extension is a known binary format the model shouldn't
/// try to read as text.
fn is_binary_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| BINARY_FILE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn clamp_max_lines(max_lines_per_file: Option<u32>) -> u32 {
    max_lines_per_file
        .unwrap_or(READ_MANY_FILES_DEFAULT_LINES)
        .clamp(READ_MANY_FILES_MIN_LINES, READ_MANY_FILES_MAX_LINES)
}

/// Read `path`, optionally slicing to a 1-indexed inclusive line range. A
/// whole-file read is truncated at `READ_FILE_MAX_BYTES`; a ranged read
/// prefixes each line with its 1-based line number.
pub fn read_file(
    path: &Path,
    start_line: Option<u32>,
    end_line: Option<u32>,
) -> Result<String, AgentError> {
    if is_binary_extension(path) {
        return Err(AgentError::ToolFailure(format!(
            "refusing to read binary file: {}",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| AgentError::ToolFailure(format!("failed to read {}: {e}", path.display())))?;

    match (start_line, end_line) {
        (None, None) => {
            if content.len() > READ_FILE_MAX_BYTES {
                let mut truncated = content;
                truncated.truncate(READ_FILE_MAX_BYTES);
                truncated.push_str("\n[truncated]");
                Ok(truncated)
            } else {
                Ok(content)
            }
        }
        (start, end) => {
            let start = start.unwrap_or(1).max(1) as usize;
            let lines: Vec<&str> = content.lines().collect();
            let end = end.map(|e| e as usize).unwrap_or(lines.len()).min(lines.len());
            if start > end || start > lines.len() {
                return Ok(String::new());
            }
            Ok(lines[start - 1..end]
                .iter()
                .enumerate()
                .map(|(i, line)| format!("{}: {line}", start + i))
                .collect::<Vec<_>>()
                .join("\n"))
        }
    }
}

/// Read several files, each rendered under a `--- path ---` header so the
/// model can attribute content without a structured wrapper. Caps the
/// number of paths and clamps `max_lines_per_file`; per-file failures are
/// reported inline and never abort the rest of the call.
pub fn read_many_files(
    workspace: &Path,
    paths: &[std::path::PathBuf],
    rel_paths: &[String],
    max_lines_per_file: Option<u32>,
) -> String {
    let max_lines = clamp_max_lines(max_lines_per_file) as usize;
    let mut out = String::new();
    for (abs, rel) in paths.iter().zip(rel_paths).take(READ_MANY_FILES_MAX_PATHS) {
        out.push_str(&format!("--- {rel} ---\n"));
        if is_binary_extension(abs) {
            out.push_str("[skipped: binary file]");
        } else {
            match std::fs::read_to_string(abs) {
                Ok(content) => {
                    let rendered = content.lines().take(max_lines).collect::<Vec<_>>().join("\n");
                    out.push_str(&rendered);
                }
                Err(e) => out.push_str(&format!("[error reading file: {e}]")),
            }
        }
        out.push_str("\n\n");
    }
    if paths.len() > READ_MANY_FILES_MAX_PATHS {
        out.push_str(&format!(
            "[{} additional path(s) ignored: limit is {READ_MANY_FILES_MAX_PATHS}]",
            paths.len() - READ_MANY_FILES_MAX_PATHS
        ));
    }
    let _ = workspace;
    out
}

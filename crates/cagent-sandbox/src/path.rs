use std::path::{Path, PathBuf};

use cagent_core::{constants::PATH_MAX_CHARS, AgentError};

/// Paths the model may never write to, relative to the workspace root.
/// `dir/**` matches the directory and everything under it; a leading or
/// trailing `*` is a prefix/suffix match; anything else is exact.
const PROTECTED_PATH_GLOBS: &[&str] = &[
    ".git/**",
    ".ssh/**",
    ".env*",
    "*.pem",
    "*.key",
    "secrets/**",
    ".tmp/approved-workspaces.json",
    ".tmp/agent-runs/**",
    ".tmp/agent-memory/**",
];

/// Whether `rel_path` (workspace-relative, forward-slash separated) falls
/// under a write-denied path.
pub fn is_protected(rel_path: &str) -> bool {
    let normalized = rel_path.replace('\\', "/");
    PROTECTED_PATH_GLOBS.iter().any(|glob| glob_matches(glob, &normalized))
}

fn glob_matches(glob: &str, candidate: &str) -> bool {
    if let Some(dir) = glob.strip_suffix("/**") {
        return candidate == dir || candidate.starts_with(&format!("{dir}/"));
    }
    if let Some(ext) = glob.strip_prefix('*') {
        return candidate.ends_with(ext);
    }
    if let Some(prefix) = glob.strip_suffix('*') {
        return candidate.starts_with(prefix);
    }
    candidate == glob
}

/// Resolve `requested` (a path the model supplied, relative or absolute)
/// against `workspace`, rejecting anything that would escape it.
///
/// Mirrors the restricted-root resolution the process sandbox uses for
/// command cwds: reject absolute paths outside the root up front, then
/// lexically normalize `.`/`..` components (no filesystem access, so a
/// nonexistent target path can still be validated before a write) and
/// re-check containment after normalization.
pub fn resolve_in_workspace(workspace: &Path, requested: &str) -> Result<PathBuf, AgentError> {
    if requested.is_empty() {
        return Err(AgentError::PolicyViolation("empty path".into()));
    }
    if requested.len() > PATH_MAX_CHARS {
        return Err(AgentError::PolicyViolation(format!(
            "path exceeds {PATH_MAX_CHARS} characters"
        )));
    }
    if requested.contains('\0') {
        return Err(AgentError::PolicyViolation("path contains NUL byte".into()));
    }
    if let Some(segment) = denied_segment(requested) {
        tracing::warn!(requested, %segment, "path resolution rejected: denied segment");
        return Err(AgentError::PolicyViolation(format!(
            "denied unsafe path segment '{segment}'"
        )));
    }

    let candidate = Path::new(requested);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        workspace.join(candidate)
    };

    let normalized = normalize(&joined);
    let workspace_norm = normalize(workspace);

    if !normalized.starts_with(&workspace_norm) {
        tracing::warn!(requested, "path resolution rejected: escapes workspace");
        return Err(AgentError::PolicyViolation(format!(
            "path '{requested}' escapes workspace"
        )));
    }

    Ok(normalized)
}

/// Reject raw path segments (before any lexical normalization) that could
/// escape the workspace or reach sensitive directories: a literal `..`, the
/// well-known credential directories, or any dotfile segment other than
/// `.github`.
fn denied_segment(requested: &str) -> Option<String> {
    let normalized = requested.replace('\\', "/");
    normalized.split('/').find_map(|segment| {
        let denied = segment == ".."
            || segment == ".git"
            || segment == ".ssh"
            || segment == ".aws"
            || segment == ".gnupg"
            || (segment.starts_with('.') && segment != "." && segment != ".github");
        denied.then(|| segment.to_string())
    })
}

/// Purely lexical `.`/`..` resolution — does not touch the filesystem, so
/// it works for paths that do not exist yet (e.g. a file about to be
/// written).
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        use std::path::Component::*;
        match component {
            CurDir => {}
            ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

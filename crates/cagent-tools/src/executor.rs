use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use cagent_core::constants::{
    LIST_TREE_DEFAULT_DEPTH, LIST_TREE_MAX_DEPTH, LIST_TREE_MIN_DEPTH, SEARCH_DEFAULT_RESULTS,
    SEARCH_MAX_RESULTS, SEARCH_MIN_RESULTS, STEP_OUTPUT_TRUNCATE_BYTES,
};
use cagent_core::text::truncate_bytes;
use cagent_core::{Action, AgentError, Command};
use cagent_sandbox::{is_protected, resolve_in_workspace, run_sandboxed};

use crate::budgets::Budgets;
use crate::read::{read_file, read_many_files};
use crate::rollback::RollbackJournal;
use crate::search::search_files;
use crate::tree::list_tree;
use crate::web_search::WebSearchClient;
use crate::write::{append_file, delete_file, write_file};

/// Outcome of executing one non-`final` action.
#[derive(Debug)]
pub struct ToolOutcome {
    pub ok: bool,
    pub summary: String,
    pub output: String,
    pub duration_ms: u64,
    pub command_run: Option<Command>,
}

fn reject_protected(rel_path: &str) -> Result<(), AgentError> {
    if is_protected(rel_path) {
        tracing::warn!(path = rel_path, "rejected mutation of protected path");
        return Err(AgentError::PolicyViolation(format!(
            "'{rel_path}' is a protected path and cannot be mutated"
        )));
    }
    Ok(())
}

/// Dispatch one action against the workspace. Callers must not pass
/// `Action::Final` here — the engine handles that variant itself since it
/// ends the run rather than producing an observation.
pub async fn execute_action(
    workspace: &Path,
    action: &Action,
    budgets: &mut Budgets,
    journal: &mut RollbackJournal,
    web_search: &Arc<dyn WebSearchClient>,
) -> Result<ToolOutcome, AgentError> {
    let started = Instant::now();
    let (ok, summary, output, command_run) = match action {
        Action::Final { .. } => {
            return Err(AgentError::ToolFailure(
                "final action must be handled by the engine, not the executor".into(),
            ))
        }
        Action::ListTree { path, max_depth } => {
            let rel = path.as_deref().unwrap_or(".");
            let abs = resolve_in_workspace(workspace, rel)?;
            let depth = max_depth
                .unwrap_or(LIST_TREE_DEFAULT_DEPTH)
                .clamp(LIST_TREE_MIN_DEPTH, LIST_TREE_MAX_DEPTH);
            let tree = list_tree(workspace, &abs, depth)?;
            (true, format!("listed tree at {rel}"), tree, None)
        }
        Action::SearchFiles {
            pattern,
            glob,
            max_results,
        } => {
            let limit = max_results
                .map(|n| n as usize)
                .unwrap_or(SEARCH_DEFAULT_RESULTS)
                .clamp(SEARCH_MIN_RESULTS, SEARCH_MAX_RESULTS);
            let hits = search_files(workspace, pattern, glob.as_deref(), limit)?;
            let rendered = hits
                .iter()
                .map(|h| format!("{}:{}: {}", h.path, h.line_number, h.line))
                .collect::<Vec<_>>()
                .join("\n");
            (
                true,
                format!("found {} match(es) for '{pattern}'", hits.len()),
                if rendered.is_empty() { "(no matches)".to_string() } else { rendered },
                None,
            )
        }
        Action::ReadFile {
            path,
            start_line,
            end_line,
        } => {
            let abs = resolve_in_workspace(workspace, path)?;
            let content = read_file(&abs, *start_line, *end_line)?;
            (true, format!("read {path}"), content, None)
        }
        Action::ReadManyFiles {
            paths,
            max_lines_per_file,
        } => {
            let mut abs_paths = Vec::with_capacity(paths.len());
            for p in paths {
                abs_paths.push(resolve_in_workspace(workspace, p)?);
            }
            let content = read_many_files(workspace, &abs_paths, paths, *max_lines_per_file);
            (true, format!("read {} file(s)", paths.len()), content, None)
        }
        Action::WriteFile { path, content } => {
            let abs = resolve_in_workspace(workspace, path)?;
            reject_protected(path)?;
            budgets.check_and_count_write()?;
            write_file(workspace, &abs, path, content, journal)?;
            (true, format!("wrote {path}"), format!("{} bytes written", content.len()), None)
        }
        Action::AppendFile { path, content } => {
            let abs = resolve_in_workspace(workspace, path)?;
            reject_protected(path)?;
            budgets.check_and_count_write()?;
            append_file(workspace, &abs, path, content, journal)?;
            (true, format!("appended to {path}"), format!("{} bytes appended", content.len()), None)
        }
        Action::DeleteFile { path } => {
            let abs = resolve_in_workspace(workspace, path)?;
            reject_protected(path)?;
            budgets.check_and_count_write()?;
            delete_file(workspace, &abs, path, journal)?;
            (true, format!("deleted {path}"), "file removed".to_string(), None)
        }
        Action::RunCommand { command } => {
            budgets.check_and_count_command()?;
            let result = run_sandboxed(workspace, command).await?;
            (
                result.ok(),
                format!("ran `{}`", command.display()),
                result.combined(),
                Some(command.clone()),
            )
        }
        Action::WebSearch { query } => {
            let result = web_search.search(query).await;
            (true, format!("searched for '{query}'"), result, None)
        }
    };

    Ok(ToolOutcome {
        ok,
        summary,
        output: truncate_bytes(&output, STEP_OUTPUT_TRUNCATE_BYTES),
        duration_ms: started.elapsed().as_millis() as u64,
        command_run,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web_search::NoopWebSearchClient;

    fn budgets() -> Budgets {
        Budgets::new(10, 10)
    }

    #[tokio::test]
    async fn write_then_read_round_trips_through_executor() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = budgets();
        let mut j = RollbackJournal::new();
        let client: Arc<dyn WebSearchClient> = Arc::new(NoopWebSearchClient);

        let write = Action::WriteFile {
            path: "out.txt".into(),
            content: "hello".into(),
        };
        let outcome = execute_action(dir.path(), &write, &mut b, &mut j, &client).await.unwrap();
        assert!(outcome.ok);

        let read = Action::ReadFile {
            path: "out.txt".into(),
            start_line: None,
            end_line: None,
        };
        let outcome = execute_action(dir.path(), &read, &mut b, &mut j, &client).await.unwrap();
        assert_eq!(outcome.output, "hello");
    }

    #[tokio::test]
    async fn write_past_budget_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = Budgets::new(0, 10);
        let mut j = RollbackJournal::new();
        let client: Arc<dyn WebSearchClient> = Arc::new(NoopWebSearchClient);

        let write = Action::WriteFile {
            path: "out.txt".into(),
            content: "x".into(),
        };
        let err = execute_action(dir.path(), &write, &mut b, &mut j, &client).await.unwrap_err();
        assert!(matches!(err, AgentError::BudgetExceeded(_)));
    }

    #[tokio::test]
    async fn path_escape_is_rejected_before_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = budgets();
        let mut j = RollbackJournal::new();
        let client: Arc<dyn WebSearchClient> = Arc::new(NoopWebSearchClient);

        let write = Action::WriteFile {
            path: "../outside.txt".into(),
            content: "x".into(),
        };
        let err = execute_action(dir.path(), &write, &mut b, &mut j, &client).await.unwrap_err();
        assert!(matches!(err, AgentError::PolicyViolation(_)));
    }

    #[tokio::test]
    async fn protected_path_write_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = budgets();
        let mut j = RollbackJournal::new();
        let client: Arc<dyn WebSearchClient> = Arc::new(NoopWebSearchClient);

        let write = Action::WriteFile {
            path: ".env".into(),
            content: "SECRET=1".into(),
        };
        let err = execute_action(dir.path(), &write, &mut b, &mut j, &client).await.unwrap_err();
        assert!(matches!(err, AgentError::PolicyViolation(_)));
        assert!(!dir.path().join(".env").exists());
    }

    #[tokio::test]
    async fn final_action_is_rejected_by_executor() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = budgets();
        let mut j = RollbackJournal::new();
        let client: Arc<dyn WebSearchClient> = Arc::new(NoopWebSearchClient);
        let action = Action::Final {
            summary: "done".into(),
            verification: vec![],
            remaining_work: vec![],
        };
        assert!(execute_action(dir.path(), &action, &mut b, &mut j, &client).await.is_err());
    }
}

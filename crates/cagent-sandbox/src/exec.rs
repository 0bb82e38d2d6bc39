use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use cagent_core::constants::{COMMAND_OUTPUT_BUFFER_BYTES, COMMAND_TIMEOUT_SECS};
use cagent_core::{AgentError, Command};
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;

use crate::command::validate_command;
use crate::path::resolve_in_workspace;

/// Environment variables passed through to child processes. Everything
/// else (credentials, proxy config, the caller's shell rc hooks) is
/// stripped so a command can't exfiltrate the orchestrator's own secrets.
const PASSTHROUGH_ENV: &[&str] = &["PATH", "HOME", "LANG", "TERM", "TMPDIR"];

/// Outcome of running one sandboxed command.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ExecOutput {
    pub fn ok(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Combined, human-readable output for logging/feedback.
    pub fn combined(&self) -> String {
        let mut out = String::new();
        if !self.stdout.is_empty() {
            out.push_str(&self.stdout);
        }
        if !self.stderr.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        if self.timed_out {
            out.push_str("\n[command timed out]");
        }
        out
    }
}

/// Validate and execute `command` with `workspace` as the sandbox root.
/// The child's cwd is resolved within the workspace the same way a file
/// path would be; stdout/stderr are captured up to a fixed byte cap each
/// and the process is killed if it runs past the timeout.
pub async fn run_sandboxed(workspace: &Path, command: &Command) -> Result<ExecOutput, AgentError> {
    validate_command(command)?;

    let cwd = match &command.cwd {
        Some(rel) => resolve_in_workspace(workspace, rel)?,
        None => workspace.to_path_buf(),
    };

    let mut child = TokioCommand::new(&command.program);
    child
        .args(&command.args)
        .current_dir(&cwd)
        .env_clear()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    for key in PASSTHROUGH_ENV {
        if let Ok(val) = std::env::var(key) {
            child.env(key, val);
        }
    }
    // Forced regardless of the host environment so tool output stays
    // deterministic and non-interactive; NODE_ENV is never "development".
    child.env("NODE_ENV", "test").env("CI", "1").env("FORCE_COLOR", "0");

    let mut spawned = child
        .spawn()
        .map_err(|e| AgentError::ToolFailure(format!("failed to spawn '{}': {e}", command.program)))?;

    let mut stdout_pipe = spawned.stdout.take();
    let mut stderr_pipe = spawned.stderr.take();

    let read_stdout = async move {
        let mut buf = Vec::new();
        if let Some(pipe) = stdout_pipe.as_mut() {
            let _ = pipe.take(COMMAND_OUTPUT_BUFFER_BYTES as u64).read_to_end(&mut buf).await;
        }
        buf
    };
    let read_stderr = async move {
        let mut buf = Vec::new();
        if let Some(pipe) = stderr_pipe.as_mut() {
            let _ = pipe.take(COMMAND_OUTPUT_BUFFER_BYTES as u64).read_to_end(&mut buf).await;
        }
        buf
    };

    let timeout = Duration::from_secs(COMMAND_TIMEOUT_SECS);
    let run = async {
        let (stdout_buf, stderr_buf) = tokio::join!(read_stdout, read_stderr);
        let status = spawned.wait().await;
        (status, stdout_buf, stderr_buf)
    };

    match tokio::time::timeout(timeout, run).await {
        Ok((status, stdout_buf, stderr_buf)) => {
            let status = status.map_err(|e| {
                AgentError::ToolFailure(format!("failed to wait on '{}': {e}", command.program))
            })?;
            Ok(ExecOutput {
                exit_code: status.code(),
                stdout: String::from_utf8_lossy(&stdout_buf).into_owned(),
                stderr: String::from_utf8_lossy(&stderr_buf).into_owned(),
                timed_out: false,
            })
        }
        Err(_) => {
            let _ = spawned.start_kill();
            Ok(ExecOutput {
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
                timed_out: true,
            })
        }
    }
}

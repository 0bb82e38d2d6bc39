use std::path::Path;

use cagent_core::constants::VERIFICATION_OUTPUT_CLIP_CHARS;
use cagent_core::text::truncate_chars;
use cagent_core::{AgentError, Command, VerificationCheck};
use cagent_sandbox::run_sandboxed;

/// Run every verification command against the workspace in order, not
/// short-circuiting on the first failure so the model sees every failing
/// gate in one feedback pass instead of fixing them one at a time.
///
/// The same runner backs both the mid-run quality gate and the optional
/// preflight pass — callers decide which list the resulting checks are
/// appended to.
pub async fn run_checks(
    workspace: &Path,
    commands: &[Command],
    attempt: u32,
) -> Result<Vec<VerificationCheck>, AgentError> {
    let mut checks = Vec::with_capacity(commands.len());
    for command in commands {
        let started = std::time::Instant::now();
        let result = run_sandboxed(workspace, command).await?;
        if !result.ok() {
            tracing::warn!(command = %command.display(), attempt, "verification command failed");
        }
        checks.push(VerificationCheck {
            attempt,
            command: command.clone(),
            ok: result.ok(),
            output: result.combined(),
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }
    Ok(checks)
}

pub fn all_passed(checks: &[VerificationCheck]) -> bool {
    checks.iter().all(|c| c.ok)
}

/// Render the failing checks from the latest attempt as compact feedback
/// text to append to the model's context, clipped per-command so one
/// noisy build log cannot dominate the budget.
pub fn failure_feedback(checks: &[VerificationCheck]) -> String {
    let mut out = String::new();
    for check in checks.iter().filter(|c| !c.ok) {
        out.push_str(&format!(
            "FAILED: {}\n{}\n\n",
            check.command.display(),
            truncate_chars(&check.output, VERIFICATION_OUTPUT_CLIP_CHARS)
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use cagent_core::Command;

    #[tokio::test]
    async fn runs_all_commands_even_after_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let commands = vec![
            Command::new("grep", vec!["--bogus-flag".into()]),
            Command::new("ls", vec![]),
        ];
        let checks = run_checks(dir.path(), &commands, 1).await.unwrap();
        assert_eq!(checks.len(), 2);
        assert!(!checks[0].ok);
        assert!(checks[1].ok);
    }

    #[tokio::test]
    async fn all_passed_is_true_only_when_every_check_passes() {
        let dir = tempfile::tempdir().unwrap();
        let passing = run_checks(dir.path(), &[Command::new("ls", vec![])], 1).await.unwrap();
        assert!(all_passed(&passing));

        let failing = run_checks(
            dir.path(),
            &[Command::new("grep", vec!["--bogus-flag".into()])],
            1,
        )
        .await
        .unwrap();
        assert!(!all_passed(&failing));
    }

    #[tokio::test]
    async fn failure_feedback_includes_only_failing_commands() {
        let dir = tempfile::tempdir().unwrap();
        let checks = run_checks(
            dir.path(),
            &[Command::new("grep", vec!["--bogus-flag".into()]), Command::new("ls", vec![])],
            1,
        )
        .await
        .unwrap();
        let feedback = failure_feedback(&checks);
        assert!(feedback.contains("grep"));
        assert!(!feedback.contains("FAILED: ls"));
    }
}

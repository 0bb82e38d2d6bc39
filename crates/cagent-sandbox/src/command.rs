use cagent_core::{constants::COMMAND_ARG_MAX_CHARS, AgentError, Command};

/// Programs the sandbox will exec directly (no shell). Package managers,
/// toolchains, and basic POSIX utilities commonly needed for builds and
/// verification — deliberately excludes anything that forks a shell
/// (`sh`, `bash`), edits permissions (`chmod`, `chown`), or reaches the
/// network for anything other than a package manager's own registry.
const ALLOWED_PROGRAMS: &[&str] = &[
    "cargo", "rustc", "rustfmt",
    "npm", "npx", "pnpm", "yarn", "node",
    "python3", "python", "pip", "pip3", "pytest",
    "go", "gofmt",
    "make",
    "git",
    "ls", "cat", "grep", "find", "wc", "head", "tail", "diff",
];

/// `git` is restricted to read-only inspection subcommands; nothing that
/// mutates history, remotes, or config.
const GIT_ALLOWED_SUBCOMMANDS: &[&str] =
    &["status", "diff", "show", "log", "rev-parse", "branch", "ls-files", "blame"];

/// Package-manager subcommands that publish, authenticate, or otherwise
/// reach outside the local project are denied even though the program
/// itself is whitelisted.
const PACKAGE_MANAGER_DENIED_SUBCOMMANDS: &[&str] = &[
    "publish", "login", "logout", "adduser", "owner", "token", "whoami", "deploy", "unpublish",
];

/// Validate a proposed command against the static whitelist and bounds.
/// Returns the command unchanged on success — this never mutates, it only
/// gates what `cagent-tools` is permitted to hand to the executor.
pub fn validate_command(command: &Command) -> Result<(), AgentError> {
    if command.program.trim().is_empty() {
        return Err(AgentError::PolicyViolation("empty program".into()));
    }
    if !ALLOWED_PROGRAMS.contains(&command.program.as_str()) {
        return Err(AgentError::PolicyViolation(format!(
            "program '{}' is not on the allowed list",
            command.program
        )));
    }
    validate_subcommand(command)?;
    for arg in &command.args {
        if arg.len() > COMMAND_ARG_MAX_CHARS {
            return Err(AgentError::PolicyViolation(format!(
                "argument exceeds {COMMAND_ARG_MAX_CHARS} characters"
            )));
        }
        if arg.contains('\0') {
            return Err(AgentError::PolicyViolation("argument contains NUL byte".into()));
        }
    }
    Ok(())
}

/// Programs that carry a subcommand as their first argument get extra
/// scrutiny: `git` is pinned to a read-only allowlist, package managers are
/// denied anything that publishes or touches account credentials.
fn validate_subcommand(command: &Command) -> Result<(), AgentError> {
    let Some(first) = command.args.first() else {
        return Ok(());
    };
    let sub = first.to_lowercase();

    if command.program == "git" && !GIT_ALLOWED_SUBCOMMANDS.contains(&sub.as_str()) {
        return Err(AgentError::PolicyViolation(format!(
            "git subcommand '{sub}' is not on the read-only allowed list"
        )));
    }

    let is_package_manager = matches!(command.program.as_str(), "npm" | "npx" | "pnpm" | "yarn" | "pip" | "pip3");
    if is_package_manager && PACKAGE_MANAGER_DENIED_SUBCOMMANDS.contains(&sub.as_str()) {
        return Err(AgentError::PolicyViolation(format!(
            "'{}' subcommand '{sub}' is denied (publishing/auth)",
            command.program
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_whitelisted_program() {
        let cmd = Command::new("cargo", vec!["build".into()]);
        assert!(validate_command(&cmd).is_ok());
    }

    #[test]
    fn rejects_shell_escape_attempt() {
        let cmd = Command::new("bash", vec!["-c".into(), "rm -rf /".into()]);
        assert!(validate_command(&cmd).is_err());
    }

    #[test]
    fn rejects_unknown_program() {
        let cmd = Command::new("curl", vec!["http://example.com".into()]);
        assert!(validate_command(&cmd).is_err());
    }

    #[test]
    fn rejects_oversized_argument() {
        let cmd = Command::new("cargo", vec!["a".repeat(COMMAND_ARG_MAX_CHARS + 1)]);
        assert!(validate_command(&cmd).is_err());
    }

    #[test]
    fn accepts_read_only_git_subcommand() {
        let cmd = Command::new("git", vec!["status".into()]);
        assert!(validate_command(&cmd).is_ok());
    }

    #[test]
    fn rejects_mutating_git_subcommand() {
        let cmd = Command::new("git", vec!["push".into()]);
        assert!(validate_command(&cmd).is_err());
        let cmd = Command::new("git", vec!["commit".into(), "-m".into(), "x".into()]);
        assert!(validate_command(&cmd).is_err());
    }

    #[test]
    fn rejects_package_manager_publish_and_auth_subcommands() {
        assert!(validate_command(&Command::new("npm", vec!["publish".into()])).is_err());
        assert!(validate_command(&Command::new("pnpm", vec!["login".into()])).is_err());
        assert!(validate_command(&Command::new("yarn", vec!["logout".into()])).is_err());
        assert!(validate_command(&Command::new("pip", vec!["install".into(), "requests".into()])).is_ok());
    }
}

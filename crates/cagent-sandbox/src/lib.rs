//! Path containment, command whitelisting, and restricted-environment
//! process execution — the policy boundary every mutating action and
//! every `run_command` passes through before touching the workspace.

pub mod command;
pub mod exec;
pub mod path;

pub use command::validate_command;
pub use exec::{run_sandboxed, ExecOutput};
pub use path::{is_protected, resolve_in_workspace};

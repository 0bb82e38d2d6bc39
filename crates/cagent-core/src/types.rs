use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// Execution mode for a run: single-agent iteration engine, or a
/// multi-agent work-unit planner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Single,
    Multi,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Multi => write!(f, "multi"),
        }
    }
}

/// A whitelisted shell command: program + args + optional workspace-relative cwd.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub cwd: Option<String>,
}

impl Command {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: None,
        }
    }

    /// Human-readable rendering, e.g. `pnpm -s build` (cwd: packages/app).
    pub fn display(&self) -> String {
        let mut s = self.program.clone();
        for a in &self.args {
            s.push(' ');
            s.push_str(a);
        }
        if let Some(cwd) = &self.cwd {
            s.push_str(&format!(" (cwd: {cwd})"));
        }
        s
    }
}

/// The complete set of inputs that start a run. Immutable once a run
/// starts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunRequest {
    pub goal: String,
    pub workspace: String,
    #[serde(default = "default_execution_mode")]
    pub execution_mode: ExecutionMode,
    /// 0 = unbounded, else 2..40.
    #[serde(default)]
    pub max_iterations: u32,
    #[serde(default = "default_max_file_writes")]
    pub max_file_writes: u32,
    #[serde(default = "default_max_command_runs")]
    pub max_command_runs: u32,
    #[serde(default = "default_team_size")]
    pub team_size: u32,
    #[serde(default)]
    pub strict_verification: bool,
    #[serde(default)]
    pub auto_fix_verification: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub rollback_on_failure: bool,
    #[serde(default)]
    pub run_preflight_checks: bool,
    #[serde(default)]
    pub require_clarification_before_edits: bool,
    #[serde(default)]
    pub resume_from_last_checkpoint: bool,
    #[serde(default)]
    pub resume_run_id: Option<String>,
    #[serde(default)]
    pub skill_files: Vec<String>,
    #[serde(default)]
    pub verification_commands: Vec<Command>,
    #[serde(default)]
    pub clarification_answers: HashMap<String, String>,
    #[serde(default = "default_critic_pass_threshold")]
    pub critic_pass_threshold: f64,
    #[serde(default = "default_max_parallel_work_units")]
    pub max_parallel_work_units: u32,
    #[serde(default)]
    pub model_override: Option<String>,
}

fn default_execution_mode() -> ExecutionMode {
    ExecutionMode::Multi
}
fn default_max_file_writes() -> u32 {
    40
}
fn default_max_command_runs() -> u32 {
    40
}
fn default_team_size() -> u32 {
    1
}
fn default_critic_pass_threshold() -> f64 {
    0.7
}
fn default_max_parallel_work_units() -> u32 {
    1
}

impl RunRequest {
    /// Validate field bounds. Returns the first violation found.
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.goal.trim().is_empty() {
            return Err(AgentError::InvalidRequest("goal must not be empty".into()));
        }
        if self.workspace.trim().is_empty() {
            return Err(AgentError::InvalidRequest(
                "workspace must be an absolute path".into(),
            ));
        }
        if self.max_iterations != 0 && !(2..=40).contains(&self.max_iterations) {
            return Err(AgentError::InvalidRequest(
                "maxIterations must be 0 or in 2..40".into(),
            ));
        }
        if !(1..=120).contains(&self.max_file_writes) {
            return Err(AgentError::InvalidRequest(
                "maxFileWrites must be in 1..120".into(),
            ));
        }
        if !(1..=140).contains(&self.max_command_runs) {
            return Err(AgentError::InvalidRequest(
                "maxCommandRuns must be in 1..140".into(),
            ));
        }
        if !(1..=100).contains(&self.team_size) {
            return Err(AgentError::InvalidRequest(
                "teamSize must be in 1..100".into(),
            ));
        }
        if !(1..=8).contains(&self.max_parallel_work_units) {
            return Err(AgentError::InvalidRequest(
                "maxParallelWorkUnits must be in 1..8".into(),
            ));
        }
        if !(0.20..=0.95).contains(&self.critic_pass_threshold) {
            return Err(AgentError::InvalidRequest(
                "criticPassThreshold must be in 0.20..0.95".into(),
            ));
        }
        if self.skill_files.len() > 20 {
            return Err(AgentError::InvalidRequest(
                "skillFiles must have at most 20 entries".into(),
            ));
        }
        Ok(())
    }

    /// Whether maxIterations is unbounded (0).
    pub fn is_unbounded(&self) -> bool {
        self.max_iterations == 0
    }
}

/// One structured tool-call decision, emitted by the model once per
/// iteration as a tagged union over the available action kinds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    ListTree {
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        max_depth: Option<u32>,
    },
    SearchFiles {
        pattern: String,
        #[serde(default)]
        glob: Option<String>,
        #[serde(default)]
        max_results: Option<u32>,
    },
    ReadFile {
        path: String,
        #[serde(default)]
        start_line: Option<u32>,
        #[serde(default)]
        end_line: Option<u32>,
    },
    ReadManyFiles {
        paths: Vec<String>,
        #[serde(default)]
        max_lines_per_file: Option<u32>,
    },
    WriteFile {
        path: String,
        content: String,
    },
    AppendFile {
        path: String,
        content: String,
    },
    DeleteFile {
        path: String,
    },
    RunCommand {
        command: Command,
    },
    WebSearch {
        query: String,
    },
    Final {
        summary: String,
        #[serde(default)]
        verification: Vec<String>,
        #[serde(default)]
        remaining_work: Vec<String>,
    },
}

impl Action {
    /// Name of the variant as used in the wire protocol / logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::ListTree { .. } => "list_tree",
            Action::SearchFiles { .. } => "search_files",
            Action::ReadFile { .. } => "read_file",
            Action::ReadManyFiles { .. } => "read_many_files",
            Action::WriteFile { .. } => "write_file",
            Action::AppendFile { .. } => "append_file",
            Action::DeleteFile { .. } => "delete_file",
            Action::RunCommand { .. } => "run_command",
            Action::WebSearch { .. } => "web_search",
            Action::Final { .. } => "final",
        }
    }

    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Action::WriteFile { .. } | Action::AppendFile { .. } | Action::DeleteFile { .. }
        )
    }

    pub fn is_evidence_producing(&self) -> bool {
        matches!(
            self,
            Action::ReadFile { .. }
                | Action::ReadManyFiles { .. }
                | Action::SearchFiles { .. }
                | Action::RunCommand { .. }
        )
    }

    /// Canonical signature used by the repeated-action stagnation guard:
    /// same variant + same primary target collapses to one string.
    pub fn signature(&self) -> String {
        match self {
            Action::ListTree { path, max_depth } => {
                format!("list_tree:{}:{:?}", path.as_deref().unwrap_or("."), max_depth)
            }
            Action::SearchFiles { pattern, glob, .. } => {
                format!("search_files:{pattern}:{:?}", glob)
            }
            Action::ReadFile {
                path,
                start_line,
                end_line,
            } => format!("read_file:{path}:{:?}:{:?}", start_line, end_line),
            Action::ReadManyFiles { paths, .. } => format!("read_many_files:{}", paths.join(",")),
            Action::WriteFile { path, .. } => format!("write_file:{path}"),
            Action::AppendFile { path, .. } => format!("append_file:{path}"),
            Action::DeleteFile { path } => format!("delete_file:{path}"),
            Action::RunCommand { command } => format!("run_command:{}", command.display()),
            Action::WebSearch { query } => format!("web_search:{query}"),
            Action::Final { .. } => "final".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Action,
    Verification,
}

/// One recorded turn of the run: a proposed/executed action or a
/// verification pass, in execution order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Step {
    pub iteration: u32,
    pub phase: Phase,
    #[serde(default)]
    pub thinking: Option<String>,
    #[serde(default)]
    pub action: Option<Action>,
    pub ok: bool,
    pub summary: String,
    #[serde(default)]
    pub output: String,
    pub duration_ms: u64,
}

impl Step {
    pub fn truncated_output(output: &str) -> String {
        crate::text::truncate_bytes(output, crate::constants::STEP_OUTPUT_TRUNCATE_BYTES)
    }
}

/// One quality-gate command execution record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationCheck {
    pub attempt: u32,
    pub command: Command,
    pub ok: bool,
    pub output: String,
    pub duration_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalOp {
    Write,
    Append,
    Delete,
}

/// Append-only record of a mutation performed during a run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChangeJournalEntry {
    pub op: JournalOp,
    pub path: String,
    pub timestamp: DateTime<Utc>,
    pub details: String,
}

/// Pre-mutation snapshot captured once per path per run, for rollback.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileSnapshot {
    pub path: String,
    pub existed: bool,
    pub previous_content: Option<String>,
}

/// Running compaction bookkeeping (monotonic counters).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CompactionState {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub last_compacted_iteration: u32,
    #[serde(default)]
    pub dropped_messages: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One chat-completion message in the context window.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Terminal/intermediate status of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Completed,
    Failed,
    MaxIterations,
    VerificationFailed,
    NeedsClarification,
    Canceled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::InProgress)
    }

    /// Statuses the supervisor treats as retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RunStatus::Failed | RunStatus::MaxIterations | RunStatus::VerificationFailed
        )
    }
}

/// Full resumable run state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub resume_key: String,
    pub run_id: String,
    #[serde(default)]
    pub resumed_from_run_id: Option<String>,
    pub status: RunStatus,
    pub history: Vec<ChatMessage>,
    pub compaction: CompactionState,
    pub steps: Vec<Step>,
    pub changed_files: Vec<String>,
    pub file_writes_used: u32,
    pub command_runs_used: u32,
    pub verification_checks: Vec<VerificationCheck>,
    pub preflight_checks: Vec<VerificationCheck>,
    pub rollback_snapshots: Vec<FileSnapshot>,
    pub change_journal: Vec<ChangeJournalEntry>,
    pub clarification_answers: HashMap<String, String>,
    pub clarification_questions: Vec<String>,
    #[serde(default)]
    pub project_digest: Option<String>,
    #[serde(default)]
    pub intelligence_snapshot: Option<String>,
    pub last_iteration: u32,
    pub updated_at: DateTime<Utc>,
}

/// Per-workspace metadata sidecar, cheap to scan without loading the
/// full checkpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunMeta {
    pub run_id: String,
    pub resume_key: String,
    pub workspace: String,
    pub goal: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: RunStatus,
    #[serde(default)]
    pub resumed_from_run_id: Option<String>,
    pub last_iteration: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    BugPattern,
    FixPattern,
    VerificationRule,
    ProjectConvention,
    Continuation,
}

impl MemoryType {
    /// Per-type minimum confidence for non-pinned retrieval.
    pub fn min_confidence(&self) -> f64 {
        match self {
            MemoryType::BugPattern => 0.70,
            MemoryType::ProjectConvention => 0.60,
            MemoryType::VerificationRule => 0.55,
            MemoryType::FixPattern => 0.55,
            MemoryType::Continuation => 0.50,
        }
    }
}

/// One piece of evidence supporting a memory entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(rename = "type")]
    pub kind: String,
    pub source: String,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

/// A long-term, evidence-backed memory entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub workspace: String,
    #[serde(rename = "type")]
    pub kind: MemoryType,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub pinned: bool,
    pub success_score: f64,
    pub confidence_score: f64,
    #[serde(default)]
    pub use_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_validated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub invalidated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    #[serde(default)]
    pub supersedes: Vec<String>,
    #[serde(default)]
    pub contradicted_by: Vec<String>,
    pub dedupe_key: String,
}

/// The single "latest continuation" summary for a workspace.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContinuationPacket {
    pub run_id: String,
    pub execution_mode: ExecutionMode,
    pub goal: String,
    pub summary: String,
    #[serde(default)]
    pub pending_work: Vec<String>,
    #[serde(default)]
    pub next_actions: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Terminal snapshot of a run returned to the caller.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunResult {
    pub status: RunStatus,
    pub run_id: String,
    #[serde(default)]
    pub resumed_from_run_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub summary: String,
    #[serde(default)]
    pub verification: Vec<String>,
    #[serde(default)]
    pub remaining_work: Vec<String>,
    pub steps: Vec<Step>,
    pub verification_checks: Vec<VerificationCheck>,
    pub preflight_checks: Vec<VerificationCheck>,
    pub files_changed: Vec<String>,
    pub commands_run: Vec<Command>,
    #[serde(default)]
    pub rollback_summary: Vec<String>,
    pub change_journal: Vec<ChangeJournalEntry>,
    #[serde(default)]
    pub clarification_questions: Vec<String>,
    #[serde(default)]
    pub clarification_answers: HashMap<String, String>,
    #[serde(default)]
    pub project_digest: Option<String>,
    #[serde(default)]
    pub intelligence_snapshot: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RunResult {
    /// Derived: no verification failures recorded and status is terminal-ok.
    pub fn zero_known_issues(&self) -> bool {
        self.status == RunStatus::Completed
            && self.verification_checks.iter().all(|c| c.ok)
            && self.remaining_work.is_empty()
    }
}

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use cagent_checkpoint::CheckpointStore;
use cagent_core::{Command, ExecutionMode, RunRequest, RunStatus};
use cagent_llm::{ChatComplete, HttpChatClient};
use cagent_memory::{build_packet, continuation_as_memory_entry, ContinuationStore, MemoryStore};
use cagent_tools::{NoopWebSearchClient, WebSearchClient};
use tokio_util::sync::CancellationToken;

use crate::events;

/// Runtime state directory layout under the workspace.
struct WorkspacePaths {
    runs_root: PathBuf,
    memory_store: PathBuf,
    continuation: PathBuf,
}

fn workspace_paths(workspace: &Path) -> WorkspacePaths {
    let tmp = workspace.join(".tmp");
    WorkspacePaths {
        runs_root: tmp.join("agent-runs"),
        memory_store: tmp.join("agent-memory").join("store.json"),
        continuation: tmp.join("agent-memory").join("continuation.json"),
    }
}

/// `resume_key` fingerprints a workspace + goal pair so resume discovery
/// can find the run that matches exactly, not merely the same workspace.
fn resume_key_for(workspace: &Path, goal: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(workspace.to_string_lossy().as_bytes());
    hasher.update(b"\n");
    hasher.update(goal.trim().as_bytes());
    let digest = hasher.finalize();
    format!("{:x}", digest)[..24].to_string()
}

#[allow(clippy::too_many_arguments)]
pub async fn handle_run(
    goal: String,
    workspace: String,
    mode: String,
    max_iterations: u32,
    max_file_writes: u32,
    max_command_runs: u32,
    team_size: u32,
    strict_verification: bool,
    auto_fix_verification: bool,
    dry_run: bool,
    rollback_on_failure: bool,
    run_preflight_checks: bool,
    require_clarification_before_edits: bool,
    no_resume: bool,
    skill_files: Vec<String>,
    verification_commands: Vec<String>,
    critic_pass_threshold: f64,
    max_parallel_work_units: u32,
    model: Option<String>,
    api_base: String,
    api_key: Option<String>,
) -> Result<i32> {
    let execution_mode = match mode.as_str() {
        "single" => ExecutionMode::Single,
        "multi" => ExecutionMode::Multi,
        other => bail!("unknown --mode '{other}', expected single or multi"),
    };
    let workspace_path = PathBuf::from(&workspace)
        .canonicalize()
        .with_context(|| format!("workspace '{workspace}' does not exist"))?;

    let request = RunRequest {
        goal,
        workspace: workspace_path.display().to_string(),
        execution_mode,
        max_iterations,
        max_file_writes,
        max_command_runs,
        team_size,
        strict_verification,
        auto_fix_verification,
        dry_run,
        rollback_on_failure,
        run_preflight_checks,
        require_clarification_before_edits,
        resume_from_last_checkpoint: !no_resume,
        resume_run_id: None,
        skill_files,
        verification_commands: verification_commands
            .into_iter()
            .map(|c| shell_command(&c))
            .collect(),
        clarification_answers: HashMap::new(),
        critic_pass_threshold,
        max_parallel_work_units,
        model_override: model,
    };
    request.validate().context("invalid run request")?;

    let paths = workspace_paths(&workspace_path);
    let checkpoint_store = CheckpointStore::new(paths.runs_root.clone());
    let resume_key = resume_key_for(&workspace_path, &request.goal);

    let run_id = ulid::Ulid::new().to_string();
    events::emit_started(&run_id, &request.goal);

    let mut memory_store = MemoryStore::load(paths.memory_store.clone())?;
    let continuation_store = ContinuationStore::new(paths.continuation.clone());
    let (memory_snippets, memory_conflict_warning) = gather_memory_context(&run_id, &memory_store, &request);

    let chat = build_chat_client(&request, &api_base, api_key)?;
    let web_search: Arc<dyn WebSearchClient> = Arc::new(NoopWebSearchClient);
    let cancel = install_cancellation_handler();

    let sink = events::NdjsonEventSink::new(run_id.clone());
    let outcome = cagent_supervisor::run_with_recovery(
        &workspace_path,
        &request,
        &resume_key,
        chat,
        web_search,
        &memory_snippets,
        memory_conflict_warning.as_deref(),
        &checkpoint_store,
        cancel,
        Some(&sink),
    )
    .await?;

    events::emit_status(&run_id, &format!("{:?}", outcome.status));

    let packet = build_packet(
        run_id.clone(),
        request.execution_mode,
        request.goal.clone(),
        outcome.summary.clone(),
        outcome.remaining_work.clone(),
        Vec::new(),
    );
    memory_store.add_or_merge(continuation_as_memory_entry(&packet, &request.workspace));
    if let Err(e) = continuation_store.save(packet) {
        tracing::warn!("failed to persist continuation packet: {e}");
    }
    memory_store.evict_if_over_capacity();
    if let Err(e) = memory_store.save() {
        tracing::warn!("failed to persist memory store: {e}");
    }

    events::emit_result(&outcome);

    Ok(if outcome.status == RunStatus::Completed { 0 } else { 1 })
}

pub async fn handle_resume(
    run_id: Option<String>,
    workspace: String,
    goal: Option<String>,
    max_iterations: u32,
    model: Option<String>,
    api_base: String,
    api_key: Option<String>,
) -> Result<i32> {
    let workspace_path = PathBuf::from(&workspace)
        .canonicalize()
        .with_context(|| format!("workspace '{workspace}' does not exist"))?;
    let paths = workspace_paths(&workspace_path);
    let checkpoint_store = CheckpointStore::new(paths.runs_root.clone());

    // The resume key folds in the original goal, which isn't known until
    // the meta is found; locate the meta first (by run id, or by scanning
    // for the most recent resumable run in this workspace), then use its
    // own `resume_key` for the checkpoint load.
    let meta = match &run_id {
        Some(id) => checkpoint_store
            .find_meta_by_run_id(id)?
            .with_context(|| format!("no checkpoint found for run id '{id}'"))?,
        None => checkpoint_store
            .find_resumable_any()?
            .context("no resumable run found for this workspace; pass --run-id or start a new run")?,
    };
    let checkpoint = checkpoint_store.load_checkpoint(&meta.resume_key, &meta.run_id)?;

    let request = RunRequest {
        goal: goal.unwrap_or_else(|| meta.goal.clone()),
        workspace: workspace_path.display().to_string(),
        execution_mode: ExecutionMode::Single,
        max_iterations,
        max_file_writes: 40,
        max_command_runs: 40,
        team_size: 1,
        strict_verification: false,
        auto_fix_verification: false,
        dry_run: false,
        rollback_on_failure: false,
        run_preflight_checks: false,
        require_clarification_before_edits: false,
        resume_from_last_checkpoint: true,
        resume_run_id: Some(meta.run_id.clone()),
        skill_files: vec![],
        verification_commands: vec![],
        clarification_answers: HashMap::new(),
        critic_pass_threshold: 0.7,
        max_parallel_work_units: 1,
        model_override: model,
    };
    request.validate().context("invalid resumed run request")?;

    events::emit_started(&meta.run_id, &request.goal);

    let mut memory_store = MemoryStore::load(paths.memory_store.clone())?;
    let continuation_store = ContinuationStore::new(paths.continuation.clone());
    let (memory_snippets, memory_conflict_warning) = gather_memory_context(&meta.run_id, &memory_store, &request);

    let chat = build_chat_client(&request, &api_base, api_key)?;
    let web_search: Arc<dyn WebSearchClient> = Arc::new(NoopWebSearchClient);
    let cancel = install_cancellation_handler();

    let sink = events::NdjsonEventSink::new(meta.run_id.clone());
    let outcome = cagent_supervisor::run_from_checkpoint(
        &workspace_path,
        &request,
        &meta.resume_key,
        Some(checkpoint),
        chat,
        web_search,
        &memory_snippets,
        memory_conflict_warning.as_deref(),
        &checkpoint_store,
        cancel,
        Some(&sink),
    )
    .await?;

    events::emit_status(&meta.run_id, &format!("{:?}", outcome.status));

    let packet = build_packet(
        meta.run_id.clone(),
        request.execution_mode,
        request.goal.clone(),
        outcome.summary.clone(),
        outcome.remaining_work.clone(),
        Vec::new(),
    );
    memory_store.add_or_merge(continuation_as_memory_entry(&packet, &request.workspace));
    if let Err(e) = continuation_store.save(packet) {
        tracing::warn!("failed to persist continuation packet: {e}");
    }
    memory_store.evict_if_over_capacity();
    if let Err(e) = memory_store.save() {
        tracing::warn!("failed to persist memory store: {e}");
    }

    events::emit_result(&outcome);

    Ok(if outcome.status == RunStatus::Completed { 0 } else { 1 })
}

fn shell_command(raw: &str) -> Command {
    let mut parts = raw.split_whitespace();
    let program = parts.next().unwrap_or("").to_string();
    let args = parts.map(|s| s.to_string()).collect();
    Command::new(program, args)
}

/// Runs retrieval once and fans its results out to the snippets the
/// engine includes in the prompt and the conflict diagnostics it uses to
/// gate mutations, logging the raw conflict count so it's inspectable
/// outside of the folded warning string.
fn gather_memory_context(run_id: &str, store: &MemoryStore, request: &RunRequest) -> (Vec<String>, Option<String>) {
    let (selected, diagnostics) = store.retrieve_with_diagnostics(&request.workspace, &request.goal, 8);
    let snippets = selected
        .iter()
        .map(|entry| format!("[{:?}] {}: {}", entry.kind, entry.title, entry.content))
        .collect();
    if diagnostics.conflict_count > 0 {
        tracing::info!(conflict_count = diagnostics.conflict_count, "memory retrieval diagnostics flagged conflicts");
        events::emit_memory_diagnostics(run_id, diagnostics.conflict_count, diagnostics.requires_verification_before_mutation);
    }
    (snippets, diagnostics.warning)
}

fn build_chat_client(request: &RunRequest, api_base: &str, api_key: Option<String>) -> Result<Arc<dyn ChatComplete>> {
    let key = api_key.context("an API key is required: pass --api-key or set CAGENT_API_KEY")?;
    let model = request
        .model_override
        .clone()
        .unwrap_or_else(|| "gpt-4.1".to_string());
    Ok(Arc::new(HttpChatClient::new(api_base, key, model)))
}

/// Install a Ctrl-C handler that cancels the run cooperatively instead of
/// killing the process mid-write, so in-flight checkpoints still flush.
fn install_cancellation_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received interrupt, canceling run");
            child.cancel();
        }
    });
    token
}

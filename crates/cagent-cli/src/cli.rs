use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cagent", version, about = "Autonomous coding agent run orchestrator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a new run against a workspace
    Run {
        /// Natural-language description of what the agent should accomplish
        #[arg(long)]
        goal: String,

        /// Absolute path to the workspace the agent may read and mutate
        #[arg(long)]
        workspace: String,

        /// Execution mode: single or multi
        #[arg(long, default_value = "single")]
        mode: String,

        /// 0 = unbounded, otherwise 2..40
        #[arg(long, default_value_t = 20)]
        max_iterations: u32,

        #[arg(long, default_value_t = 40)]
        max_file_writes: u32,

        #[arg(long, default_value_t = 40)]
        max_command_runs: u32,

        #[arg(long, default_value_t = 1)]
        team_size: u32,

        #[arg(long)]
        strict_verification: bool,

        #[arg(long)]
        auto_fix_verification: bool,

        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        rollback_on_failure: bool,

        #[arg(long)]
        run_preflight_checks: bool,

        #[arg(long)]
        require_clarification_before_edits: bool,

        /// Skip resume discovery even if a stale-free in-progress run exists
        #[arg(long)]
        no_resume: bool,

        /// Path to a skill file providing extra instructions (repeatable)
        #[arg(long = "skill-file")]
        skill_files: Vec<String>,

        /// Shell command that must pass for the run to be considered done (repeatable)
        #[arg(long = "verification-command")]
        verification_commands: Vec<String>,

        #[arg(long, default_value_t = 0.7)]
        critic_pass_threshold: f64,

        #[arg(long, default_value_t = 1)]
        max_parallel_work_units: u32,

        /// Override the configured chat model name
        #[arg(long)]
        model: Option<String>,

        /// Base URL of the OpenAI-compatible chat completions endpoint
        #[arg(long, env = "CAGENT_API_BASE", default_value = "https://api.openai.com/v1")]
        api_base: String,

        /// API key; falls back to CAGENT_API_KEY
        #[arg(long, env = "CAGENT_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },

    /// Resume a previously checkpointed run
    Resume {
        /// Resume a specific run id rather than discovering the latest
        #[arg(long)]
        run_id: Option<String>,

        #[arg(long)]
        workspace: String,

        /// Required when no matching in-progress checkpoint is found
        #[arg(long)]
        goal: Option<String>,

        #[arg(long, default_value_t = 20)]
        max_iterations: u32,

        #[arg(long)]
        model: Option<String>,

        #[arg(long, env = "CAGENT_API_BASE", default_value = "https://api.openai.com/v1")]
        api_base: String,

        #[arg(long, env = "CAGENT_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },

    /// Inspect and maintain the long-term memory store
    Memory {
        #[command(subcommand)]
        cmd: MemoryCommands,
    },
}

#[derive(Subcommand)]
pub enum MemoryCommands {
    /// List the entries retrievable for a workspace, ranked by score
    List {
        #[arg(long)]
        workspace: String,

        /// Query text used to score relevance; empty matches everything eligible
        #[arg(long, default_value = "")]
        query: String,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Dump the entire memory store as JSON
    Export {
        #[arg(long)]
        workspace: String,

        /// Write to this path instead of stdout
        #[arg(long)]
        out: Option<String>,
    },
    /// Merge a JSON export back into the memory store
    Import {
        #[arg(long)]
        workspace: String,

        #[arg(long)]
        file: String,
    },
}

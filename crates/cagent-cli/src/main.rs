use anyhow::Result;
use clap::Parser;

mod cli;
mod events;
mod memory_cmd;
mod run_cmd;

use cli::{Cli, Commands, MemoryCommands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            goal,
            workspace,
            mode,
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
            no_resume,
            skill_files,
            verification_commands,
            critic_pass_threshold,
            max_parallel_work_units,
            model,
            api_base,
            api_key,
        } => {
            let exit_code = run_cmd::handle_run(
                goal,
                workspace,
                mode,
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
                no_resume,
                skill_files,
                verification_commands,
                critic_pass_threshold,
                max_parallel_work_units,
                model,
                api_base,
                api_key,
            )
            .await?;
            std::process::exit(exit_code);
        }
        Commands::Resume {
            run_id,
            workspace,
            goal,
            max_iterations,
            model,
            api_base,
            api_key,
        } => {
            let exit_code =
                run_cmd::handle_resume(run_id, workspace, goal, max_iterations, model, api_base, api_key).await?;
            std::process::exit(exit_code);
        }
        Commands::Memory { cmd } => match cmd {
            MemoryCommands::List { workspace, query, limit } => {
                memory_cmd::handle_list(workspace, query, limit)?;
            }
            MemoryCommands::Export { workspace, out } => {
                memory_cmd::handle_export(workspace, out)?;
            }
            MemoryCommands::Import { workspace, file } => {
                memory_cmd::handle_import(workspace, file)?;
            }
        },
    }

    Ok(())
}

//! Parley CLI entry point.
//!
//! Binary name: `parley`
//!
//! Parses CLI arguments, sets up tracing, opens the conversation store under
//! the data directory, then dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use parley_types::lorebook::LorebookScanOverrides;

use cli::{Cli, Commands, IndexCommand, LorebookCommand};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,parley=debug",
        _ => "trace",
    };

    parley_observe::tracing_setup::init_tracing(filter, cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "parley", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init(cli.data_dir.clone()).await?;
    let result = run(&state, cli).await;

    parley_observe::tracing_setup::shutdown_tracing();
    result
}

async fn run(state: &AppState, cli: Cli) -> anyhow::Result<()> {
    let json = cli.json;
    match cli.command {
        Commands::List => cli::conversation::list_conversations(state, json).await,
        Commands::New { title } => cli::conversation::new_conversation(state, title, json).await,
        Commands::Show { id } => cli::conversation::show_conversation(state, &id, json).await,
        Commands::Events { id } => cli::conversation::print_events(state, &id).await,
        Commands::Read { id, index } => cli::conversation::mark_read(state, &id, index, json).await,
        Commands::Delete { id, force } => {
            cli::conversation::delete_conversation(state, &id, force, json).await
        }
        Commands::Index {
            action: IndexCommand::Rebuild,
        } => cli::conversation::rebuild_index(state, json).await,
        Commands::Lorebook {
            action:
                LorebookCommand::Select {
                    lorebook,
                    history,
                    scan_depth,
                    token_budget,
                    recursive,
                },
        } => {
            let overrides = LorebookScanOverrides {
                scan_depth,
                token_budget,
                recursive_scanning: recursive.then_some(true),
            };
            cli::lorebook::select_entries(state, &lorebook, &history, overrides, json).await
        }
        Commands::Completions { .. } => Ok(()),
    }
}

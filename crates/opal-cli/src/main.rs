//! opal - decentralized program launcher CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use opal_cli::cmd;
use opal_cli::{Cli, Commands, StoreCommands, TrustCommands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let dry_run = cli.dry_run;
    let quiet = cli.quiet;

    match cli.command {
        Commands::Run {
            uri,
            args,
            refresh,
            cached,
            stability,
            main,
            wrapper,
            selections,
        } => {
            let opts = cmd::run::RunOptions {
                uri,
                args,
                refresh,
                cached,
                stability,
                main,
                wrapper,
                selections,
                dry_run,
                quiet,
            };
            cmd::run::run(opts).await
        }
        Commands::Select {
            uri,
            refresh,
            cached,
            stability,
            save,
        } => cmd::select::select(&uri, refresh, cached, stability, save.as_deref(), quiet).await,
        Commands::Download {
            uri,
            refresh,
            stability,
        } => cmd::download::download(&uri, refresh, stability, quiet).await,
        Commands::Trust { command } => match command {
            TrustCommands::List => cmd::trust::list(),
        },
        Commands::Store { command } => match command {
            StoreCommands::List => cmd::store::list(),
        },
        Commands::Completions { shell } => {
            cmd::completions::completions(shell);
            Ok(())
        }
    }
}

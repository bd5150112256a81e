use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use capitolwatch_common::{Config, Layer};
use capitolwatch_ingest::checkpoint::FileCheckpointStore;
use capitolwatch_ingest::store::MemoryStore;
use capitolwatch_ingest::trigger::{TriggerCommand, TriggerResponse};
use capitolwatch_ingest::{IngestDeps, Orchestrator};

#[derive(Parser)]
#[command(name = "capitolwatch", about = "CapitolWatch legislative ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start every configured layer and read `sync <layer>`, `status` or
    /// `stop` commands from stdin.
    Run,
    /// Run one layer once and print the result.
    Sync {
        layer: Layer,
        /// Speed layer only: poll a single platform.
        #[arg(long)]
        platform: Option<String>,
    },
    /// Print the pipeline status.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("capitolwatch=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    config.log_redacted();

    let store = Arc::new(MemoryStore::new());
    let checkpoints = Arc::new(FileCheckpointStore::open(&config.checkpoint_path).await?);
    let deps = IngestDeps::from_config(&config, store, checkpoints);
    let orchestrator = Orchestrator::from_config(&config, deps).await;

    let code = match cli.command {
        Command::Run => run(&orchestrator).await?,
        Command::Sync { layer, platform } => {
            respond(orchestrator.execute(TriggerCommand::Sync { layer, platform }).await)
        }
        Command::Status => respond(orchestrator.execute(TriggerCommand::Status).await),
    };
    std::process::exit(code);
}

/// Long-running mode. Commands arrive one per line on stdin; `stop`, EOF or
/// ctrl-c shut every loop down cleanly.
async fn run(orchestrator: &Orchestrator) -> Result<i32> {
    orchestrator.start().await;
    info!("CapitolWatch running; commands: sync <layer> [platform], status, stop");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<TriggerCommand>() {
                    Ok(TriggerCommand::Stop) => break,
                    Ok(command) => {
                        respond(orchestrator.execute(command).await);
                    }
                    Err(e) => {
                        warn!(error = e.as_str(), "Invalid command");
                        respond(TriggerResponse::error(e));
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received");
                break;
            }
        }
    }

    let response = orchestrator.execute(TriggerCommand::Stop).await;
    Ok(respond(response))
}

fn respond(response: TriggerResponse) -> i32 {
    println!("{}", response.to_json());
    response.exit_code()
}

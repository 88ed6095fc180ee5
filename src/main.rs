//! # OpsRelay — Drive PDF watcher with routed Messenger notifications
//!
//! Usage:
//!   opsrelay run                    # Start the watch loop
//!   opsrelay once                   # Run a single watch cycle and exit
//!   opsrelay replay --last 5        # Re-forward the newest 5 files
//!   opsrelay status                 # Print the stored watch status
//!   opsrelay flow set routing.json  # Install a routing flow
//!   opsrelay flow show              # Print the stored routing flow

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use opsrelay_channels::MessengerChannel;
use opsrelay_core::config::RelayConfig;
use opsrelay_drive::DriveClient;
use opsrelay_watch::{
    CycleOutcome, CycleSettings, Flow, WatchContext, WatchDb, WatchManager, replay_recent,
    run_cycle,
};

#[derive(Parser)]
#[command(
    name = "opsrelay",
    version,
    about = "📡 OpsRelay — Drive PDF watcher with routed Messenger notifications"
)]
struct Cli {
    /// Config file path (default: ~/.opsrelay/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the scheduled watch loop (Ctrl-C to stop)
    Run,
    /// Run a single watch cycle and exit
    Once,
    /// Re-forward previously discovered files
    Replay {
        /// Replay the newest N history entries instead of the last batch
        #[arg(long)]
        last: Option<usize>,
    },
    /// Print the stored watch status as JSON
    Status,
    /// Manage the routing flow
    Flow {
        #[command(subcommand)]
        command: FlowCommand,
    },
}

#[derive(Subcommand)]
enum FlowCommand {
    /// Install a routing flow from a JSON file
    Set { path: String },
    /// Print the stored routing flow as JSON
    Show,
}

fn load_config(cli: &Cli) -> Result<RelayConfig> {
    let mut config = match &cli.config {
        Some(path) => RelayConfig::load_from(std::path::Path::new(path))?,
        None => RelayConfig::load()?,
    };
    config.apply_env();
    Ok(config)
}

fn cycle_settings(config: &RelayConfig) -> CycleSettings {
    CycleSettings {
        watcher_id: config.watch.watcher_id.clone(),
        folder_id: config.watch.folder_id.clone(),
        since: config.watch.since,
        fallback: config.forward.clone(),
    }
}

fn open_db(config: &RelayConfig) -> Result<WatchDb> {
    Ok(WatchDb::open(&config.db_path())?)
}

fn messenger(config: &RelayConfig) -> MessengerChannel {
    MessengerChannel::new(config.channel.messenger.clone().unwrap_or_default())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "opsrelay=debug,opsrelay_watch=debug,opsrelay_drive=debug,opsrelay_channels=debug"
    } else {
        "opsrelay=info,opsrelay_watch=info,opsrelay_drive=info,opsrelay_channels=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = load_config(&cli)?;

    match cli.command {
        Command::Run => {
            let db = open_db(&config)?;
            let settings = cycle_settings(&config);

            println!("📡 OpsRelay v{}", env!("CARGO_PKG_VERSION"));
            println!("   📁 Folder:    {}", display_or(&settings.folder_id, "(not set)"));
            println!("   ⏱️  Interval:  {}s", config.watch.interval_secs);
            println!("   🗄️  Database:  {}", config.db_path().display());
            println!();

            let mut manager = WatchManager::new();
            manager.start(WatchContext {
                settings,
                db,
                source: Box::new(DriveClient::new(config.drive.clone())),
                sink: Box::new(messenger(&config)),
                interval_secs: config.watch.interval_secs,
            });

            tokio::signal::ctrl_c().await?;
            println!("\n👋 Shutting down");
            manager.stop();
        }
        Command::Once => {
            let mut db = open_db(&config)?;
            let settings = cycle_settings(&config);
            let source = DriveClient::new(config.drive.clone());
            let sink = messenger(&config);

            match run_cycle(&settings, &source, &sink, &mut db).await {
                CycleOutcome::Completed { new_files, total } => {
                    println!("✅ Cycle complete: {new_files} new of {total} in folder");
                }
                CycleOutcome::Skipped(reason) => {
                    println!("⏭️  Cycle skipped: {reason}");
                }
                CycleOutcome::Errored(message) => {
                    anyhow::bail!("cycle failed: {message}");
                }
            }
        }
        Command::Replay { last } => {
            let db = open_db(&config)?;
            let settings = cycle_settings(&config);
            let sink = messenger(&config);

            let summary = replay_recent(&settings, &db, &sink, last).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Status => {
            let db = open_db(&config)?;
            match db.load_status(&config.watch.watcher_id)? {
                Some(status) => println!("{}", serde_json::to_string_pretty(&status)?),
                None => println!("No status recorded yet for '{}'", config.watch.watcher_id),
            }
        }
        Command::Flow { command } => {
            let db = open_db(&config)?;
            match command {
                FlowCommand::Set { path } => {
                    let content = std::fs::read_to_string(&path)?;
                    let flow: Flow = serde_json::from_str(&content)?;
                    db.save_flow(&config.watch.watcher_id, &flow)?;
                    println!(
                        "✅ Flow installed: {} node(s), {} edge(s)",
                        flow.nodes.len(),
                        flow.edges.len()
                    );
                }
                FlowCommand::Show => match db.load_flow(&config.watch.watcher_id)? {
                    Some(flow) => println!("{}", serde_json::to_string_pretty(&flow)?),
                    None => println!("No flow configured for '{}'", config.watch.watcher_id),
                },
            }
        }
    }

    Ok(())
}

fn display_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() { fallback } else { value }
}

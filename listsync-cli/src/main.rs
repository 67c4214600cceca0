use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod config;
mod sync;

use commands::{ConfigCommand, GcCommand, ListCommand, SyncCommand};
use config::Config;
use listsync_core::FileStore;
use sync::{try_auto_sync, AutoSync};

#[derive(Parser)]
#[command(name = "lists")]
#[command(version)]
#[command(about = "Ranked lists and folders, synced in the background", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Lists(ListCommand),

    /// Remove old deleted lists
    Gc(GcCommand),

    /// Manage configuration
    Config(ConfigCommand),

    /// Sync with remote server
    Sync(SyncCommand),
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let cli = Cli::parse();
    let config = Config::load(cli.config)?;

    if is_read_command(&cli.command) {
        try_auto_sync(&config, AutoSync::BeforeRead);
    }

    let result = execute_command(&cli.command, &config);

    // Only successful writes are pushed.
    if result.is_ok() && is_write_command(&cli.command) {
        try_auto_sync(&config, AutoSync::AfterWrite);
    }

    result
}

/// Logs go to stderr so they never mix with command output, e.g.
/// `RUST_LOG=listsync_core=debug lists sync`.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn execute_command(
    command: &Option<Commands>,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Some(Commands::Lists(cmd)) => {
            let store = FileStore::new(config.data_dir.value.clone());
            cmd.run(&store)?;
        }
        Some(Commands::Gc(cmd)) => {
            cmd.run(config)?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(config)?;
        }
        Some(Commands::Sync(cmd)) => {
            cmd.run(config)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}

/// Returns true if the command is a read operation that should sync before execution.
fn is_read_command(cmd: &Option<Commands>) -> bool {
    matches!(cmd, Some(Commands::Lists(list)) if !list.is_write())
}

/// Returns true if the command is a write operation that should sync after execution.
fn is_write_command(cmd: &Option<Commands>) -> bool {
    matches!(cmd, Some(Commands::Lists(list)) if list.is_write())
}

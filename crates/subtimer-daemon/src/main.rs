//! Subtimer Daemon
//!
//! Hosts a timeout coordinator and drives it from line commands on stdin.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use subtimer_core::storage::default_config_path;
use subtimer_daemon::console::{Command, CommandError, ConsoleError};
use subtimer_daemon::{ConfigManager, Console, EventManager, TimeoutCoordinator};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser, Debug)]
#[command(name = "subtimerd")]
#[command(about = "Subtimer daemon - per-subtask timeout coordinator", long_about = None)]
struct Args {
    /// Path to the JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (overrides the config file)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Minimum remaining time after any extension, in milliseconds
    #[arg(long)]
    min_remaining_ms: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config_manager = Arc::new(
        ConfigManager::new(config_path.clone())
            .with_context(|| format!("Failed to load config {}", config_path.display()))?,
    );
    let config = config_manager.get().await;

    let log_level = args
        .log_level
        .unwrap_or_else(|| config.daemon.log_level.clone());
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(&log_level)
        .with_ansi(false)
        .init();

    tracing::info!("Subtimer daemon starting...");
    tracing::info!("Config file: {}", config_path.display());

    let mut coordinator_config = config.coordinator.clone();
    if let Some(floor) = args.min_remaining_ms {
        coordinator_config.min_remaining_ms = floor;
    }
    coordinator_config.validate()?;
    tracing::info!(
        "Minimum remaining time: {}ms",
        coordinator_config.min_remaining_ms
    );

    let event_manager = Arc::new(EventManager::with_capacity(
        coordinator_config.event_capacity,
    ));
    let coordinator = TimeoutCoordinator::new(coordinator_config, event_manager.clone());
    let console = Console::new(coordinator.clone(), config_manager);

    // Forward every event to stdout as a JSON line
    let mut events = event_manager.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::error!("Failed to serialize event: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event printer lagged, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    tracing::info!("Daemon ready, reading commands from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };

        let command = match line.parse::<Command>() {
            Ok(Command::Quit) => break,
            Ok(command) => command,
            Err(CommandError::Empty) => continue,
            Err(e) => {
                println!("{}", serde_json::json!({ "error": ConsoleError::from(e).to_string() }));
                continue;
            }
        };

        match console.execute(command).await {
            Ok(reply) => println!("{}", reply),
            Err(e) => {
                tracing::error!("Command failed: {}", e);
                println!("{}", serde_json::json!({ "error": e.to_string() }));
            }
        }
    }

    tracing::info!("Shutting down...");
    coordinator.dispose().await;
    printer.abort();

    Ok(())
}

//! # scriptforge-host
//!
//! The Scriptforge host process.
//!
//! The host is responsible for:
//! - Discovering and loading script plugins from the configured search dirs
//! - Driving the tick scheduler that plugin tasks and leak checks run on
//! - Delivering console-emitted events to plugin handlers
//! - Dispatching console lines to plugin commands
//! - Backing plugin key-value stores with SQLite
//!
//! ## Configuration
//!
//! The host reads configuration from `$XDG_CONFIG_HOME/scriptforge/config.toml`,
//! or from the path given with `--config <path>`.
//!
//! ## Running
//!
//! ```bash
//! cargo run --bin scriptforge-host
//!
//! # With debug logging
//! RUST_LOG=debug cargo run --bin scriptforge-host
//! ```

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use scriptforge_host::config::Config;
use scriptforge_host::console::ConsoleCommand;
use scriptforge_host::runtime::{ConsoleReply, HostRuntime};
use scriptforge_host::storage::SqliteStorage;

fn config_path_arg() -> Result<Option<PathBuf>> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().context("--config requires a path")?;
                return Ok(Some(PathBuf::from(path)));
            }
            other => anyhow::bail!("Unknown argument: {}", other),
        }
    }
    Ok(None)
}

fn load_config(path: Option<PathBuf>) -> Config {
    let loaded = match path {
        Some(path) => Config::load(&path),
        None => Config::load_default(),
    };
    match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load config, using defaults: {:#}", e);
            Config::default()
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = load_config(config_path_arg()?);

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.host.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!("Starting scriptforge-host v{}", env!("CARGO_PKG_VERSION"));

    let mut runtime = HostRuntime::new(&config, Rc::new(SqliteStorage::new()))?;
    let enabled = runtime.start();
    for plugin in runtime.registry().list_plugins() {
        info!(
            "Plugin: {} v{} ({}) from {}",
            plugin.name,
            plugin.version,
            plugin.state,
            plugin.root.display()
        );
    }
    info!("Host startup complete, {} plugin(s) enabled", enabled);
    info!("Type 'plugins', 'commands', 'emit <event> [json]' or a plugin command");

    let mut ticker = tokio::time::interval(Duration::from_millis(config.host.tick_millis));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                runtime.tick();
            }
            line = lines.next_line(), if stdin_open => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        info!("Console closed; running until Ctrl+C");
                        stdin_open = false;
                        continue;
                    }
                    Err(e) => {
                        warn!("Failed to read console input: {}", e);
                        stdin_open = false;
                        continue;
                    }
                };
                let reply = ConsoleCommand::parse(&line)
                    .and_then(|command| runtime.execute(command));
                match reply {
                    Ok(ConsoleReply::Output(output)) => {
                        for out in output {
                            println!("{}", out);
                        }
                    }
                    Ok(ConsoleReply::Quit) => break,
                    Err(e) => println!("Error: {:#}", e),
                }
            }
            _ = &mut ctrl_c => {
                break;
            }
        }
    }

    info!("Shutting down...");
    runtime.shutdown();
    info!("Host stopped");
    Ok(())
}

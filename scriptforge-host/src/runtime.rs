//! The host runtime: plugin registry, local services and console handling
//!
//! Everything here runs on the single thread that drives [`HostRuntime::tick`].

use crate::config::Config;
use crate::console::ConsoleCommand;
use anyhow::{Context, Result};
use scriptforge_plugin_api::host::{CommandOutcome, Event, StorageEngine};
use scriptforge_plugin_api::{LocalHost, PluginRegistry};
use std::path::PathBuf;
use std::rc::Rc;
use tracing::{info, warn};

/// What the console loop should do after a command.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleReply {
    /// Lines to print, then keep running.
    Output(Vec<String>),
    Quit,
}

/// Sender name used for commands typed at the host console.
pub const CONSOLE_SENDER: &str = "console";

pub struct HostRuntime {
    host: LocalHost,
    registry: PluginRegistry,
    search_dirs: Vec<PathBuf>,
    disabled: Vec<String>,
    leak_check_delay: u64,
}

impl HostRuntime {
    pub fn new(config: &Config, storage: Rc<dyn StorageEngine>) -> Result<Self> {
        let settings = config
            .host_settings()
            .context("Failed to resolve host settings")?;
        let leak_check_delay = settings.leak_check_delay;
        let host = LocalHost::with_storage(settings, storage);
        let registry = PluginRegistry::new(host.services());

        Ok(Self {
            host,
            registry,
            search_dirs: config.search_dirs(),
            disabled: config.plugins.disabled.clone(),
            leak_check_delay,
        })
    }

    /// Discover and load plugins, then enable all that are not configured
    /// as disabled. Returns how many plugins ended up enabled.
    pub fn start(&mut self) -> usize {
        let ids = self.registry.discover_and_load(&self.search_dirs);

        let mut enabled = 0;
        for id in ids {
            let Ok(plugin) = self.registry.get(id) else {
                continue;
            };
            if self.disabled.iter().any(|name| name == plugin.name()) {
                info!("Plugin '{}' is disabled by configuration", plugin.name());
                continue;
            }
            if let Err(e) = self.registry.enable(id) {
                warn!("Failed to enable plugin {}: {}", id, e);
            }
            if self.registry.get(id).map(|p| p.is_enabled()).unwrap_or(false) {
                enabled += 1;
            }
        }

        info!("Enabled {} of {} plugin(s)", enabled, self.registry.len());
        enabled
    }

    /// Advance the scheduler one tick.
    pub fn tick(&self) -> usize {
        self.host.tick()
    }

    /// Execute one console command.
    pub fn execute(&mut self, command: ConsoleCommand) -> Result<ConsoleReply> {
        let lines = match command {
            ConsoleCommand::Empty => Vec::new(),
            ConsoleCommand::Quit => return Ok(ConsoleReply::Quit),
            ConsoleCommand::Plugins => self
                .registry
                .list_plugins()
                .into_iter()
                .map(|info| {
                    format!(
                        "{} v{} [{}] {} command(s){}",
                        info.name,
                        info.version,
                        info.state,
                        info.live_commands,
                        if info.internal_apis { " (internal)" } else { "" }
                    )
                })
                .collect(),
            ConsoleCommand::Commands => self.host.commands.labels(),
            ConsoleCommand::Enable(name) => {
                let id = self.find(&name)?;
                self.registry.enable(id)?;
                let state = self.registry.get(id)?.state();
                vec![format!("{} is {}", name, state)]
            }
            ConsoleCommand::Disable(name) => {
                let id = self.find(&name)?;
                self.registry.disable(id)?;
                let state = self.registry.get(id)?.state();
                vec![format!("{} is {}", name, state)]
            }
            ConsoleCommand::Emit { kind, payload } => {
                let mut event = Event::new(kind, payload);
                let delivered = self.host.events.emit(&mut event);
                vec![format!(
                    "'{}' delivered to {} handler(s){}",
                    event.kind,
                    delivered,
                    if event.cancelled { ", cancelled" } else { "" }
                )]
            }
            ConsoleCommand::Dispatch(line) => {
                match self.host.commands.dispatch(CONSOLE_SENDER, &line) {
                    None => vec![format!("Unknown command: {}", line)],
                    Some(CommandOutcome::Handled) => Vec::new(),
                    Some(CommandOutcome::Rejected) => vec!["Usage error".to_string()],
                    Some(CommandOutcome::Failed(reason)) => {
                        vec![format!("Command failed: {}", reason)]
                    }
                    Some(CommandOutcome::Inert) => {
                        vec!["Command belongs to a disabled plugin".to_string()]
                    }
                }
            }
        };
        Ok(ConsoleReply::Output(lines))
    }

    /// Disable every plugin and run ticks until pending leak checks finish.
    pub fn shutdown(&mut self) {
        info!("Disabling {} plugin(s)", self.registry.len());
        self.registry.disable_all();

        let mut budget = self.leak_check_delay + 1;
        while self.host.leaks().pending() > 0 && budget > 0 {
            self.host.tick();
            budget -= 1;
        }

        let leaks = self.host.leaks().warnings();
        if leaks.is_empty() {
            info!("All plugin interpreters released");
        } else {
            warn!("{} plugin interpreter(s) outlived teardown", leaks.len());
        }
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn host(&self) -> &LocalHost {
        &self.host
    }

    fn find(&self, name: &str) -> Result<scriptforge_plugin_api::PluginId> {
        self.registry
            .find(name)
            .with_context(|| format!("No plugin named '{}'", name))
    }
}

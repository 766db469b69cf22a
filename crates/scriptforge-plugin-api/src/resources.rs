//! Per-plugin bookkeeping of everything registered with the host.
//!
//! Commands are tracked by token so teardown removes exactly this plugin's
//! registrations. Tasks and subscriptions are tracked for reporting only:
//! their callbacks go inert once the interpreter is gone and the host drops
//! them on their own. Storage handles are cached by name for the plugin's
//! whole lifetime, across enable cycles.

use crate::host::{
    Command, CommandToken, EventHandler, EventPriority, HostServices, StorageHandle,
    SubscriptionToken, TaskAction, TaskToken,
};
use scriptforge_runtime::{RuntimeError, RuntimeResult};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, warn};

/// When a task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSchedule {
    Once { delay: u64 },
    Repeating { delay: u64, period: u64 },
}

/// What teardown released.
#[derive(Debug, Default)]
pub struct TeardownReport {
    pub commands_unregistered: usize,
    pub tasks_released: usize,
    pub subscriptions_released: usize,

    /// Command tokens the table refused to unregister.
    pub failures: Vec<(CommandToken, RuntimeError)>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Host registrations owned by one plugin.
pub struct ResourceRegistry {
    plugin: String,
    services: HostServices,
    tasks: Vec<TaskToken>,
    subscriptions: Vec<SubscriptionToken>,
    commands: Vec<CommandToken>,
    storage: BTreeMap<String, StorageHandle>,
}

impl ResourceRegistry {
    pub fn new(plugin: impl Into<String>, services: HostServices) -> Self {
        Self {
            plugin: plugin.into(),
            services,
            tasks: Vec::new(),
            subscriptions: Vec::new(),
            commands: Vec::new(),
            storage: BTreeMap::new(),
        }
    }

    pub fn register_task(&mut self, schedule: TaskSchedule, action: TaskAction) -> TaskToken {
        let scheduler = &self.services.scheduler;
        let token = match schedule {
            TaskSchedule::Once { delay } => scheduler.schedule_once(&self.plugin, delay, action),
            TaskSchedule::Repeating { delay, period } => {
                scheduler.schedule_repeating(&self.plugin, delay, period, action)
            }
        };
        debug!(plugin = %self.plugin, "Scheduled {} ({:?})", token, schedule);
        self.tasks.push(token);
        token
    }

    pub fn register_event_subscription(
        &mut self,
        kind: &str,
        priority: EventPriority,
        handler: EventHandler,
        ignore_cancelled: bool,
    ) -> SubscriptionToken {
        let token =
            self.services
                .events
                .subscribe(&self.plugin, kind, priority, handler, ignore_cancelled);
        debug!(plugin = %self.plugin, "Subscribed to '{}' at {} ({})", kind, priority, token);
        self.subscriptions.push(token);
        token
    }

    /// Register a command namespaced by the plugin name.
    pub fn register_command(&mut self, command: Command) -> RuntimeResult<CommandToken> {
        let name = command.name.clone();
        let token = self.services.commands.register(&self.plugin, command)?;
        debug!(plugin = %self.plugin, "Registered command '{}' ({})", name, token);
        self.commands.push(token);
        Ok(token)
    }

    /// Open (or reuse) the named store under this plugin's storage directory.
    pub fn open_storage(&mut self, name: &str) -> RuntimeResult<StorageHandle> {
        if let Some(handle) = self.storage.get(name) {
            return Ok(handle.clone());
        }

        let path = self.storage_path(name)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let store = self.services.storage.open(&path)?;
        let handle = StorageHandle::new(name, path, store);
        debug!(plugin = %self.plugin, "Opened storage '{}' at {:?}", name, handle.path());
        self.storage.insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    fn storage_path(&self, name: &str) -> RuntimeResult<PathBuf> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\', ':']);
        if !valid {
            return Err(RuntimeError::Host(format!(
                "invalid storage name '{}'",
                name
            )));
        }
        Ok(self
            .services
            .settings
            .storage_dir
            .join(&self.plugin)
            .join(format!("{}.db", name)))
    }

    /// Release every registration made since the last teardown.
    ///
    /// Command failures are collected, not propagated, so one bad token
    /// cannot keep the remaining commands registered.
    pub fn teardown(&mut self) -> TeardownReport {
        let mut report = TeardownReport {
            tasks_released: self.tasks.len(),
            subscriptions_released: self.subscriptions.len(),
            ..TeardownReport::default()
        };

        for token in self.commands.drain(..) {
            match self.services.commands.unregister(token) {
                Ok(()) => report.commands_unregistered += 1,
                Err(err) => {
                    warn!(plugin = %self.plugin, "Failed to unregister {}: {}", token, err);
                    report.failures.push((token, err));
                }
            }
        }
        self.tasks.clear();
        self.subscriptions.clear();

        report
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    pub fn tasks(&self) -> &[TaskToken] {
        &self.tasks
    }

    pub fn subscriptions(&self) -> &[SubscriptionToken] {
        &self.subscriptions
    }

    pub fn commands(&self) -> &[CommandToken] {
        &self.commands
    }

    /// Names of stores opened so far.
    pub fn storage_names(&self) -> Vec<String> {
        self.storage.keys().cloned().collect()
    }
}

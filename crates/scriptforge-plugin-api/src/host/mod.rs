//! Host services that plugins reach through their script context.
//!
//! Each concern has a small trait (the contract a host must provide) and a
//! single-threaded local implementation used by the bundled host binary and
//! by tests. Every registration returns a token; teardown only ever hands
//! tokens back.

mod commands;
mod events;
mod scheduler;
mod storage;

pub use commands::{
    Command, CommandCompleter, CommandHandler, CommandInvocation, CommandMap, CommandOutcome,
    CommandTable,
};
pub use events::{Event, EventBus, EventHandler, EventPriority, LocalEventBus};
pub use scheduler::{LocalScheduler, Scheduler, TaskAction};
pub use storage::{KeyValueStore, MemoryStorage, MemoryStore, StorageEngine, StorageHandle};

use crate::leak::LeakTracker;
use scriptforge_runtime::EngineLimits;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

macro_rules! token_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

token_type!(
    /// Identifies a scheduled task.
    TaskToken,
    "task"
);
token_type!(
    /// Identifies an event subscription.
    SubscriptionToken,
    "subscription"
);
token_type!(
    /// Identifies one command registration.
    CommandToken,
    "command"
);

/// Whether a host callback still has a live interpreter behind it.
///
/// Callbacks report `Inert` once their plugin context is gone; host services
/// drop inert callbacks instead of invoking them again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Live,
    Inert,
}

/// Static host configuration shared by every plugin.
#[derive(Debug, Clone)]
pub struct HostSettings {
    /// Version string reported to scripts as `host::host_version()`.
    pub host_version: String,

    /// Root directory for plugin stores, `<storage_dir>/<plugin>/<name>.db`.
    pub storage_dir: PathBuf,

    /// Ticks to wait after teardown before checking the interpreter was freed.
    pub leak_check_delay: u64,

    pub engine_limits: EngineLimits,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            host_version: env!("CARGO_PKG_VERSION").to_string(),
            storage_dir: PathBuf::from("databases"),
            leak_check_delay: 100,
            engine_limits: EngineLimits::default(),
        }
    }
}

/// Name to root index of loaded plugins.
#[derive(Debug, Clone, Default)]
pub struct PluginDirectory {
    roots: Rc<RefCell<BTreeMap<String, PathBuf>>>,
}

impl PluginDirectory {
    pub fn insert(&self, name: &str, root: &Path) {
        self.roots
            .borrow_mut()
            .insert(name.to_string(), root.to_path_buf());
    }

    pub fn remove(&self, name: &str) {
        self.roots.borrow_mut().remove(name);
    }

    pub fn root_of(&self, name: &str) -> Option<PathBuf> {
        self.roots.borrow().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.roots.borrow().keys().cloned().collect()
    }
}

/// Everything a plugin context needs from its host.
#[derive(Clone)]
pub struct HostServices {
    pub scheduler: Rc<dyn Scheduler>,
    pub events: Rc<dyn EventBus>,
    pub commands: Rc<dyn CommandTable>,
    pub storage: Rc<dyn StorageEngine>,
    pub settings: Rc<HostSettings>,
    pub leaks: LeakTracker,
    pub directory: PluginDirectory,
}

impl HostServices {
    pub fn new(
        scheduler: Rc<dyn Scheduler>,
        events: Rc<dyn EventBus>,
        commands: Rc<dyn CommandTable>,
        storage: Rc<dyn StorageEngine>,
        settings: HostSettings,
    ) -> Self {
        Self {
            scheduler,
            events,
            commands,
            storage,
            settings: Rc::new(settings),
            leaks: LeakTracker::default(),
            directory: PluginDirectory::default(),
        }
    }
}

/// The local service implementations wired together.
///
/// Keeps concrete handles around so the embedder can drive ticks, emit
/// events and dispatch commands.
pub struct LocalHost {
    pub scheduler: Rc<LocalScheduler>,
    pub events: Rc<LocalEventBus>,
    pub commands: Rc<CommandMap>,
    services: HostServices,
}

impl LocalHost {
    /// Local services with in-memory storage.
    pub fn new(settings: HostSettings) -> Self {
        Self::with_storage(settings, Rc::new(MemoryStorage::new()))
    }

    pub fn with_storage(settings: HostSettings, storage: Rc<dyn StorageEngine>) -> Self {
        let scheduler = Rc::new(LocalScheduler::new());
        let events = Rc::new(LocalEventBus::new());
        let commands = Rc::new(CommandMap::new());
        let services = HostServices::new(
            scheduler.clone(),
            events.clone(),
            commands.clone(),
            storage,
            settings,
        );
        Self {
            scheduler,
            events,
            commands,
            services,
        }
    }

    /// A handle to the wired services, for registries and contexts.
    pub fn services(&self) -> HostServices {
        self.services.clone()
    }

    pub fn settings(&self) -> &HostSettings {
        &self.services.settings
    }

    pub fn leaks(&self) -> &LeakTracker {
        &self.services.leaks
    }

    /// Advance the scheduler by one tick.
    pub fn tick(&self) -> usize {
        self.scheduler.tick()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_display() {
        assert_eq!(TaskToken(3).to_string(), "task#3");
        assert_eq!(CommandToken(1).to_string(), "command#1");
    }

    #[test]
    fn test_directory() {
        let directory = PluginDirectory::default();
        let shared = directory.clone();
        directory.insert("alpha", Path::new("/plugins/alpha"));

        assert_eq!(shared.root_of("alpha"), Some(PathBuf::from("/plugins/alpha")));
        shared.remove("alpha");
        assert!(directory.names().is_empty());
    }
}

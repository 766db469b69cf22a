//! Plugin registry for managing loaded plugins.
//!
//! The registry handles plugin discovery, loading, enabling/disabling,
//! and provides access to loaded plugins. Plugins are addressed by
//! [`PluginId`], which also records the registry that minted it.

use crate::host::HostServices;
use crate::plugin::{Plugin, PluginState};
use scriptforge_runtime::{
    discover_plugin, discover_plugins, PluginCandidate, RuntimeError, RuntimeResult,
    MANIFEST_FILE,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a plugin inside one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PluginId {
    registry: u64,
    slot: u64,
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plugin#{}.{}", self.registry, self.slot)
    }
}

/// Summary of one plugin for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub state: PluginState,
    pub root: PathBuf,
    pub internal_apis: bool,

    /// Commands currently registered by the plugin.
    pub live_commands: usize,
}

/// Registry for managing script plugins.
pub struct PluginRegistry {
    id: u64,
    services: HostServices,

    /// Loaded plugins by slot; slots increase in load order.
    plugins: BTreeMap<u64, Plugin>,

    next_slot: u64,
}

impl PluginRegistry {
    /// Create a new empty registry.
    pub fn new(services: HostServices) -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            services,
            plugins: BTreeMap::new(),
            next_slot: 0,
        }
    }

    /// Discover and load all plugins from the given search directories.
    ///
    /// Failures are logged per plugin and never stop the others.
    pub fn discover_and_load(&mut self, search_dirs: &[PathBuf]) -> Vec<PluginId> {
        let discovery = discover_plugins(search_dirs);
        for failure in &discovery.failures {
            warn!("Skipping plugin at {:?}: {}", failure.root, failure.error);
        }

        let mut loaded = Vec::new();
        for candidate in discovery.candidates {
            let root = candidate.root.clone();
            match self.load(candidate) {
                Ok(id) => loaded.push(id),
                Err(e) => warn!("Failed to load plugin {:?}: {}", root, e),
            }
        }

        info!("Loaded {} plugins", loaded.len());
        loaded
    }

    /// Load a discovered plugin.
    ///
    /// Names are compared case-insensitively, matching how the command
    /// table folds namespaces.
    pub fn load(&mut self, candidate: PluginCandidate) -> RuntimeResult<PluginId> {
        let clash = self
            .plugins
            .values()
            .find(|plugin| plugin.name().eq_ignore_ascii_case(candidate.name()));
        if let Some(existing) = clash {
            return Err(RuntimeError::InvalidPlugin(format!(
                "Plugin '{}' clashes with already loaded plugin '{}'",
                candidate.name(),
                existing.name()
            )));
        }

        let plugin = Plugin::load(candidate, self.services.clone())?;
        self.services
            .directory
            .insert(plugin.name(), plugin.root());

        self.next_slot += 1;
        let slot = self.next_slot;
        self.plugins.insert(slot, plugin);

        Ok(PluginId {
            registry: self.id,
            slot,
        })
    }

    /// Load a plugin from a specific root directory.
    pub fn load_path(&mut self, root: &Path) -> RuntimeResult<PluginId> {
        let candidate = discover_plugin(root)?.ok_or_else(|| {
            RuntimeError::Manifest(format!("no {} in {:?}", MANIFEST_FILE, root))
        })?;
        self.load(candidate)
    }

    /// Enable a plugin.
    pub fn enable(&mut self, id: PluginId) -> RuntimeResult<()> {
        self.plugin_mut(id)?.enable()
    }

    /// Disable a plugin.
    pub fn disable(&mut self, id: PluginId) -> RuntimeResult<()> {
        self.plugin_mut(id)?.disable()
    }

    /// Disable and forget a plugin.
    pub fn unload(&mut self, id: PluginId) -> RuntimeResult<()> {
        self.plugin_mut(id)?.disable()?;
        if let Some(plugin) = self.plugins.remove(&id.slot) {
            self.services.directory.remove(plugin.name());
            info!("Unloaded plugin: {}", plugin.name());
        }
        Ok(())
    }

    /// Enable every plugin in load order. Returns how many ended up enabled.
    pub fn enable_all(&mut self) -> usize {
        let mut enabled = 0;
        for plugin in self.plugins.values_mut() {
            if let Err(e) = plugin.enable() {
                warn!("Failed to enable plugin {}: {}", plugin.name(), e);
            }
            if plugin.is_enabled() {
                enabled += 1;
            }
        }
        enabled
    }

    /// Disable every plugin in reverse load order.
    pub fn disable_all(&mut self) {
        for plugin in self.plugins.values_mut().rev() {
            if let Err(e) = plugin.disable() {
                warn!("Failed to disable plugin {}: {}", plugin.name(), e);
            }
        }
    }

    /// Find a loaded plugin by name.
    pub fn find(&self, name: &str) -> Option<PluginId> {
        self.plugins
            .iter()
            .find(|(_, plugin)| plugin.name() == name)
            .map(|(slot, _)| PluginId {
                registry: self.id,
                slot: *slot,
            })
    }

    /// Get a plugin by ID.
    pub fn get(&self, id: PluginId) -> RuntimeResult<&Plugin> {
        self.check_owner(id)?;
        self.plugins
            .get(&id.slot)
            .ok_or_else(|| RuntimeError::PluginNotFound(id.to_string()))
    }

    /// Summaries of all loaded plugins, in load order.
    pub fn list_plugins(&self) -> Vec<PluginInfo> {
        self.plugins
            .values()
            .map(|plugin| PluginInfo {
                name: plugin.name().to_string(),
                version: plugin.version().to_string(),
                state: plugin.state(),
                root: plugin.root().to_path_buf(),
                internal_apis: plugin.manifest().internal_apis(),
                live_commands: plugin.context().resources().commands().len(),
            })
            .collect()
    }

    /// IDs of all loaded plugins, in load order.
    pub fn ids(&self) -> Vec<PluginId> {
        self.plugins
            .keys()
            .map(|slot| PluginId {
                registry: self.id,
                slot: *slot,
            })
            .collect()
    }

    /// Get the number of loaded plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Check if no plugins are loaded.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn services(&self) -> &HostServices {
        &self.services
    }

    fn check_owner(&self, id: PluginId) -> RuntimeResult<()> {
        if id.registry != self.id {
            return Err(RuntimeError::ForeignPlugin(id.to_string()));
        }
        Ok(())
    }

    fn plugin_mut(&mut self, id: PluginId) -> RuntimeResult<&mut Plugin> {
        self.check_owner(id)?;
        self.plugins
            .get_mut(&id.slot)
            .ok_or_else(|| RuntimeError::PluginNotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostSettings, LocalHost};
    use tempfile::TempDir;

    fn write_plugin(dir: &Path, name: &str, main: &str) -> PathBuf {
        let root = dir.join(name);
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(
            root.join(MANIFEST_FILE),
            format!("[plugin]\nname = \"{name}\"\nversion = \"0.1.0\"\nmain = \"main.rhai\"\n"),
        )
        .unwrap();
        std::fs::write(root.join("main.rhai"), main).unwrap();
        root
    }

    fn local_host(dir: &TempDir) -> LocalHost {
        LocalHost::new(HostSettings {
            storage_dir: dir.path().join("databases"),
            ..HostSettings::default()
        })
    }

    #[test]
    fn test_registry_creation() {
        let dir = TempDir::new().unwrap();
        let host = local_host(&dir);
        let registry = PluginRegistry::new(host.services());
        assert!(registry.is_empty());
        assert!(registry.list_plugins().is_empty());
    }

    #[test]
    fn test_foreign_id_rejected() {
        let dir = TempDir::new().unwrap();
        let host = local_host(&dir);
        let root = write_plugin(dir.path(), "alpha", "");

        let mut first = PluginRegistry::new(host.services());
        let mut second = PluginRegistry::new(host.services());
        let id = first.load_path(&root).unwrap();

        assert!(matches!(
            second.enable(id),
            Err(RuntimeError::ForeignPlugin(_))
        ));
        assert!(matches!(second.get(id), Err(RuntimeError::ForeignPlugin(_))));
    }

    #[test]
    fn test_unknown_and_duplicate() {
        let dir = TempDir::new().unwrap();
        let host = local_host(&dir);
        let root = write_plugin(dir.path(), "alpha", "");

        let mut registry = PluginRegistry::new(host.services());
        let id = registry.load_path(&root).unwrap();
        assert!(matches!(
            registry.load_path(&root),
            Err(RuntimeError::InvalidPlugin(_))
        ));

        registry.unload(id).unwrap();
        assert!(matches!(
            registry.disable(id),
            Err(RuntimeError::PluginNotFound(_))
        ));
        assert!(host.services().directory.root_of("alpha").is_none());
    }

    #[test]
    fn test_names_differing_only_in_case_clash() {
        let dir = TempDir::new().unwrap();
        let host = local_host(&dir);
        let upper = write_plugin(dir.path(), "Foo", r#"host::register_command("help", [], |s, l, a| true, "");"#);
        let lower = write_plugin(dir.path(), "foo", r#"host::register_command("help", [], |s, l, a| true, "");"#);

        let mut registry = PluginRegistry::new(host.services());
        let id = registry.load_path(&upper).unwrap();
        assert!(matches!(
            registry.load_path(&lower),
            Err(RuntimeError::InvalidPlugin(_))
        ));
        assert_eq!(registry.len(), 1);
        assert!(registry.find("foo").is_none());

        registry.enable(id).unwrap();
        assert_eq!(registry.get(id).unwrap().state(), PluginState::Enabled);
        assert_eq!(host.commands.labels(), vec!["foo:help".to_string()]);
    }

    #[test]
    fn test_load_path_without_manifest() {
        let dir = TempDir::new().unwrap();
        let host = local_host(&dir);
        let mut registry = PluginRegistry::new(host.services());

        assert!(matches!(
            registry.load_path(dir.path()),
            Err(RuntimeError::Manifest(_))
        ));
    }

    #[test]
    fn test_list_plugins() {
        let dir = TempDir::new().unwrap();
        let host = local_host(&dir);
        let plugins = dir.path().join("plugins");
        write_plugin(
            &plugins,
            "alpha",
            r#"host::register_command("a", [], |s, l, x| true, "");"#,
        );
        write_plugin(&plugins, "beta", "");

        let mut registry = PluginRegistry::new(host.services());
        let ids = registry.discover_and_load(&[plugins]);
        assert_eq!(ids.len(), 2);
        assert_eq!(registry.enable_all(), 2);

        let infos = registry.list_plugins();
        assert_eq!(infos[0].name, "alpha");
        assert_eq!(infos[0].state, PluginState::Enabled);
        assert_eq!(infos[0].live_commands, 1);
        assert_eq!(infos[1].live_commands, 0);

        registry.disable_all();
        assert!(registry
            .list_plugins()
            .iter()
            .all(|info| info.state == PluginState::Disabled && info.live_commands == 0));
    }
}

//! A loaded plugin and its enable/disable state machine.

use crate::context::ScriptContext;
use crate::host::HostServices;
use crate::resources::TeardownReport;
use scriptforge_runtime::{
    bytes_to_string, PluginCandidate, PluginManifest, RuntimeError, RuntimeResult, ScriptValue,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Plugin lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    /// Registered but never enabled.
    Loaded,
    Enabled,
    Disabled,
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PluginState::Loaded => "loaded",
            PluginState::Enabled => "enabled",
            PluginState::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

/// A plugin instance owned by a registry.
pub struct Plugin {
    manifest: PluginManifest,
    root: PathBuf,
    data_dir: PathBuf,
    state: PluginState,
    context: ScriptContext,
    last_teardown: Option<TeardownReport>,
}

impl Plugin {
    /// Build a plugin from a discovered candidate.
    pub(crate) fn load(candidate: PluginCandidate, services: HostServices) -> RuntimeResult<Self> {
        let PluginCandidate { root, manifest } = candidate;
        manifest.validate()?;

        if let Err(e) = std::fs::read_dir(&root) {
            return Err(RuntimeError::InvalidPlugin(format!(
                "cannot read plugin root {:?}: {}",
                root, e
            )));
        }

        let data_dir = root.join("data");
        let context = ScriptContext::new(&manifest, &root, &data_dir, services);

        info!(
            "Loaded plugin: {} v{} from {:?}",
            manifest.name(),
            manifest.version(),
            root
        );

        Ok(Self {
            manifest,
            root,
            data_dir,
            state: PluginState::Loaded,
            context,
            last_teardown: None,
        })
    }

    /// Enable the plugin. No-op if already enabled.
    ///
    /// A failing entrypoint disables the plugin again; that failure is logged,
    /// not returned.
    pub fn enable(&mut self) -> RuntimeResult<()> {
        if self.state == PluginState::Enabled {
            return Ok(());
        }
        // Set first so a nested disable sees an enabled plugin.
        self.state = PluginState::Enabled;

        self.on_load();
        if let Err(err) = self.context.construct() {
            self.state = PluginState::Disabled;
            return Err(err);
        }

        match self.run_entrypoint() {
            Ok(()) => {
                info!("Enabled plugin: {} v{}", self.name(), self.version());
            }
            Err(reason) => {
                error!(
                    plugin = %self.name(),
                    "Failed to load the plugin, disabling: {}",
                    reason
                );
                self.disable()?;
            }
        }
        Ok(())
    }

    /// Disable the plugin. No-op unless enabled.
    pub fn disable(&mut self) -> RuntimeResult<()> {
        if self.state != PluginState::Enabled {
            return Ok(());
        }
        self.state = PluginState::Disabled;

        let report = self.context.destroy()?;
        info!("Disabled plugin: {}", self.name());
        self.last_teardown = Some(report);
        Ok(())
    }

    /// Hook run before the context is built on every enable.
    fn on_load(&self) {
        debug!("Preparing plugin: {}", self.name());
    }

    fn run_entrypoint(&self) -> Result<(), RuntimeError> {
        let path = self.manifest.entry_point_path(&self.root);
        let bytes = std::fs::read(&path).map_err(|e| {
            RuntimeError::InvalidPlugin(format!("cannot read entrypoint {:?}: {}", path, e))
        })?;
        let source = bytes_to_string(&bytes);

        let value = self
            .context
            .evaluate(&source, self.manifest.entry_point())?;
        if value == ScriptValue::Bool(false) {
            return Err(RuntimeError::InvalidPlugin(format!(
                "entrypoint {} returned false",
                self.manifest.entry_point()
            )));
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        self.manifest.name()
    }

    pub fn version(&self) -> &str {
        self.manifest.version()
    }

    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn state(&self) -> PluginState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.state == PluginState::Enabled
    }

    pub fn context(&self) -> &ScriptContext {
        &self.context
    }

    /// What the most recent disable released.
    pub fn last_teardown(&self) -> Option<&TeardownReport> {
        self.last_teardown.as_ref()
    }
}

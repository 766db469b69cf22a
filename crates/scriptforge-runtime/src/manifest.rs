//! Plugin manifest parsing.
//!
//! Each plugin root has a `manifest.toml` file that declares its name,
//! version, script entrypoint and whether it may use internal host APIs.

use crate::capability::CapabilitySet;
use crate::error::{RuntimeError, RuntimeResult};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// File name looked up in every candidate plugin root.
pub const MANIFEST_FILE: &str = "manifest.toml";

/// Plugin manifest structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Plugin metadata.
    pub plugin: PluginMetadata,
}

/// Plugin metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Unique plugin name, also used as the command namespace.
    #[serde(default)]
    pub name: String,

    /// Version string.
    #[serde(default)]
    pub version: String,

    /// Entrypoint script, relative to the plugin root.
    #[serde(default)]
    pub main: String,

    /// Grants access to internal host APIs.
    #[serde(default)]
    pub internal_apis: bool,

    /// Plugin description.
    #[serde(default)]
    pub description: Option<String>,

    /// Plugin author(s).
    #[serde(default)]
    pub authors: Vec<String>,
}

impl PluginManifest {
    /// Load a manifest from a TOML file.
    pub fn from_file(path: &Path) -> RuntimeResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a manifest from a TOML string.
    pub fn from_str(content: &str) -> RuntimeResult<Self> {
        let manifest: PluginManifest =
            toml::from_str(content).map_err(|e| RuntimeError::Manifest(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate the manifest.
    pub fn validate(&self) -> RuntimeResult<()> {
        if self.plugin.name.trim().is_empty() {
            return Err(RuntimeError::Manifest(
                "Plugin name cannot be empty".to_string(),
            ));
        }

        if self.plugin.name.contains(':') || self.plugin.name.contains(char::is_whitespace) {
            return Err(RuntimeError::Manifest(format!(
                "Plugin name '{}' may not contain ':' or whitespace",
                self.plugin.name
            )));
        }

        // The name becomes a directory under the storage root
        let name = self.plugin.name.as_str();
        if matches!(name, "." | "..") || name.contains(['/', '\\']) {
            return Err(RuntimeError::Manifest(format!(
                "Plugin name '{}' may not be a path",
                self.plugin.name
            )));
        }

        if self.plugin.version.trim().is_empty() {
            return Err(RuntimeError::Manifest(
                "Plugin version cannot be empty".to_string(),
            ));
        }

        if self.plugin.main.trim().is_empty() {
            return Err(RuntimeError::Manifest(
                "Plugin entrypoint (main) cannot be empty".to_string(),
            ));
        }

        let main = Path::new(&self.plugin.main);
        let stays_inside = main
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !stays_inside {
            return Err(RuntimeError::Manifest(format!(
                "Entrypoint '{}' must be a relative path inside the plugin root",
                self.plugin.main
            )));
        }

        Ok(())
    }

    /// Plugin name.
    pub fn name(&self) -> &str {
        &self.plugin.name
    }

    /// Plugin version.
    pub fn version(&self) -> &str {
        &self.plugin.version
    }

    /// Entrypoint as declared in the manifest.
    pub fn entry_point(&self) -> &str {
        &self.plugin.main
    }

    /// Resolve the entrypoint against a plugin root.
    pub fn entry_point_path(&self, root: &Path) -> PathBuf {
        root.join(&self.plugin.main)
    }

    /// Whether internal host APIs are exposed to this plugin.
    pub fn internal_apis(&self) -> bool {
        self.plugin.internal_apis
    }

    /// Get the capability set for this plugin.
    pub fn capability_set(&self) -> CapabilitySet {
        CapabilitySet::for_manifest(self)
    }
}

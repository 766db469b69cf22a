//! Plugin discovery from search directories.
//!
//! Every subdirectory of a search directory is a candidate plugin root. A
//! root is a plugin if it contains a `manifest.toml`; roots without one are
//! skipped silently. Search directories are scanned in order, and the first
//! plugin found for a given name wins.

use crate::error::{RuntimeError, RuntimeResult};
use crate::manifest::{PluginManifest, MANIFEST_FILE};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A plugin root with a parsed, validated manifest.
#[derive(Debug, Clone)]
pub struct PluginCandidate {
    /// Path to the plugin root directory.
    pub root: PathBuf,

    /// Parsed manifest.
    pub manifest: PluginManifest,
}

impl PluginCandidate {
    /// Get the plugin name.
    pub fn name(&self) -> &str {
        self.manifest.name()
    }

    /// Get the plugin version.
    pub fn version(&self) -> &str {
        self.manifest.version()
    }

    /// Get the path to the entry point file.
    pub fn entry_point_path(&self) -> PathBuf {
        self.manifest.entry_point_path(&self.root)
    }

    /// Check if the entry point file exists.
    pub fn has_entry_point(&self) -> bool {
        self.entry_point_path().is_file()
    }
}

/// A candidate root whose manifest could not be loaded.
#[derive(Debug)]
pub struct DiscoveryFailure {
    /// Root directory of the failed plugin.
    pub root: PathBuf,

    /// Why the manifest was rejected.
    pub error: RuntimeError,
}

/// Result of scanning one or more search directories.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Plugins ready to be loaded, in discovery order.
    pub candidates: Vec<PluginCandidate>,

    /// Roots that declared a manifest which failed to parse or validate.
    pub failures: Vec<DiscoveryFailure>,
}

impl Discovery {
    /// Number of discovered candidates.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// True if nothing loadable was found.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Get the user plugins directory.
pub fn user_plugins_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "raibid-labs", "scriptforge")
        .map(|dirs| dirs.data_dir().join("plugins"))
}

/// Discover plugins in every search directory, in priority order.
pub fn discover_plugins(search_dirs: &[PathBuf]) -> Discovery {
    let mut discovery = Discovery::default();
    let mut seen_names = HashSet::new();

    for dir in search_dirs {
        debug!("Scanning plugins directory: {:?}", dir);
        discover_in_directory(dir, &mut discovery, &mut seen_names);
    }

    info!(
        "Discovered {} plugins ({} rejected)",
        discovery.candidates.len(),
        discovery.failures.len()
    );
    discovery
}

/// Discover plugins in a specific directory.
pub fn discover_in_directory(
    dir: &Path,
    discovery: &mut Discovery,
    seen_names: &mut HashSet<String>,
) {
    if !dir.exists() {
        return;
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            warn!("Failed to read plugins directory {:?}: {}", dir, e);
            return;
        }
    };

    let mut roots: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    // read_dir order is platform dependent
    roots.sort();

    for root in roots {
        match discover_plugin(&root) {
            Ok(Some(candidate)) => {
                if !seen_names.insert(candidate.name().to_ascii_lowercase()) {
                    warn!(
                        "Skipping duplicate plugin '{}' at {:?}",
                        candidate.name(),
                        root
                    );
                    continue;
                }

                info!(
                    "Discovered plugin: {} v{} at {:?}",
                    candidate.name(),
                    candidate.version(),
                    root
                );
                discovery.candidates.push(candidate);
            }
            Ok(None) => {
                debug!("Skipping {:?}: no {}", root, MANIFEST_FILE);
            }
            Err(error) => {
                warn!("Failed to load manifest from {:?}: {}", root, error);
                discovery.failures.push(DiscoveryFailure { root, error });
            }
        }
    }
}

/// Discover a single plugin root.
///
/// Returns `Ok(None)` when the root has no manifest, which means it is not
/// a plugin rather than a broken one.
pub fn discover_plugin(root: &Path) -> RuntimeResult<Option<PluginCandidate>> {
    let manifest_path = root.join(MANIFEST_FILE);
    if !manifest_path.is_file() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(&manifest_path).map_err(|e| {
        RuntimeError::Manifest(format!("failed to read {:?}: {}", manifest_path, e))
    })?;
    let manifest = PluginManifest::from_str(&content)?;

    Ok(Some(PluginCandidate {
        root: root.to_path_buf(),
        manifest,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn create_test_plugin(dir: &Path, folder: &str, name: &str) {
        let plugin_dir = dir.join(folder);
        std::fs::create_dir_all(&plugin_dir).unwrap();

        let manifest = format!(
            r#"
[plugin]
name = "{name}"
version = "0.1.0"
main = "main.rhai"
"#
        );

        let manifest_path = plugin_dir.join(MANIFEST_FILE);
        let mut file = std::fs::File::create(manifest_path).unwrap();
        file.write_all(manifest.as_bytes()).unwrap();
    }

    #[test]
    fn test_discover_in_directory() {
        let temp_dir = TempDir::new().unwrap();

        create_test_plugin(temp_dir.path(), "plugin-a", "plugin-a");
        create_test_plugin(temp_dir.path(), "plugin-b", "plugin-b");

        let mut discovery = Discovery::default();
        let mut seen = HashSet::new();

        discover_in_directory(temp_dir.path(), &mut discovery, &mut seen);

        assert_eq!(discovery.len(), 2);
        assert!(discovery.failures.is_empty());
        assert!(seen.contains("plugin-a"));
        assert!(seen.contains("plugin-b"));
    }

    #[test]
    fn test_root_without_manifest_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("assets")).unwrap();
        create_test_plugin(temp_dir.path(), "plugin-a", "plugin-a");

        let discovery = discover_plugins(&[temp_dir.path().to_path_buf()]);

        assert_eq!(discovery.len(), 1);
        assert!(discovery.failures.is_empty());
        assert!(discover_plugin(&temp_dir.path().join("assets"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_malformed_manifest_does_not_stop_discovery() {
        let temp_dir = TempDir::new().unwrap();
        create_test_plugin(temp_dir.path(), "good", "good");

        let broken = temp_dir.path().join("broken");
        std::fs::create_dir_all(&broken).unwrap();
        std::fs::write(broken.join(MANIFEST_FILE), "[plugin]\nversion = \"1\"\n").unwrap();

        let discovery = discover_plugins(&[temp_dir.path().to_path_buf()]);

        assert_eq!(discovery.len(), 1);
        assert_eq!(discovery.candidates[0].name(), "good");
        assert_eq!(discovery.failures.len(), 1);
        assert_eq!(discovery.failures[0].root, broken);
        assert!(matches!(
            discovery.failures[0].error,
            RuntimeError::Manifest(_)
        ));
    }

    #[test]
    fn test_plugin_priority() {
        let temp_dir = TempDir::new().unwrap();

        let dir1 = temp_dir.path().join("dir1");
        let dir2 = temp_dir.path().join("dir2");
        std::fs::create_dir_all(&dir1).unwrap();
        std::fs::create_dir_all(&dir2).unwrap();

        create_test_plugin(&dir1, "same", "same-name");
        create_test_plugin(&dir2, "same", "same-name");

        // First directory takes priority
        let discovery = discover_plugins(&[dir1.clone(), dir2]);

        assert_eq!(discovery.len(), 1);
        assert!(discovery.candidates[0].root.starts_with(&dir1));
    }

    #[test]
    fn test_duplicate_names_ignore_case() {
        let temp_dir = TempDir::new().unwrap();
        create_test_plugin(temp_dir.path(), "a-upper", "Greeter");
        create_test_plugin(temp_dir.path(), "b-lower", "greeter");

        let discovery = discover_plugins(&[temp_dir.path().to_path_buf()]);

        assert_eq!(discovery.len(), 1);
        assert_eq!(discovery.candidates[0].name(), "Greeter");
    }
}

//! Configuration file loading and management
//!
//! This module handles loading and parsing the host configuration from
//! `$XDG_CONFIG_HOME/scriptforge/config.toml`. If the configuration file doesn't
//! exist, a default configuration is created with documented comments.

use anyhow::{Context, Result};
use scriptforge_plugin_api::HostSettings;
use scriptforge_runtime::EngineLimits;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main host configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Host process configuration
    #[serde(default)]
    pub host: HostConfig,
    /// Plugin loading configuration
    #[serde(default)]
    pub plugins: PluginsConfig,
    /// Interpreter limits applied to every plugin
    #[serde(default)]
    pub engine: EngineLimits,
}

/// Host process configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HostConfig {
    /// Milliseconds between scheduler ticks
    /// Default: 50 (20 ticks per second)
    pub tick_millis: u64,
    /// Log level (trace, debug, info, warn, error)
    /// Default: "info"
    pub log_level: String,
}

/// Plugin loading configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PluginsConfig {
    /// Directories scanned for plugins, in priority order
    /// If empty, uses XDG_DATA_HOME/scriptforge/plugins
    pub search_dirs: Vec<PathBuf>,
    /// Root directory for plugin storage
    /// If None, uses XDG_DATA_HOME/scriptforge/databases
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<PathBuf>,
    /// Ticks to wait after a plugin is disabled before checking for leaks
    /// Default: 100
    pub leak_check_delay_ticks: u64,
    /// Plugins that are loaded but not enabled at startup
    pub disabled: Vec<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            tick_millis: 50,
            log_level: "info".to_string(),
        }
    }
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            search_dirs: Vec::new(),
            storage_dir: None,
            leak_check_delay_ticks: 100,
            disabled: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from the specified path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default XDG config location
    ///
    /// If the configuration file doesn't exist, creates a default configuration
    /// file with documented comments.
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_file(&config_path)?;
        }

        Self::load(&config_path)
    }

    /// Get the default configuration file path
    ///
    /// Returns `$XDG_CONFIG_HOME/scriptforge/config.toml`
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = project_dirs()?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Create a default configuration file with documented comments
    fn create_default_file(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, Self::default_config_content())
            .with_context(|| format!("Failed to write default config file: {}", path.display()))?;

        tracing::info!("Created default configuration file at: {}", path.display());
        Ok(())
    }

    /// Generate the default configuration file content with comments
    fn default_config_content() -> String {
        r#"# Scriptforge Host Configuration

[host]
# Milliseconds between scheduler ticks
# Default: 50 (20 ticks per second)
tick_millis = 50

# Log level: trace, debug, info, warn, error
# RUST_LOG takes precedence when set
# Default: "info"
log_level = "info"

[plugins]
# Directories scanned for plugins, first match wins on duplicate names
# If empty, defaults to $XDG_DATA_HOME/scriptforge/plugins
search_dirs = []

# Root directory for plugin key-value stores
# If not specified, defaults to $XDG_DATA_HOME/scriptforge/databases
# storage_dir = "/path/to/databases"

# Ticks between disabling a plugin and checking its interpreter was freed
# Default: 100
leak_check_delay_ticks = 100

# Plugins loaded but left disabled at startup
disabled = []

[engine]
# Operation budget per evaluation or callback (0 = unlimited)
max_operations = 5000000

# Maximum script call depth
max_call_levels = 64

# Maximum string length in bytes (0 = unlimited)
max_string_size = 1048576
"#
        .to_string()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.host.tick_millis == 0 {
            anyhow::bail!("host.tick_millis must be greater than 0");
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.host.log_level.as_str()) {
            anyhow::bail!(
                "Invalid log_level: {}. Must be one of: {}",
                self.host.log_level,
                valid_log_levels.join(", ")
            );
        }

        if self.engine.max_call_levels == 0 {
            anyhow::bail!("engine.max_call_levels must be greater than 0");
        }

        Ok(())
    }

    /// Plugin search directories, falling back to the user plugins directory
    pub fn search_dirs(&self) -> Vec<PathBuf> {
        if !self.plugins.search_dirs.is_empty() {
            return self.plugins.search_dirs.clone();
        }
        scriptforge_runtime::discovery::user_plugins_dir()
            .into_iter()
            .collect()
    }

    /// Get the storage root directory
    ///
    /// Returns the configured path or the default XDG data directory path
    pub fn storage_dir(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.plugins.storage_dir {
            return Ok(path.clone());
        }
        let dirs = project_dirs()?;
        Ok(dirs.data_dir().join("databases"))
    }

    /// Settings handed to plugin contexts
    pub fn host_settings(&self) -> Result<HostSettings> {
        Ok(HostSettings {
            host_version: env!("CARGO_PKG_VERSION").to_string(),
            storage_dir: self.storage_dir()?,
            leak_check_delay: self.plugins.leak_check_delay_ticks,
            engine_limits: self.engine.clone(),
        })
    }
}

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "raibid-labs", "scriptforge")
        .context("Failed to determine project directories")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.host.tick_millis, 50);
        assert_eq!(config.host.log_level, "info");
        assert_eq!(config.plugins.leak_check_delay_ticks, 100);
        assert!(config.plugins.search_dirs.is_empty());
        assert!(config.plugins.storage_dir.is_none());
        assert_eq!(config.engine, EngineLimits::default());
    }

    #[test]
    fn test_default_content_parses() {
        let config: Config = toml::from_str(&Config::default_config_content()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[host]
tick_millis = 100
log_level = "debug"

[plugins]
search_dirs = ["/opt/plugins", "/home/me/plugins"]
storage_dir = "/var/lib/scriptforge"
disabled = ["noisy"]

[engine]
max_operations = 1000
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(config_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.host.tick_millis, 100);
        assert_eq!(config.host.log_level, "debug");
        assert_eq!(config.search_dirs().len(), 2);
        assert_eq!(
            config.storage_dir().unwrap(),
            PathBuf::from("/var/lib/scriptforge")
        );
        assert_eq!(config.plugins.disabled, vec!["noisy".to_string()]);
        assert_eq!(config.plugins.leak_check_delay_ticks, 100);
        assert_eq!(config.engine.max_operations, 1000);
        assert_eq!(config.engine.max_call_levels, 64);
    }

    #[test]
    fn test_load_empty_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.host.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_tick() {
        let mut config = Config::default();
        config.host.tick_millis = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_storage_dir_default() {
        let config = Config::default();
        let dir = config.storage_dir().unwrap();
        assert!(dir.to_string_lossy().contains("scriptforge"));
        assert!(dir.ends_with("databases"));
    }

    #[test]
    fn test_host_settings() {
        let mut config = Config::default();
        config.plugins.storage_dir = Some(PathBuf::from("/tmp/stores"));
        config.plugins.leak_check_delay_ticks = 40;

        let settings = config.host_settings().unwrap();
        assert_eq!(settings.storage_dir, PathBuf::from("/tmp/stores"));
        assert_eq!(settings.leak_check_delay, 40);
    }
}

//! Interpreter construction.
//!
//! Every enable cycle of a plugin gets a fresh engine built here. The engine
//! is bounded by [`EngineLimits`], routes `print`/`debug` output into the
//! host log, and resolves `import` statements relative to the plugin root.

use rhai::module_resolvers::FileModuleResolver;
use rhai::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Resource bounds applied to every plugin engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineLimits {
    /// Maximum operations per evaluation or callback (0 = unlimited).
    pub max_operations: u64,

    /// Maximum script function call depth.
    pub max_call_levels: usize,

    /// Maximum string length in bytes (0 = unlimited).
    pub max_string_size: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_operations: 5_000_000,
            max_call_levels: 64,
            max_string_size: 1024 * 1024,
        }
    }
}

/// Build an engine for one plugin.
pub fn build_engine(plugin_name: &str, plugin_root: &Path, limits: &EngineLimits) -> Engine {
    let mut engine = Engine::new();

    engine.set_max_operations(limits.max_operations);
    engine.set_max_call_levels(limits.max_call_levels);
    engine.set_max_string_size(limits.max_string_size);

    engine.set_module_resolver(FileModuleResolver::new_with_path(plugin_root));

    let name = plugin_name.to_string();
    engine.on_print(move |text| {
        tracing::info!(plugin = %name, "{}", text);
    });

    let name = plugin_name.to_string();
    engine.on_debug(move |text, source, pos| {
        tracing::debug!(
            plugin = %name,
            source = source.unwrap_or("<unknown>"),
            line = pos.line().unwrap_or(0),
            "{}",
            text
        );
    });

    engine
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_operation_limit() {
        let dir = TempDir::new().unwrap();
        let limits = EngineLimits {
            max_operations: 1_000,
            ..EngineLimits::default()
        };
        let engine = build_engine("spin", dir.path(), &limits);

        let result = engine.eval::<i64>("let x = 0; loop { x += 1; }");
        assert!(result.is_err());
    }

    #[test]
    fn test_import_relative_to_root() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("util.rhai"), "fn double(x) { x * 2 }").unwrap();

        let engine = build_engine("imports", dir.path(), &EngineLimits::default());
        let value = engine
            .eval::<i64>(r#"import "util" as util; util::double(21)"#)
            .unwrap();
        assert_eq!(value, 42);
    }
}

//! # scriptforge-runtime
//!
//! Runtime plumbing for Scriptforge script plugins.
//!
//! This crate provides:
//! - Plugin discovery from search directories
//! - Plugin manifest parsing and validation
//! - Capability flags for the host surface
//! - Interpreter construction with resource limits
//! - Value and error bridging between host and script
//!
//! ## Plugin Structure
//!
//! Plugins are directories containing:
//! - `manifest.toml` - Plugin name, version, entrypoint and flags
//! - the Rhai entrypoint named by `main`, plus any modules it imports
//!
//! ## Security Model
//!
//! Every plugin sees the same base surface. Internal host APIs are exposed
//! only when the manifest sets `internal_apis = true`.

pub mod capability;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod interop;
pub mod manifest;

pub use capability::{Capability, CapabilitySet};
pub use discovery::{
    discover_plugin, discover_plugins, Discovery, DiscoveryFailure, PluginCandidate,
};
pub use engine::{build_engine, EngineLimits};
pub use error::{RuntimeError, RuntimeResult};
pub use interop::{bytes_to_string, to_double, GuestError, ScriptValue};
pub use manifest::{PluginManifest, PluginMetadata, MANIFEST_FILE};

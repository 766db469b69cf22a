//! # scriptforge-plugin-api
//!
//! Plugin lifecycle for Scriptforge hosts.
//!
//! This crate ties the runtime to a host process. It provides:
//!
//! - A registry that loads, enables and disables plugins
//! - Per-plugin script contexts with a fresh interpreter per enable cycle
//! - The `host` module scripts use to schedule tasks, subscribe to events,
//!   register commands and open storage
//! - Teardown that releases everything a plugin registered, followed by a
//!   delayed leak check on the interpreter
//!
//! ## Threading
//!
//! Everything here is single-threaded. Interpreters, contexts and host
//! services use `Rc`/`RefCell`; drive them from one thread, e.g. a tokio
//! current-thread runtime.

pub mod context;
pub mod host;
pub mod interpreter;
pub mod leak;
pub mod plugin;
pub mod registry;
pub mod resources;
mod surface;

pub use context::ScriptContext;
pub use host::{HostServices, HostSettings, Liveness, LocalHost};
pub use interpreter::Interpreter;
pub use leak::{LeakTracker, LeakWarning};
pub use plugin::{Plugin, PluginState};
pub use registry::{PluginId, PluginInfo, PluginRegistry};
pub use resources::{ResourceRegistry, TaskSchedule, TeardownReport};

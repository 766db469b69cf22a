//! Error types for the Scriptforge runtime.

use crate::interop::GuestError;
use thiserror::Error;

/// Errors that can occur while loading, running or tearing down plugins.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Plugin declaration is missing required fields or cannot be parsed.
    #[error("Invalid manifest: {0}")]
    Manifest(String),

    /// Plugin root is missing, unreadable or otherwise unusable.
    #[error("Invalid plugin: {0}")]
    InvalidPlugin(String),

    /// No plugin with this identity is managed by the registry.
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    /// A plugin handle minted by a different registry was passed in.
    #[error("Not a plugin managed by this registry: {0}")]
    ForeignPlugin(String),

    /// Interpreter constructed twice, or used/destroyed while absent.
    #[error("Script context state error: {0}")]
    ContextState(String),

    /// Script code raised an error.
    #[error("Guest evaluation failed: {0}")]
    GuestEvaluation(GuestError),

    /// A host service (command table, storage engine, ...) refused a request.
    #[error("Host error: {0}")]
    Host(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl RuntimeError {
    /// Returns the guest error if this is a script-side failure.
    pub fn as_guest(&self) -> Option<&GuestError> {
        match self {
            RuntimeError::GuestEvaluation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<GuestError> for RuntimeError {
    fn from(err: GuestError) -> Self {
        RuntimeError::GuestEvaluation(err)
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

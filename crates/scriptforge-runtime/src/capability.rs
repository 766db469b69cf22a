//! Capability flags for the host surface exposed to scripts.
//!
//! Every plugin gets the base surface (scheduling, events, commands,
//! storage, logging, interop). Internal host APIs are granted only when the
//! manifest sets `internal_apis = true`.

use crate::manifest::PluginManifest;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A group of host operations a plugin can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// One-shot and repeating tasks.
    Scheduling,

    /// Event subscriptions.
    Events,

    /// Global command registration.
    Commands,

    /// Per-plugin key-value stores.
    Storage,

    /// Log output through the host logger.
    Logging,

    /// Value coercion and error catching helpers.
    Interop,

    /// Raw host access: other plugins' roots, process environment.
    Internal,
}

impl Capability {
    /// Capabilities every plugin receives.
    pub const BASE: [Capability; 6] = [
        Capability::Scheduling,
        Capability::Events,
        Capability::Commands,
        Capability::Storage,
        Capability::Logging,
        Capability::Interop,
    ];

    /// Parse a capability from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduling" => Some(Capability::Scheduling),
            "events" => Some(Capability::Events),
            "commands" => Some(Capability::Commands),
            "storage" => Some(Capability::Storage),
            "logging" => Some(Capability::Logging),
            "interop" => Some(Capability::Interop),
            "internal" => Some(Capability::Internal),
            _ => None,
        }
    }

    /// Convert capability to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Scheduling => "scheduling",
            Capability::Events => "events",
            Capability::Commands => "commands",
            Capability::Storage => "storage",
            Capability::Logging => "logging",
            Capability::Interop => "interop",
            Capability::Internal => "internal",
        }
    }
}

/// A set of capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    capabilities: HashSet<Capability>,
}

impl CapabilitySet {
    /// Create an empty capability set.
    pub fn new() -> Self {
        Self {
            capabilities: HashSet::new(),
        }
    }

    /// The base surface without internal APIs.
    pub fn base() -> Self {
        Capability::BASE.into_iter().collect()
    }

    /// The surface granted to a plugin by its manifest.
    pub fn for_manifest(manifest: &PluginManifest) -> Self {
        let mut set = Self::base();
        if manifest.internal_apis() {
            set.add(Capability::Internal);
        }
        set
    }

    /// Add a capability to the set.
    pub fn add(&mut self, cap: Capability) {
        self.capabilities.insert(cap);
    }

    /// Check if the set contains a capability.
    pub fn has(&self, cap: &Capability) -> bool {
        self.capabilities.contains(cap)
    }

    /// Get all capabilities in the set.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.capabilities.iter()
    }

    /// Get the number of capabilities.
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self {
            capabilities: iter.into_iter().collect(),
        }
    }
}

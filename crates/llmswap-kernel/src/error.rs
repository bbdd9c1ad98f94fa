//! Typed errors for the plugin sub-system.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Plugin operation result type using the typed [`PluginError`].
pub type PluginResult<T> = Result<T, PluginError>;

/// A resource class checked before a model is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// System memory
    Ram,
    /// Aggregate GPU memory
    Vram,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Ram => write!(f, "RAM"),
            ResourceKind::Vram => write!(f, "VRAM"),
        }
    }
}

/// Errors that can occur during plugin discovery, lifecycle and dispatch.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PluginError {
    /// A plugin package could not be turned into a registry entry.
    ///
    /// Discovery never propagates this; it is logged and the plugin skipped.
    #[error("Plugin discovery failed for {}: {reason}", path.display())]
    Discovery {
        /// Plugin directory that was being scanned.
        path: PathBuf,
        /// Why it was skipped.
        reason: String,
    },

    /// `initialize()` reported false; the plugin never became live.
    #[error("Plugin {0} failed to initialize")]
    InitializationFailed(String),

    /// The referenced plugin id is not registered or not live.
    #[error("Plugin not found: {0}")]
    NotFound(String),

    /// The plugin exists but is not initialized or not platform compatible.
    #[error("Plugin {0} is unavailable")]
    Unavailable(String),

    /// Declared requirements exceed the detected capacity.
    #[error(
        "Insufficient resources to load model {model} on plugin {plugin}: \
         {resource} requires {required_gb:.2}GB, {available_gb:.2}GB available"
    )]
    ResourceInsufficient {
        /// Plugin the model belongs to.
        plugin: String,
        /// Requested model.
        model: String,
        /// First deficient resource.
        resource: ResourceKind,
        /// Declared requirement.
        required_gb: f64,
        /// Detected capacity.
        available_gb: f64,
    },

    /// The backend does not override this capability.
    #[error("{0} is not implemented by this provider")]
    NotImplemented(String),

    /// The backend failed to make a model resident.
    #[error("Failed to load model {model} on plugin {plugin}: {reason}")]
    ModelLoadFailed {
        /// Plugin id.
        plugin: String,
        /// Model id.
        model: String,
        /// Backend reason.
        reason: String,
    },

    /// The backend itself returned an error (HTTP failure, bad payload, ...).
    #[error("Provider backend error: {0}")]
    Backend(String),

    /// Plugin or provider configuration is invalid or missing.
    #[error("Plugin configuration error: {0}")]
    Config(String),

    /// An I/O error surfaced during a plugin operation.
    #[error("Plugin I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// A (de)serialization error surfaced during a plugin operation.
    #[error("Plugin serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

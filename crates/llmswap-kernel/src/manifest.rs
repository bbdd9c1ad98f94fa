//! Plugin manifest (`manifest.json`) and host platform resolution.

use serde::{Deserialize, Serialize};

/// Manifest file name looked up in every plugin directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// The only plugin type the manager considers.
pub const MODEL_PROVIDER_TYPE: &str = "model_provider";

/// Entry file used when the manifest has no `main`.
pub const DEFAULT_MAIN: &str = "provider.toml";

/// Provider class used when the manifest has no `class`.
pub const DEFAULT_CLASS: &str = "ModelProvider";

fn default_main() -> String {
    DEFAULT_MAIN.to_string()
}

fn default_class() -> String {
    DEFAULT_CLASS.to_string()
}

/// Normalize an OS identifier: lowercase, `darwin` becomes `macos`.
pub fn normalize_platform(platform: &str) -> String {
    let lower = platform.trim().to_ascii_lowercase();
    match lower.as_str() {
        "darwin" => "macos".to_string(),
        _ => lower,
    }
}

/// Identifier of the running host: `windows`, `linux`, `macos`, or the raw OS name.
pub fn host_platform() -> String {
    normalize_platform(std::env::consts::OS)
}

/// Declarative plugin descriptor, read once at discovery.
///
/// `id` and `type` are defaulted to empty strings so a manifest missing them
/// still parses; [`PluginManifest::validate`] rejects it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Supported OS identifiers; empty means all
    #[serde(default)]
    pub platform: Vec<String>,
    /// Entry file inside the plugin directory
    #[serde(default = "default_main")]
    pub main: String,
    /// Provider class resolved through the provider catalog
    #[serde(default = "default_class")]
    pub class: String,
    /// Backend can host only one loaded model at a time
    #[serde(default)]
    pub exclusive_instance: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl PluginManifest {
    /// A model provider manifest with defaults for everything but the id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: MODEL_PROVIDER_TYPE.to_string(),
            platform: Vec::new(),
            main: default_main(),
            class: default_class(),
            exclusive_instance: false,
            endpoint: None,
        }
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform.push(platform.into());
        self
    }

    pub fn with_exclusive_instance(mut self, exclusive: bool) -> Self {
        self.exclusive_instance = exclusive;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn is_model_provider(&self) -> bool {
        self.kind == MODEL_PROVIDER_TYPE
    }

    /// Check the fields discovery requires: a non-empty id and the provider type.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("manifest has no id".to_string());
        }
        if !self.is_model_provider() {
            return Err(format!(
                "type is {:?}, expected {:?}",
                self.kind, MODEL_PROVIDER_TYPE
            ));
        }
        Ok(())
    }

    /// Normalized platform list.
    pub fn platforms(&self) -> Vec<String> {
        self.platform.iter().map(|p| normalize_platform(p)).collect()
    }

    /// An empty platform list supports every host.
    pub fn supports_platform(&self, host: &str) -> bool {
        let host = normalize_platform(host);
        self.platform.is_empty() || self.platform.iter().any(|p| normalize_platform(p) == host)
    }
}

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{ConfigResult, from_env, load_with_env};
use crate::types::PluginConfig;

/// Top level keys never read from the environment: variable names cannot
/// carry the case of a plugin id or of its settings.
const FILE_ONLY_KEYS: &[&str] = &["plugins"];

/// Prefix for environment overrides, e.g. `LLMSWAP_PLUGINS_DIR`.
pub const ENV_PREFIX: &str = "LLMSWAP";

/// Capacity overrides and detection fallbacks, in GB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Pin RAM capacity instead of detecting it
    pub ram_gb: Option<f64>,
    /// Pin VRAM capacity instead of detecting it
    pub vram_gb: Option<f64>,
    /// RAM assumed when detection yields nothing
    pub fallback_ram_gb: f64,
    /// VRAM assumed when no GPU tooling is found
    pub fallback_vram_gb: f64,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            ram_gb: None,
            vram_gb: None,
            fallback_ram_gb: 16.0,
            fallback_vram_gb: 0.0,
        }
    }
}

/// Top level manager configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Directory scanned for `<plugin>/manifest.json`
    pub plugins_dir: PathBuf,
    pub resources: ResourceConfig,
    /// Per-plugin config handed to `load_plugin`
    pub plugins: HashMap<String, PluginConfig>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            plugins_dir: PathBuf::from("plugins"),
            resources: ResourceConfig::default(),
            plugins: HashMap::new(),
        }
    }
}

impl ManagerConfig {
    /// Load from a file with `LLMSWAP_*` environment overrides applied on top.
    ///
    /// The `plugins` map comes from the file only.
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        load_with_env(path, ENV_PREFIX, FILE_ONLY_KEYS)
    }

    /// Defaults plus `LLMSWAP_*` environment overrides, with no plugin configs.
    pub fn from_env() -> ConfigResult<Self> {
        from_env(ENV_PREFIX, FILE_ONLY_KEYS)
    }

    pub fn with_plugins_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.plugins_dir = dir.into();
        self
    }

    /// Config for one plugin; empty when none is configured.
    pub fn plugin_config(&self, plugin_id: &str) -> PluginConfig {
        self.plugins.get(plugin_id).cloned().unwrap_or_default()
    }
}

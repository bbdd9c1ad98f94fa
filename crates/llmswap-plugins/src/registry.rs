//! Provider catalog and plugin registry
//!
//! The catalog maps provider class names to compiled-in factories; it stands
//! in for loading code by name at runtime. The registry maps plugin ids to a
//! constructible [`PluginHandle`] and remembers which ids were flagged
//! exclusive at discovery time.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use llmswap_kernel::{
    ModelProvider, PluginConfig, PluginManifest, PluginResult, ProviderContext, ProviderFactory,
};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::http::HttpModelProvider;

/// Class name → factory.
#[derive(Clone, Default)]
pub struct ProviderCatalog {
    factories: HashMap<String, ProviderFactory>,
}

impl ProviderCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog with every provider shipped in this crate.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.register(HttpModelProvider::CLASS, HttpModelProvider::factory());
        catalog
    }

    /// Register (or replace) a factory under `class`.
    pub fn register(&mut self, class: impl Into<String>, factory: ProviderFactory) -> &mut Self {
        let class = class.into();
        if self.factories.insert(class.clone(), factory).is_some() {
            debug!("Replacing provider factory for class {}", class);
        }
        self
    }

    /// Register a plain constructor function.
    pub fn register_fn<F>(&mut self, class: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn(ProviderContext) -> PluginResult<Box<dyn ModelProvider>> + Send + Sync + 'static,
    {
        self.register(class, Arc::new(constructor))
    }

    pub fn resolve(&self, class: &str) -> Option<ProviderFactory> {
        self.factories.get(class).cloned()
    }

    pub fn contains(&self, class: &str) -> bool {
        self.factories.contains_key(class)
    }

    pub fn classes(&self) -> Vec<String> {
        let mut classes: Vec<String> = self.factories.keys().cloned().collect();
        classes.sort();
        classes
    }
}

impl std::fmt::Debug for ProviderCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCatalog")
            .field("classes", &self.classes())
            .finish()
    }
}

/// A discovered plugin, constructible any number of times.
#[derive(Clone)]
pub struct PluginHandle {
    pub manifest: PluginManifest,
    /// Package directory; `None` for plugins registered in code
    pub plugin_dir: Option<PathBuf>,
    /// Settings read from the manifest's entry file
    pub settings: PluginConfig,
    pub factory: ProviderFactory,
}

impl PluginHandle {
    pub fn new(manifest: PluginManifest, factory: ProviderFactory) -> Self {
        Self {
            manifest,
            plugin_dir: None,
            settings: PluginConfig::new(),
            factory,
        }
    }

    pub fn with_plugin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugin_dir = Some(dir.into());
        self
    }

    pub fn with_settings(mut self, settings: PluginConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn id(&self) -> &str {
        &self.manifest.id
    }

    /// Build a provider: entry-file settings first, `config` keys override them.
    pub fn construct(&self, config: &PluginConfig) -> PluginResult<Box<dyn ModelProvider>> {
        let mut merged = self.settings.clone();
        merged.extend(config.iter().map(|(k, v)| (k.clone(), v.clone())));

        let context = ProviderContext {
            plugin_id: self.manifest.id.clone(),
            plugin_dir: self.plugin_dir.clone(),
            endpoint: self.manifest.endpoint.clone(),
            config: merged,
        };
        (self.factory)(context)
    }
}

impl std::fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHandle")
            .field("manifest", &self.manifest)
            .field("plugin_dir", &self.plugin_dir)
            .finish()
    }
}

/// Plugin id → handle, plus the exclusive-instance id set.
#[derive(Default)]
pub struct PluginRegistry {
    handles: RwLock<HashMap<String, PluginHandle>>,
    exclusive: RwLock<HashSet<String>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle. The first registration of an id wins.
    pub fn register(&self, handle: PluginHandle) -> Result<(), String> {
        let plugin_id = handle.id().to_string();
        let mut handles = self.handles.write();

        if handles.contains_key(&plugin_id) {
            return Err(format!("Plugin {} already registered", plugin_id));
        }

        if handle.manifest.exclusive_instance {
            self.exclusive.write().insert(plugin_id.clone());
        }

        info!(
            plugin_id = %plugin_id,
            class = %handle.manifest.class,
            exclusive = handle.manifest.exclusive_instance,
            "Registered plugin"
        );
        handles.insert(plugin_id, handle);
        Ok(())
    }

    pub fn unregister(&self, plugin_id: &str) -> Option<PluginHandle> {
        let removed = self.handles.write().remove(plugin_id);
        if removed.is_some() {
            self.exclusive.write().remove(plugin_id);
            info!(plugin_id = %plugin_id, "Unregistered plugin");
        } else {
            warn!(plugin_id = %plugin_id, "Unregister requested for unknown plugin");
        }
        removed
    }

    pub fn get(&self, plugin_id: &str) -> Option<PluginHandle> {
        self.handles.read().get(plugin_id).cloned()
    }

    pub fn contains(&self, plugin_id: &str) -> bool {
        self.handles.read().contains_key(plugin_id)
    }

    pub fn is_exclusive(&self, plugin_id: &str) -> bool {
        self.exclusive.read().contains(plugin_id)
    }

    /// Registered ids, sorted.
    pub fn plugin_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.handles.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn manifests(&self) -> Vec<PluginManifest> {
        let mut manifests: Vec<PluginManifest> = self
            .handles
            .read()
            .values()
            .map(|h| h.manifest.clone())
            .collect();
        manifests.sort_by(|a, b| a.id.cmp(&b.id));
        manifests
    }

    pub fn len(&self) -> usize {
        self.handles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.read().is_empty()
    }
}

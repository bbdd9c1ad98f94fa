//! Plugin manager
//!
//! Owns the registry, the live plugin map, the resource manager and the one
//! swap lock shared by every exclusive-instance plugin.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use llmswap_kernel::config::ManagerConfig;
use llmswap_kernel::{
    GenerateOptions, Generation, ModelDescriptor, ModelId, PluginConfig, PluginError,
    PluginManifest, PluginResult, ProviderFactory, host_platform,
};
use parking_lot::RwLock;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, error, info, warn};

use crate::discovery::discover_plugins;
use crate::instance::PluginInstance;
use crate::registry::{PluginHandle, PluginRegistry, ProviderCatalog};
use crate::resource::ResourceManager;

/// Lifecycle notifications published by the manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagerEvent {
    PluginLoaded {
        plugin_id: String,
    },
    PluginUnloaded {
        plugin_id: String,
    },
    /// An exclusive plugin's resident model changed
    ModelSwapped {
        plugin_id: String,
        from: Option<ModelId>,
        to: ModelId,
    },
    /// A swap was refused before anything was unloaded
    SwapRejected {
        plugin_id: String,
        model: ModelId,
        reason: String,
    },
}

pub struct PluginManager {
    catalog: ProviderCatalog,
    registry: PluginRegistry,
    plugins: RwLock<HashMap<String, Arc<PluginInstance>>>,
    /// Serializes swap decisions across all exclusive plugins
    swap_lock: Mutex<()>,
    resources: ResourceManager,
    event_tx: broadcast::Sender<ManagerEvent>,
}

impl PluginManager {
    pub fn new(resources: ResourceManager, catalog: ProviderCatalog) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            catalog,
            registry: PluginRegistry::new(),
            plugins: RwLock::new(HashMap::new()),
            swap_lock: Mutex::new(()),
            resources,
            event_tx,
        }
    }

    pub fn from_config(config: &ManagerConfig, catalog: ProviderCatalog) -> Self {
        Self::new(ResourceManager::new(config.resources.clone()), catalog)
    }

    /// Detect host resources. Call once before loading models.
    pub async fn initialize(&self) {
        self.resources.initialize().await;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: ManagerEvent) {
        // No receivers is fine.
        let _ = self.event_tx.send(event);
    }

    /// Scan `plugins_dir` and register every valid package.
    ///
    /// Returns how many plugins were newly registered. Ids already known are
    /// skipped. Not safe to run concurrently with itself.
    pub fn discover(&self, plugins_dir: &Path) -> usize {
        let mut registered = 0;
        for handle in discover_plugins(plugins_dir, &self.catalog) {
            match self.registry.register(handle) {
                Ok(()) => registered += 1,
                Err(e) => warn!(path = %plugins_dir.display(), "{}", e),
            }
        }
        registered
    }

    /// Register a plugin built into the host application.
    pub fn register_plugin(
        &self,
        manifest: PluginManifest,
        factory: ProviderFactory,
    ) -> PluginResult<()> {
        manifest.validate().map_err(PluginError::Config)?;
        self.registry
            .register(PluginHandle::new(manifest, factory))
            .map_err(PluginError::Config)
    }

    /// Construct, initialize and make `plugin_id` live.
    ///
    /// An instance whose `initialize()` reports false is dropped without
    /// entering the live map. Loading an id that is already live replaces the
    /// running instance, which is then shut down.
    pub async fn load_plugin(
        &self,
        plugin_id: &str,
        config: PluginConfig,
    ) -> PluginResult<Arc<PluginInstance>> {
        let handle = self
            .registry
            .get(plugin_id)
            .ok_or_else(|| PluginError::NotFound(plugin_id.to_string()))?;

        let provider = handle.construct(&config).map_err(|e| {
            error!(plugin_id = %plugin_id, "Failed to construct provider: {}", e);
            PluginError::InitializationFailed(plugin_id.to_string())
        })?;

        let instance = PluginInstance::new(plugin_id, provider, config)
            .with_exclusive(self.registry.is_exclusive(plugin_id))
            .with_platforms(handle.manifest.platforms(), &host_platform())
            .with_endpoint(handle.manifest.endpoint.clone());

        if !instance.initialize().await {
            warn!(plugin_id = %plugin_id, "Plugin failed to initialize, not registering");
            return Err(PluginError::InitializationFailed(plugin_id.to_string()));
        }

        let instance = Arc::new(instance);
        let previous = self
            .plugins
            .write()
            .insert(plugin_id.to_string(), Arc::clone(&instance));

        if let Some(previous) = previous {
            info!(plugin_id = %plugin_id, "Replacing live plugin instance");
            if let Err(e) = previous.shutdown().await {
                warn!(plugin_id = %plugin_id, "Shutdown of replaced instance failed: {}", e);
            }
        }

        info!(
            plugin_id = %plugin_id,
            provider = instance.provider_name(),
            exclusive = instance.is_exclusive(),
            "Plugin loaded"
        );
        self.emit(ManagerEvent::PluginLoaded {
            plugin_id: plugin_id.to_string(),
        });
        Ok(instance)
    }

    /// Shut down and remove a live plugin. Returns false if it was not live.
    ///
    /// Shutdown errors are logged; the plugin is removed regardless.
    pub async fn unload_plugin(&self, plugin_id: &str) -> bool {
        let removed = self.plugins.write().remove(plugin_id);
        let Some(instance) = removed else {
            debug!(plugin_id = %plugin_id, "Unload requested for plugin that is not live");
            return false;
        };

        if let Err(e) = instance.shutdown().await {
            error!(plugin_id = %plugin_id, "Plugin shutdown failed: {}", e);
        }

        info!(plugin_id = %plugin_id, "Plugin unloaded");
        self.emit(ManagerEvent::PluginUnloaded {
            plugin_id: plugin_id.to_string(),
        });
        true
    }

    /// Models of every available live plugin, keyed by plugin id.
    ///
    /// A plugin whose listing fails is logged and left out.
    pub async fn list_available_models(&self) -> HashMap<String, Vec<ModelDescriptor>> {
        let mut models = HashMap::new();
        for instance in self.live_snapshot() {
            if !instance.is_available() {
                debug!(plugin_id = %instance.id(), "Skipping unavailable plugin");
                continue;
            }
            match instance.list_models().await {
                Ok(list) => {
                    models.insert(instance.id().to_string(), list);
                }
                Err(e) => {
                    error!(plugin_id = %instance.id(), "Failed to list models: {}", e);
                }
            }
        }
        models
    }

    /// Generate with `model_id`, swapping it in first on exclusive plugins.
    ///
    /// Only the swap decision runs under the swap lock; the generation
    /// itself does not. A generation in flight on one model can therefore
    /// overlap a later call that swaps the same plugin to another model.
    pub async fn generate_text(
        &self,
        plugin_id: &str,
        model_id: &str,
        prompt: &str,
        options: &GenerateOptions,
    ) -> PluginResult<Generation> {
        let instance = self.available_plugin(plugin_id)?;
        if instance.is_exclusive() {
            self.swap_to(&instance, model_id).await?;
        }
        instance.generate_text(model_id, prompt, options).await
    }

    /// Make `model_id` resident without generating.
    ///
    /// Non-exclusive plugins succeed immediately and never take the swap lock.
    pub async fn load_model(&self, plugin_id: &str, model_id: &str) -> PluginResult<()> {
        let instance = self.available_plugin(plugin_id)?;
        if !instance.is_exclusive() {
            return Ok(());
        }
        self.swap_to(&instance, model_id).await
    }

    /// Release `model_id` if it is resident on an exclusive plugin.
    pub async fn unload_model(&self, plugin_id: &str, model_id: &str) -> PluginResult<()> {
        let instance = self
            .get_plugin(plugin_id)
            .ok_or_else(|| PluginError::NotFound(plugin_id.to_string()))?;
        if !instance.is_exclusive() {
            return Ok(());
        }

        let _guard = self.swap_lock.lock().await;
        instance.unload_model(model_id).await
    }

    /// Resource check then load, with the swap lock held throughout.
    ///
    /// The check runs before the plugin unloads anything, so a rejected swap
    /// leaves the current model resident.
    async fn swap_to(&self, instance: &PluginInstance, model_id: &str) -> PluginResult<()> {
        let _guard = self.swap_lock.lock().await;

        let current = instance.active_model().await;
        if current.as_deref() == Some(model_id) {
            return Ok(());
        }

        let requirements = instance.get_resource_requirements(model_id).await?;
        if let Err(shortfall) = self.resources.admit(&requirements) {
            let err = PluginError::ResourceInsufficient {
                plugin: instance.id().to_string(),
                model: model_id.to_string(),
                resource: shortfall.resource,
                required_gb: shortfall.required_gb,
                available_gb: shortfall.available_gb,
            };
            self.emit(ManagerEvent::SwapRejected {
                plugin_id: instance.id().to_string(),
                model: model_id.to_string(),
                reason: err.to_string(),
            });
            return Err(err);
        }

        info!(
            plugin_id = %instance.id(),
            from = ?current,
            to = %model_id,
            "Swapping model"
        );
        instance.load_model(model_id).await?;

        self.emit(ManagerEvent::ModelSwapped {
            plugin_id: instance.id().to_string(),
            from: current,
            to: model_id.to_string(),
        });
        Ok(())
    }

    fn available_plugin(&self, plugin_id: &str) -> PluginResult<Arc<PluginInstance>> {
        let instance = self
            .get_plugin(plugin_id)
            .ok_or_else(|| PluginError::NotFound(plugin_id.to_string()))?;
        if !instance.is_available() {
            return Err(PluginError::Unavailable(plugin_id.to_string()));
        }
        Ok(instance)
    }

    fn live_snapshot(&self) -> Vec<Arc<PluginInstance>> {
        let mut instances: Vec<_> = self.plugins.read().values().cloned().collect();
        instances.sort_by(|a, b| a.id().cmp(b.id()));
        instances
    }

    /// Unload every live plugin, then shut down the resource manager.
    ///
    /// One plugin failing to shut down never stops the rest.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.plugins.read().keys().cloned().collect();
        for plugin_id in ids {
            self.unload_plugin(&plugin_id).await;
        }
        self.plugins.write().clear();
        self.resources.shutdown().await;
        info!("Plugin manager shut down");
    }

    pub fn get_plugin(&self, plugin_id: &str) -> Option<Arc<PluginInstance>> {
        self.plugins.read().get(plugin_id).cloned()
    }

    /// Live plugin ids, sorted.
    pub fn plugin_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.plugins.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Manifests of every registered (not necessarily live) plugin.
    pub fn registered_plugins(&self) -> Vec<PluginManifest> {
        self.registry.manifests()
    }

    pub fn is_exclusive(&self, plugin_id: &str) -> bool {
        self.registry.is_exclusive(plugin_id)
    }

    pub async fn active_model(&self, plugin_id: &str) -> Option<ModelId> {
        let instance = self.get_plugin(plugin_id)?;
        instance.active_model().await
    }

    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    pub fn catalog(&self) -> &ProviderCatalog {
        &self.catalog
    }
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("registered", &self.registry.plugin_ids())
            .field("live", &self.plugin_ids())
            .finish()
    }
}

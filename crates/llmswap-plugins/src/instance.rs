//! Live plugin instance
//!
//! Wraps one provider backend with the bookkeeping every plugin shares:
//! platform compatibility, initialization state and, for exclusive-instance
//! plugins, the single loaded-model slot.

use std::sync::atomic::{AtomicBool, Ordering};

use llmswap_kernel::{
    GenerateOptions, Generation, ModelDescriptor, ModelId, ModelProvider, PluginConfig,
    PluginError, PluginResult, ResourceRequirements,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// A loaded plugin: backend plus lifecycle state.
///
/// For non-exclusive plugins `load_model`/`unload_model` succeed without
/// touching the backend and `active_model` stays `None`. For exclusive
/// plugins the slot holds at most one model; the unload-then-load swap runs
/// with the slot locked, so no caller ever observes two active models.
pub struct PluginInstance {
    id: String,
    config: PluginConfig,
    supported_platforms: Vec<String>,
    endpoint: Option<String>,
    exclusive: bool,
    platform_compatible: bool,
    initialized: AtomicBool,
    active_model: Mutex<Option<ModelId>>,
    provider: Box<dyn ModelProvider>,
}

impl PluginInstance {
    /// Wrap a freshly constructed provider. Nothing is initialized yet.
    pub fn new(
        id: impl Into<String>,
        provider: Box<dyn ModelProvider>,
        config: PluginConfig,
    ) -> Self {
        Self {
            id: id.into(),
            config,
            supported_platforms: Vec::new(),
            endpoint: None,
            exclusive: false,
            platform_compatible: true,
            initialized: AtomicBool::new(false),
            active_model: Mutex::new(None),
            provider,
        }
    }

    /// Stamp the manifest's platform list and record whether `host` is in it.
    pub fn with_platforms(mut self, platforms: Vec<String>, host: &str) -> Self {
        self.platform_compatible = platforms.is_empty() || platforms.iter().any(|p| p == host);
        self.supported_platforms = platforms;
        self
    }

    pub fn with_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn with_exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn supported_platforms(&self) -> &[String] {
        &self.supported_platforms
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn is_platform_compatible(&self) -> bool {
        self.platform_compatible
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Initialized and platform compatible.
    pub fn is_available(&self) -> bool {
        self.is_initialized() && self.platform_compatible
    }

    /// Returns false, without raising, when the platform is incompatible or
    /// the backend's own setup fails.
    pub async fn initialize(&self) -> bool {
        if !self.platform_compatible {
            warn!(
                plugin_id = %self.id,
                platforms = ?self.supported_platforms,
                "Plugin does not support this platform"
            );
            return false;
        }

        if let Err(e) = self.provider.initialize().await {
            error!(plugin_id = %self.id, "Provider initialization failed: {}", e);
            return false;
        }

        self.initialized.store(true, Ordering::SeqCst);
        debug!(plugin_id = %self.id, provider = self.provider.name(), "Plugin initialized");
        true
    }

    pub async fn list_models(&self) -> PluginResult<Vec<ModelDescriptor>> {
        self.provider.list_models().await
    }

    pub async fn get_model_info(&self, model_id: &str) -> PluginResult<Option<ModelDescriptor>> {
        let models = self.provider.list_models().await?;
        Ok(models.into_iter().find(|m| m.id == model_id))
    }

    /// Declared requirements, `"unknown"` when the model or its declaration is missing.
    pub async fn get_resource_requirements(
        &self,
        model_id: &str,
    ) -> PluginResult<ResourceRequirements> {
        Ok(self
            .get_model_info(model_id)
            .await?
            .map(|m| m.requirements())
            .unwrap_or_default())
    }

    pub async fn generate_text(
        &self,
        model_id: &str,
        prompt: &str,
        options: &GenerateOptions,
    ) -> PluginResult<Generation> {
        self.provider.generate_text(model_id, prompt, options).await
    }

    /// Model currently resident, exclusive plugins only.
    pub async fn active_model(&self) -> Option<ModelId> {
        self.active_model.lock().await.clone()
    }

    /// Make `model_id` the resident model.
    ///
    /// Idempotent when it already is. Otherwise the current model is unloaded
    /// first. If that unload fails the slot keeps the current model and the
    /// new load is not attempted; if the new load fails the slot is left
    /// empty, since the previous model is already gone.
    pub async fn load_model(&self, model_id: &str) -> PluginResult<()> {
        if !self.exclusive {
            return Ok(());
        }

        let mut slot = self.active_model.lock().await;
        if slot.as_deref() == Some(model_id) {
            debug!(plugin_id = %self.id, model = model_id, "Model already active");
            return Ok(());
        }

        if let Some(previous) = slot.as_deref() {
            info!(plugin_id = %self.id, model = previous, "Unloading active model");
            self.provider
                .unload_model(previous)
                .await
                .map_err(|e| PluginError::ModelLoadFailed {
                    plugin: self.id.clone(),
                    model: model_id.to_string(),
                    reason: format!("could not unload {}: {}", previous, e),
                })?;
            *slot = None;
        }

        info!(plugin_id = %self.id, model = model_id, "Loading model");
        if let Err(e) = self.provider.load_model(model_id).await {
            error!(plugin_id = %self.id, model = model_id, "Model load failed: {}", e);
            return Err(PluginError::ModelLoadFailed {
                plugin: self.id.clone(),
                model: model_id.to_string(),
                reason: e.to_string(),
            });
        }

        *slot = Some(model_id.to_string());
        Ok(())
    }

    /// Release `model_id` if it is the resident model; anything else is a no-op.
    pub async fn unload_model(&self, model_id: &str) -> PluginResult<()> {
        if !self.exclusive {
            return Ok(());
        }

        let mut slot = self.active_model.lock().await;
        if slot.as_deref() != Some(model_id) {
            return Ok(());
        }

        self.provider.unload_model(model_id).await?;
        *slot = None;
        info!(plugin_id = %self.id, model = model_id, "Model unloaded");
        Ok(())
    }

    /// Unload the active model, tear down the backend and mark uninitialized.
    ///
    /// The instance ends uninitialized even when a step fails; the first error is returned.
    pub async fn shutdown(&self) -> PluginResult<()> {
        let mut first_error = None;

        let active = self.active_model.lock().await.take();
        if let Some(model) = active {
            if let Err(e) = self.provider.unload_model(&model).await {
                warn!(plugin_id = %self.id, model = %model, "Unload during shutdown failed: {}", e);
                first_error = Some(e);
            }
        }

        if let Err(e) = self.provider.shutdown().await {
            warn!(plugin_id = %self.id, "Provider shutdown failed: {}", e);
            first_error.get_or_insert(e);
        }

        self.initialized.store(false, Ordering::SeqCst);
        debug!(plugin_id = %self.id, "Plugin shut down");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginInstance")
            .field("id", &self.id)
            .field("provider", &self.provider.name())
            .field("exclusive", &self.exclusive)
            .field("platform_compatible", &self.platform_compatible)
            .field("initialized", &self.is_initialized())
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

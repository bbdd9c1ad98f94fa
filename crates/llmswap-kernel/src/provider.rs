//! Provider capability contract
//!
//! A [`ModelProvider`] is the backend half of a plugin: it knows how to talk to
//! an inference runtime. Lifecycle bookkeeping (platform checks, the exclusive
//! single-model slot, availability) lives in the runtime's plugin instance,
//! which calls these hooks. Every hook is a suspension point.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{PluginError, PluginResult};
use crate::types::{GenerateOptions, Generation, ModelDescriptor, PluginConfig};

/// Everything a factory gets to construct a provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderContext {
    pub plugin_id: String,
    /// Plugin package directory, if discovered from disk
    pub plugin_dir: Option<PathBuf>,
    /// Endpoint declared in the manifest
    pub endpoint: Option<String>,
    /// Entry-file settings overlaid with the caller's config
    pub config: PluginConfig,
}

impl ProviderContext {
    pub fn new(plugin_id: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            ..Default::default()
        }
    }

    pub fn with_config(mut self, config: PluginConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Deserialize the opaque config into a provider specific type.
    pub fn typed_config<T: DeserializeOwned>(&self) -> PluginResult<T> {
        let object = Value::Object(self.config.clone().into_iter().collect());
        serde_json::from_value(object).map_err(|e| {
            PluginError::Config(format!("invalid config for plugin {}: {}", self.plugin_id, e))
        })
    }
}

/// Constructs a provider for one `load_plugin` call.
///
/// Registered once per plugin id and reused across loads with different configs.
pub type ProviderFactory =
    Arc<dyn Fn(ProviderContext) -> PluginResult<Box<dyn ModelProvider>> + Send + Sync>;

/// Capability hooks a concrete backend implements.
///
/// Only [`list_models`](ModelProvider::list_models) is required. The defaults
/// describe a backend with nothing to set up and nothing to page in or out;
/// [`generate_text`](ModelProvider::generate_text) fails with
/// [`PluginError::NotImplemented`] until overridden.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Backend name, used in logs
    fn name(&self) -> &str;

    /// Backend specific setup. An error makes the plugin's `initialize()` report false.
    async fn initialize(&self) -> PluginResult<()> {
        Ok(())
    }

    /// Models this backend can serve
    async fn list_models(&self) -> PluginResult<Vec<ModelDescriptor>>;

    /// Run a single generation against an already resident model
    async fn generate_text(
        &self,
        model_id: &str,
        prompt: &str,
        options: &GenerateOptions,
    ) -> PluginResult<Generation> {
        let _ = (model_id, prompt, options);
        Err(PluginError::NotImplemented("generate_text".to_string()))
    }

    /// Make `model_id` resident. Only called for exclusive-instance plugins.
    async fn load_model(&self, model_id: &str) -> PluginResult<()> {
        let _ = model_id;
        Ok(())
    }

    /// Release `model_id`. Only called for exclusive-instance plugins.
    async fn unload_model(&self, model_id: &str) -> PluginResult<()> {
        let _ = model_id;
        Ok(())
    }

    /// Backend teardown
    async fn shutdown(&self) -> PluginResult<()> {
        Ok(())
    }
}

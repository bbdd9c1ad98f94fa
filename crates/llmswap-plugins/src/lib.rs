//! # llmswap-plugins
//!
//! Runtime for model provider plugins:
//!
//! - [`discovery`]: scan a plugins directory for `manifest.json` packages
//! - [`registry`]: provider class catalog and the plugin id registry
//! - [`instance`]: a live plugin with its exclusive single-model slot
//! - [`resource`]: host RAM/VRAM capacity and admission checks
//! - [`manager`]: resource-gated model swapping behind one swap lock
//! - [`http`]: built-in OpenAI-compatible HTTP backend
//!
//! ```rust,ignore
//! use llmswap_plugins::{PluginManager, ProviderCatalog, ResourceManager};
//!
//! let manager = PluginManager::new(ResourceManager::default(), ProviderCatalog::with_builtins());
//! manager.initialize().await;
//! manager.discover(Path::new("plugins"));
//! manager.load_plugin("lmstudio", PluginConfig::new()).await?;
//! let out = manager
//!     .generate_text("lmstudio", "qwen2.5-7b", "hello", &GenerateOptions::default())
//!     .await?;
//! ```

pub mod discovery;
pub mod http;
pub mod instance;
pub mod manager;
pub mod registry;
pub mod resource;

pub use discovery::{discover_plugins, discover_plugins_for};
pub use http::{HttpModelProvider, HttpProviderConfig};
pub use instance::PluginInstance;
pub use manager::{ManagerEvent, PluginManager};
pub use registry::{PluginHandle, PluginRegistry, ProviderCatalog};
pub use resource::{CapacitySource, ResourceCapacity, ResourceManager, ResourceShortfall};

pub use llmswap_kernel::{
    GenerateOptions, Generation, ModelDescriptor, ModelId, ModelProvider, PluginConfig,
    PluginError, PluginManifest, PluginResult, ProviderContext, ProviderFactory,
    ResourceRequirements,
};

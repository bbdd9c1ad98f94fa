//! # llmswap-kernel
//!
//! Contracts shared by every LLMSwap model provider plugin:
//!
//! - [`ModelProvider`]: the capability hooks a backend implements
//! - [`PluginManifest`]: the declarative `manifest.json` descriptor
//! - [`ModelDescriptor`] / [`ResourceRequirements`]: what a provider can serve and what it costs
//! - [`PluginError`]: the error taxonomy surfaced by discovery, loading and dispatch
//! - [`config`]: multi-format configuration loading for the manager

pub mod config;
pub mod error;
pub mod manifest;
pub mod provider;
pub mod types;

pub use error::{PluginError, PluginResult, ResourceKind};
pub use manifest::{PluginManifest, host_platform, normalize_platform};
pub use provider::{ModelProvider, ProviderContext, ProviderFactory};
pub use types::{
    GenerateOptions, Generation, ModelDescriptor, ModelId, PluginConfig, ResourceRequirements,
    TokenUsage, parse_size_gb,
};

//! Command implementations

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use llmswap_kernel::config::ManagerConfig;
use llmswap_kernel::GenerateOptions;
use llmswap_plugins::{PluginManager, ProviderCatalog};
use tracing::warn;

/// Looked up in the working directory when `--config` is not given.
const DEFAULT_CONFIG_FILE: &str = "llmswap.toml";

pub fn load_config(path: Option<&Path>, plugins_dir: Option<&Path>) -> anyhow::Result<ManagerConfig> {
    let config = match path {
        Some(path) => ManagerConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => ManagerConfig::load(DEFAULT_CONFIG_FILE)
            .with_context(|| format!("failed to load {}", DEFAULT_CONFIG_FILE))?,
        None => ManagerConfig::from_env().context("failed to read configuration from environment")?,
    };

    Ok(match plugins_dir {
        Some(dir) => config.with_plugins_dir(dir),
        None => config,
    })
}

pub async fn build_manager(config: &ManagerConfig) -> PluginManager {
    let manager = PluginManager::from_config(config, ProviderCatalog::with_builtins());
    manager.initialize().await;
    manager.discover(&config.plugins_dir);
    manager
}

async fn ensure_live(
    manager: &PluginManager,
    config: &ManagerConfig,
    plugin_id: &str,
) -> anyhow::Result<()> {
    manager
        .load_plugin(plugin_id, config.plugin_config(plugin_id))
        .await
        .with_context(|| format!("failed to load plugin {}", plugin_id))?;
    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn resources(manager: &PluginManager, json: bool) -> anyhow::Result<()> {
    let capacity = manager.resources().capacity();
    if json {
        return print_json(&capacity);
    }
    println!("RAM:  {:.2} GB ({:?})", capacity.ram_gb, capacity.ram_source);
    println!("VRAM: {:.2} GB ({:?})", capacity.vram_gb, capacity.vram_source);
    Ok(())
}

pub fn plugins(manager: &PluginManager, json: bool) -> anyhow::Result<()> {
    let manifests = manager.registered_plugins();
    if json {
        return print_json(&manifests);
    }
    if manifests.is_empty() {
        println!("No plugins found");
        return Ok(());
    }
    for manifest in manifests {
        let platforms = if manifest.platform.is_empty() {
            "any".to_string()
        } else {
            manifest.platforms().join(",")
        };
        println!(
            "{:<20} class={} exclusive={} platforms={} endpoint={}",
            manifest.id,
            manifest.class,
            manifest.exclusive_instance,
            platforms,
            manifest.endpoint.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

pub async fn models(
    manager: &PluginManager,
    config: &ManagerConfig,
    only: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    match only {
        Some(plugin_id) => ensure_live(manager, config, plugin_id).await?,
        None => {
            for manifest in manager.registered_plugins() {
                if let Err(e) = ensure_live(manager, config, &manifest.id).await {
                    warn!("{:#}", e);
                }
            }
        }
    }

    let models: BTreeMap<_, _> = manager.list_available_models().await.into_iter().collect();
    if json {
        return print_json(&models);
    }
    for (plugin_id, list) in models {
        println!("{}:", plugin_id);
        for model in list {
            let requirements = model.requirements();
            println!(
                "  {:<32} {:<32} ram={} vram={}",
                model.id,
                model.label(),
                requirements.ram,
                requirements.vram
            );
        }
    }
    Ok(())
}

pub async fn load(
    manager: &PluginManager,
    config: &ManagerConfig,
    plugin_id: &str,
    model_id: &str,
) -> anyhow::Result<()> {
    ensure_live(manager, config, plugin_id).await?;
    manager
        .load_model(plugin_id, model_id)
        .await
        .with_context(|| format!("failed to load {} on {}", model_id, plugin_id))?;

    match manager.active_model(plugin_id).await {
        Some(active) => println!("{}: {} is resident", plugin_id, active),
        None => println!("{}: shared plugin, nothing to swap", plugin_id),
    }
    Ok(())
}

pub async fn generate(
    manager: &PluginManager,
    config: &ManagerConfig,
    plugin_id: &str,
    model_id: &str,
    prompt: &str,
    options: &GenerateOptions,
    json: bool,
) -> anyhow::Result<()> {
    ensure_live(manager, config, plugin_id).await?;
    let generation = manager
        .generate_text(plugin_id, model_id, prompt, options)
        .await
        .with_context(|| format!("generation with {} on {} failed", model_id, plugin_id))?;

    if json {
        return print_json(&generation);
    }
    println!("{}", generation.text);
    Ok(())
}

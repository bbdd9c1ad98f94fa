//! Plugin discovery - scan a directory for `<plugin>/manifest.json` packages
//!
//! Best effort over the whole directory: a package that is missing its
//! manifest, fails to parse, targets another platform or names an unknown
//! provider class is logged and skipped, never aborting the scan.

use std::path::Path;

use llmswap_kernel::config::load_config;
use llmswap_kernel::manifest::MANIFEST_FILE;
use llmswap_kernel::{PluginConfig, PluginError, PluginManifest, PluginResult, host_platform};
use tracing::{debug, info, warn};

use crate::registry::{PluginHandle, ProviderCatalog};

/// Scan `plugins_dir` for plugin packages loadable on this host.
pub fn discover_plugins(plugins_dir: &Path, catalog: &ProviderCatalog) -> Vec<PluginHandle> {
    discover_plugins_for(plugins_dir, catalog, &host_platform())
}

/// Same as [`discover_plugins`] for an explicit host platform identifier.
pub fn discover_plugins_for(
    plugins_dir: &Path,
    catalog: &ProviderCatalog,
    host: &str,
) -> Vec<PluginHandle> {
    let entries = match std::fs::read_dir(plugins_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %plugins_dir.display(), "Failed to read plugin directory: {}", e);
            return Vec::new();
        }
    };

    let mut dirs: Vec<_> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();

    let mut handles = Vec::new();
    for dir in dirs {
        match load_package(&dir, catalog, host) {
            Ok(Some(handle)) => {
                debug!(plugin_id = %handle.id(), path = %dir.display(), "Discovered plugin");
                handles.push(handle);
            }
            Ok(None) => {}
            Err(e) => warn!("Skipping plugin: {}", e),
        }
    }

    info!(
        path = %plugins_dir.display(),
        count = handles.len(),
        "Plugin discovery finished"
    );
    handles
}

/// `Ok(None)` is expected filtering (other plugin type, other platform).
fn load_package(
    dir: &Path,
    catalog: &ProviderCatalog,
    host: &str,
) -> PluginResult<Option<PluginHandle>> {
    let skip = |reason: String| PluginError::Discovery {
        path: dir.to_path_buf(),
        reason,
    };

    let manifest_path = dir.join(MANIFEST_FILE);
    if !manifest_path.is_file() {
        return Err(skip(format!("no {}", MANIFEST_FILE)));
    }

    let content = std::fs::read_to_string(&manifest_path)?;
    let manifest: PluginManifest = serde_json::from_str(&content)
        .map_err(|e| skip(format!("malformed {}: {}", MANIFEST_FILE, e)))?;

    if manifest.id.trim().is_empty() {
        return Err(skip("manifest has no id".to_string()));
    }
    if !manifest.is_model_provider() {
        info!(
            plugin_id = %manifest.id,
            kind = %manifest.kind,
            "Ignoring plugin that is not a model provider"
        );
        return Ok(None);
    }
    if !manifest.supports_platform(host) {
        info!(
            plugin_id = %manifest.id,
            platforms = ?manifest.platform,
            host = %host,
            "Plugin does not support this platform, skipping"
        );
        return Ok(None);
    }

    let factory = catalog
        .resolve(&manifest.class)
        .ok_or_else(|| skip(format!("unknown provider class {}", manifest.class)))?;

    let entry_path = dir.join(&manifest.main);
    if !entry_path.is_file() {
        return Err(skip(format!("entry file {} not found", manifest.main)));
    }
    let settings: PluginConfig = load_config(&entry_path)
        .map_err(|e| skip(format!("entry file {} failed to load: {}", manifest.main, e)))?;

    Ok(Some(
        PluginHandle::new(manifest, factory)
            .with_plugin_dir(dir)
            .with_settings(settings),
    ))
}

//! Configuration loading
//!
//! Loads manager configuration and plugin entry files in YAML, TOML or JSON,
//! with environment variable substitution (`${VAR}` and `$VAR`) and optional
//! prefixed environment overrides.

mod manager;

pub use config::FileFormat;
pub use manager::{ENV_PREFIX, ManagerConfig, ResourceConfig};

use std::path::Path;
use std::sync::LazyLock;

use config::builder::DefaultState;
use config::{Config as Cfg, ConfigBuilder, Environment};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

static BRACED_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("braced variable pattern is valid")
});

static SIMPLE_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\b").expect("simple variable pattern is valid")
});

/// Configuration loading error
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parsing error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Detect configuration format from file extension
///
/// - YAML: `.yaml`, `.yml`
/// - TOML: `.toml`
/// - JSON: `.json`
pub fn detect_format<P: AsRef<Path>>(path: P) -> ConfigResult<FileFormat> {
    let ext = path
        .as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat("No file extension found".to_string()))?;

    match ext.to_lowercase().as_str() {
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "toml" => Ok(FileFormat::Toml),
        "json" => Ok(FileFormat::Json),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

/// Substitute environment variables in a string
///
/// `${VAR_NAME}` is replaced first, then bare `$VAR_NAME`. Unset variables
/// are left as written.
pub fn substitute_env_vars(content: &str) -> String {
    let braced = BRACED_VAR.replace_all(content, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    });

    SIMPLE_VAR
        .replace_all(&braced, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

fn build<T: DeserializeOwned>(builder: ConfigBuilder<DefaultState>) -> ConfigResult<T> {
    let config = builder
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()))
}

fn from_value<T: DeserializeOwned>(document: Value) -> ConfigResult<T> {
    serde_json::from_value(document).map_err(|e| ConfigError::Serialization(e.to_string()))
}

/// Parse a document into a JSON tree, keeping map keys exactly as written.
///
/// Plugin ids and plugin settings are case sensitive, so files are parsed
/// with the format's own parser rather than through `config::Config`.
pub fn parse_document(content: &str, format: FileFormat) -> ConfigResult<Value> {
    let document = match format {
        FileFormat::Json => {
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?
        }
        FileFormat::Toml => {
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?
        }
        FileFormat::Yaml => {
            serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?
        }
        other => return Err(ConfigError::UnsupportedFormat(format!("{:?}", other))),
    };

    // An empty YAML document is null; treat it like an empty table.
    Ok(match document {
        Value::Null => Value::Object(Map::new()),
        document => document,
    })
}

fn read_document(path: &Path) -> ConfigResult<Value> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    parse_document(&substitute_env_vars(&content), format)
}

/// Load configuration from a file, detecting the format from its extension.
pub fn load_config<T, P>(path: P) -> ConfigResult<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    from_value(read_document(path.as_ref())?)
}

/// Load configuration from a string with an explicit format.
pub fn from_str<T>(content: &str, format: FileFormat) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    from_value(parse_document(&substitute_env_vars(content), format)?)
}

/// Load configuration with environment variable overrides
///
/// Variables use the given prefix and `__` for nesting, e.g.
/// `LLMSWAP_RESOURCES__RAM_GB=32` overrides `resources.ram_gb`. Top level
/// keys listed in `file_only` are never taken from the environment.
pub fn load_with_env<T, P>(path: P, env_prefix: &str, file_only: &[&str]) -> ConfigResult<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let mut document = read_document(path.as_ref())?;
    merge_values(&mut document, env_overrides(env_prefix, file_only)?);
    from_value(document)
}

/// Configuration from prefixed environment variables only, skipping the
/// top level keys in `file_only`.
pub fn from_env<T: DeserializeOwned>(env_prefix: &str, file_only: &[&str]) -> ConfigResult<T> {
    from_value(env_overrides(env_prefix, file_only)?)
}

fn env_overrides(env_prefix: &str, file_only: &[&str]) -> ConfigResult<Value> {
    let mut overrides: Value = build(Cfg::builder().add_source(env_source(env_prefix)))?;
    match &mut overrides {
        Value::Object(map) => {
            for key in file_only {
                map.remove(*key);
            }
        }
        other => *other = Value::Object(Map::new()),
    }
    Ok(overrides)
}

/// Recursively overlay `overlay` onto `base`; non-table values replace.
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn env_source(env_prefix: &str) -> Environment {
    Environment::with_prefix(env_prefix)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

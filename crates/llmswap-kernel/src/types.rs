//! Shared data types: model descriptors, resource requirements, generation I/O.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Model identifier as reported by a provider.
pub type ModelId = String;

/// Opaque per-plugin configuration, interpreted only by the concrete provider.
pub type PluginConfig = HashMap<String, Value>;

const UNKNOWN: &str = "unknown";

fn unknown_size() -> String {
    UNKNOWN.to_string()
}

/// Parse a size string such as `"8GB"` or `"512 mb"` into gigabytes.
///
/// Units are `KB`/`MB`/`GB`/`TB` in binary steps, case-insensitive. Anything
/// that does not parse (including `"unknown"`) is `0.0`, meaning "no
/// requirement".
pub fn parse_size_gb(size: &str) -> f64 {
    let upper = size.trim().to_ascii_uppercase();
    let Some(split) = upper.len().checked_sub(2) else {
        return 0.0;
    };
    if !upper.is_char_boundary(split) {
        return 0.0;
    }

    let (number, unit) = upper.split_at(split);
    let scale = match unit {
        "TB" => 1024.0,
        "GB" => 1.0,
        "MB" => 1.0 / 1024.0,
        "KB" => 1.0 / (1024.0 * 1024.0),
        _ => return 0.0,
    };

    match number.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => value * scale,
        _ => 0.0,
    }
}

/// Declared RAM/VRAM a model needs, as size strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    /// System memory, e.g. `"8GB"`
    #[serde(default = "unknown_size")]
    pub ram: String,
    /// GPU memory, e.g. `"6GB"`
    #[serde(default = "unknown_size")]
    pub vram: String,
}

impl Default for ResourceRequirements {
    fn default() -> Self {
        Self::unknown()
    }
}

impl ResourceRequirements {
    /// Requirements for a model that declares nothing.
    pub fn unknown() -> Self {
        Self {
            ram: unknown_size(),
            vram: unknown_size(),
        }
    }

    pub fn new(ram: impl Into<String>, vram: impl Into<String>) -> Self {
        Self {
            ram: ram.into(),
            vram: vram.into(),
        }
    }

    /// RAM only; VRAM stays unknown.
    pub fn ram(ram: impl Into<String>) -> Self {
        Self {
            ram: ram.into(),
            vram: unknown_size(),
        }
    }

    pub fn ram_gb(&self) -> f64 {
        parse_size_gb(&self.ram)
    }

    pub fn vram_gb(&self) -> f64 {
        parse_size_gb(&self.vram)
    }
}

/// A model a provider can serve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Model id used in load/generate calls
    pub id: ModelId,
    /// Human readable name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Declared requirements; absent means unknown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_requirements: Option<ResourceRequirements>,
}

impl ModelDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            resource_requirements: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_requirements(mut self, requirements: ResourceRequirements) -> Self {
        self.resource_requirements = Some(requirements);
        self
    }

    /// Display name, falling back to the id.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }

    /// Declared requirements, or `"unknown"` for both resources.
    pub fn requirements(&self) -> ResourceRequirements {
        self.resource_requirements.clone().unwrap_or_default()
    }
}

/// Options for a single text generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// System prompt prepended to the conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    /// Backend specific options passed through untouched
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

impl GenerateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_stop(mut self, stop: impl Into<String>) -> Self {
        self.stop.push(stop.into());
        self
    }
}

/// Token accounting reported by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Output of a text generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    /// Model that produced the text
    pub model: ModelId,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl Generation {
    pub fn new(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            text: text.into(),
            finish_reason: None,
            usage: None,
        }
    }
}

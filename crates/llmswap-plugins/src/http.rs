//! OpenAI-compatible HTTP provider
//!
//! Talks to any server exposing `/v1/models` and `/v1/chat/completions`
//! (LM Studio, llama.cpp server, Ollama's compatibility layer). The server
//! pages models in on demand, so load/unload keep the trait defaults.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use llmswap_kernel::{
    GenerateOptions, Generation, ModelDescriptor, ModelProvider, PluginError, PluginResult,
    ProviderContext, ProviderFactory, TokenUsage,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Settings read from the plugin config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpProviderConfig {
    /// Server root, e.g. `http://localhost:1234`. Falls back to the manifest endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Sent as a bearer token when present
    #[serde(default)]
    pub api_key: Option<String>,
    /// Request timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Models declared up front, with their resource requirements
    #[serde(default)]
    pub models: Vec<ModelDescriptor>,
    /// Also list whatever the server reports
    #[serde(default = "default_true")]
    pub discover_models: bool,
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_true() -> bool {
    true
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
            models: Vec::new(),
            discover_models: true,
        }
    }
}

/// Strip a trailing `/` and `/v1` so endpoint paths can be appended.
pub fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    trimmed
        .strip_suffix("/v1")
        .unwrap_or(trimmed)
        .trim_end_matches('/')
        .to_string()
}

pub struct HttpModelProvider {
    client: reqwest::Client,
    base_url: Option<String>,
    config: HttpProviderConfig,
}

impl HttpModelProvider {
    /// Class name used in `manifest.json`.
    pub const CLASS: &'static str = "HttpModelProvider";

    pub fn new(config: HttpProviderConfig) -> PluginResult<Self> {
        Self::with_endpoint(config, None)
    }

    /// `endpoint` is used only when the config has no `base_url`.
    pub fn with_endpoint(config: HttpProviderConfig, endpoint: Option<&str>) -> PluginResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PluginError::Config(format!("failed to build HTTP client: {}", e)))?;

        let base_url = config
            .base_url
            .as_deref()
            .or(endpoint)
            .filter(|url| !url.trim().is_empty())
            .map(normalize_base_url);

        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    pub fn from_context(ctx: ProviderContext) -> PluginResult<Self> {
        let config: HttpProviderConfig = ctx.typed_config()?;
        Self::with_endpoint(config, ctx.endpoint.as_deref())
    }

    pub fn factory() -> ProviderFactory {
        Arc::new(|ctx: ProviderContext| -> PluginResult<Box<dyn ModelProvider>> {
            Ok(Box::new(Self::from_context(ctx)?))
        })
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    fn url(&self, path: &str) -> PluginResult<String> {
        let base = self
            .base_url
            .as_deref()
            .ok_or_else(|| PluginError::Config("no base_url or endpoint configured".to_string()))?;
        Ok(format!("{}/v1/{}", base, path))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    fn map_error(err: reqwest::Error) -> PluginError {
        if err.is_timeout() {
            PluginError::Backend(format!("request timed out: {}", err))
        } else if err.is_connect() {
            PluginError::Backend(format!("connection failed: {}", err))
        } else {
            PluginError::Backend(err.to_string())
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> PluginResult<String> {
        let resp = self
            .authorize(request)
            .send()
            .await
            .map_err(Self::map_error)?;

        let status = resp.status();
        let text = resp.text().await.map_err(Self::map_error)?;

        if !status.is_success() {
            return Err(PluginError::Backend(format!("HTTP {}: {}", status, text)));
        }
        Ok(text)
    }

    async fn fetch_remote_models(&self) -> PluginResult<Vec<String>> {
        let url = self.url("models")?;
        let text = self.send(self.client.get(&url)).await?;
        let parsed: ModelListResponse = serde_json::from_str(&text)?;
        Ok(parsed.data.into_iter().map(|m| m.id).collect())
    }
}

#[derive(Debug, Deserialize)]
struct ModelListResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ModelProvider for HttpModelProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn initialize(&self) -> PluginResult<()> {
        match &self.base_url {
            Some(url) => {
                debug!(base_url = %url, "HTTP provider ready");
                Ok(())
            }
            None => Err(PluginError::Config(
                "no base_url or endpoint configured".to_string(),
            )),
        }
    }

    async fn list_models(&self) -> PluginResult<Vec<ModelDescriptor>> {
        let mut models = self.config.models.clone();
        if !self.config.discover_models {
            return Ok(models);
        }

        match self.fetch_remote_models().await {
            Ok(ids) => {
                for id in ids {
                    if !models.iter().any(|m| m.id == id) {
                        models.push(ModelDescriptor::new(id));
                    }
                }
                Ok(models)
            }
            Err(e) if !models.is_empty() => {
                warn!("Remote model listing failed, using declared models: {}", e);
                Ok(models)
            }
            Err(e) => Err(e),
        }
    }

    async fn generate_text(
        &self,
        model_id: &str,
        prompt: &str,
        options: &GenerateOptions,
    ) -> PluginResult<Generation> {
        let mut messages = Vec::new();
        if let Some(system) = &options.system {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        messages.push(serde_json::json!({"role": "user", "content": prompt}));

        let mut body = serde_json::json!({
            "model": model_id,
            "messages": messages,
        });
        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if let Some(temperature) = options.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        if !options.stop.is_empty() {
            body["stop"] = serde_json::json!(options.stop);
        }
        for (key, value) in &options.extra {
            body[key.as_str()] = value.clone();
        }

        let url = self.url("chat/completions")?;
        let text = self.send(self.client.post(&url).json(&body)).await?;
        let parsed: ChatResponse = serde_json::from_str(&text)?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| PluginError::Backend("response contained no choices".to_string()))?;

        Ok(Generation {
            model: parsed.model.unwrap_or_else(|| model_id.to_string()),
            text: choice.message.content.unwrap_or_default(),
            finish_reason: choice.finish_reason,
            usage: parsed.usage,
        })
    }
}

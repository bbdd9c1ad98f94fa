//! HTTP provider tests against a mock OpenAI-compatible server.

use std::path::Path;

use llmswap_plugins::{
    GenerateOptions, HttpModelProvider, HttpProviderConfig, ModelDescriptor, ModelProvider,
    PluginConfig, PluginError, PluginManager, ProviderCatalog, ResourceManager,
    ResourceRequirements,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer, models: Vec<ModelDescriptor>) -> HttpModelProvider {
    HttpModelProvider::new(HttpProviderConfig {
        base_url: Some(format!("{}/v1/", server.uri())),
        api_key: Some("sk-test".to_string()),
        models,
        ..HttpProviderConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_list_models_merges_declared_and_remote() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [{"id": "m1", "object": "model"}, {"id": "remote", "object": "model"}]
        })))
        .mount(&server)
        .await;

    let declared = ModelDescriptor::new("m1").with_requirements(ResourceRequirements::ram("4GB"));
    let provider = provider(&server, vec![declared.clone()]);

    let models = provider.list_models().await.unwrap();
    assert_eq!(models, vec![declared, ModelDescriptor::new("remote")]);
}

#[tokio::test]
async fn test_list_models_falls_back_to_declared() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(503).set_body_string("loading"))
        .mount(&server)
        .await;

    let with_declared = provider(&server, vec![ModelDescriptor::new("m1")]);
    let models = with_declared.list_models().await.unwrap();
    assert_eq!(models.len(), 1);

    let without_declared = provider(&server, Vec::new());
    let err = without_declared.list_models().await.unwrap_err();
    assert!(matches!(err, PluginError::Backend(msg) if msg.contains("503")));
}

#[tokio::test]
async fn test_generate_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "model": "m1",
            "max_tokens": 32,
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "hello"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "model": "m1",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "hi there"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        })))
        .mount(&server)
        .await;

    let provider = provider(&server, Vec::new());
    let options = GenerateOptions::new()
        .with_system("be brief")
        .with_max_tokens(32);
    let out = provider.generate_text("m1", "hello", &options).await.unwrap();

    assert_eq!(out.model, "m1");
    assert_eq!(out.text, "hi there");
    assert_eq!(out.finish_reason.as_deref(), Some("stop"));
    assert_eq!(out.usage.unwrap().total_tokens, 15);
}

#[tokio::test]
async fn test_generate_error_status_is_backend_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
        .mount(&server)
        .await;

    let provider = provider(&server, Vec::new());
    let err = provider
        .generate_text("m1", "hello", &GenerateOptions::default())
        .await
        .unwrap_err();
    match err {
        PluginError::Backend(msg) => {
            assert!(msg.contains("500"));
            assert!(msg.contains("model crashed"));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

fn write_package(root: &Path, base_url: &str) {
    let dir = root.join("lmstudio");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("manifest.json"),
        r#"{
            "id": "lmstudio",
            "type": "model_provider",
            "class": "HttpModelProvider",
            "exclusive_instance": true
        }"#,
    )
    .unwrap();
    std::fs::write(
        dir.join("provider.toml"),
        format!(
            r#"base_url = "{}"
discover_models = false

[[models]]
id = "small"
resource_requirements = {{ ram = "4GB" }}

[[models]]
id = "huge"
resource_requirements = {{ ram = "64GB" }}
"#,
            base_url
        ),
    )
    .unwrap();
}

#[tokio::test]
async fn test_discovered_http_plugin_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "pong"}}]
        })))
        .mount(&server)
        .await;

    let root = tempfile::tempdir().unwrap();
    write_package(root.path(), &server.uri());

    let manager = PluginManager::new(
        ResourceManager::with_capacity(16.0, 0.0),
        ProviderCatalog::with_builtins(),
    );
    assert_eq!(manager.discover(root.path()), 1);
    assert!(manager.is_exclusive("lmstudio"));

    manager
        .load_plugin("lmstudio", PluginConfig::new())
        .await
        .unwrap();

    let out = manager
        .generate_text("lmstudio", "small", "ping", &GenerateOptions::default())
        .await
        .unwrap();
    assert_eq!(out.text, "pong");
    assert_eq!(out.model, "small");
    assert_eq!(
        manager.active_model("lmstudio").await.as_deref(),
        Some("small")
    );

    let err = manager
        .generate_text("lmstudio", "huge", "ping", &GenerateOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PluginError::ResourceInsufficient { .. }));
    assert_eq!(
        manager.active_model("lmstudio").await.as_deref(),
        Some("small")
    );
}

#[tokio::test]
async fn test_plugin_without_base_url_fails_to_initialize() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("nowhere");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("manifest.json"),
        r#"{"id": "nowhere", "type": "model_provider", "class": "HttpModelProvider"}"#,
    )
    .unwrap();
    std::fs::write(dir.join("provider.toml"), "timeout_secs = 5\n").unwrap();

    let manager = PluginManager::new(
        ResourceManager::with_capacity(16.0, 0.0),
        ProviderCatalog::with_builtins(),
    );
    assert_eq!(manager.discover(root.path()), 1);

    let err = manager
        .load_plugin("nowhere", PluginConfig::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PluginError::InitializationFailed(_)));

    let mut config = PluginConfig::new();
    config.insert("base_url".into(), json!("http://127.0.0.1:9"));
    assert!(manager.load_plugin("nowhere", config).await.is_ok());
}

//! Plugin manager integration tests
//!
//! Scripted providers record every backend call so the swap state machine,
//! the shared swap lock and per-plugin failure isolation can be observed
//! from the outside.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use llmswap_kernel::ResourceKind;
use llmswap_plugins::{
    GenerateOptions, Generation, ManagerEvent, ModelDescriptor, ModelProvider, PluginConfig,
    PluginError, PluginManager, PluginManifest, PluginResult, ProviderCatalog, ProviderContext,
    ProviderFactory, ResourceManager, ResourceRequirements,
};

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<String>>,
    resident: AtomicUsize,
    max_resident: AtomicUsize,
    loads_in_flight: AtomicUsize,
    max_loads_in_flight: AtomicUsize,
}

impl Recorder {
    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[derive(Clone)]
struct Scripted {
    name: &'static str,
    models: Vec<ModelDescriptor>,
    recorder: Arc<Recorder>,
    load_delay: Duration,
    fail_load: Option<&'static str>,
    fail_init: bool,
    fail_list: bool,
    fail_shutdown: bool,
}

impl Scripted {
    fn new(name: &'static str, recorder: &Arc<Recorder>) -> Self {
        Self {
            name,
            models: Vec::new(),
            recorder: Arc::clone(recorder),
            load_delay: Duration::ZERO,
            fail_load: None,
            fail_init: false,
            fail_list: false,
            fail_shutdown: false,
        }
    }

    fn model(mut self, id: &str, ram: &str) -> Self {
        self.models
            .push(ModelDescriptor::new(id).with_requirements(ResourceRequirements::ram(ram)));
        self
    }

    fn load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    fn factory(self) -> ProviderFactory {
        Arc::new(
            move |_ctx: ProviderContext| -> PluginResult<Box<dyn ModelProvider>> {
                Ok(Box::new(self.clone()))
            },
        )
    }
}

#[async_trait]
impl ModelProvider for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    async fn initialize(&self) -> PluginResult<()> {
        if self.fail_init {
            return Err(PluginError::Backend("backend offline".into()));
        }
        Ok(())
    }

    async fn list_models(&self) -> PluginResult<Vec<ModelDescriptor>> {
        if self.fail_list {
            return Err(PluginError::Backend("listing failed".into()));
        }
        Ok(self.models.clone())
    }

    async fn generate_text(
        &self,
        model_id: &str,
        prompt: &str,
        _options: &GenerateOptions,
    ) -> PluginResult<Generation> {
        self.recorder.record(format!("generate:{}", model_id));
        Ok(Generation::new(model_id, format!("{} says {}", model_id, prompt)))
    }

    async fn load_model(&self, model_id: &str) -> PluginResult<()> {
        let in_flight = self.recorder.loads_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.recorder
            .max_loads_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        self.recorder.loads_in_flight.fetch_sub(1, Ordering::SeqCst);

        self.recorder.record(format!("load:{}", model_id));
        if self.fail_load.is_some_and(|m| m == model_id) {
            return Err(PluginError::Backend(format!("cannot load {}", model_id)));
        }

        let resident = self.recorder.resident.fetch_add(1, Ordering::SeqCst) + 1;
        self.recorder.max_resident.fetch_max(resident, Ordering::SeqCst);
        Ok(())
    }

    async fn unload_model(&self, model_id: &str) -> PluginResult<()> {
        self.recorder.record(format!("unload:{}", model_id));
        self.recorder.resident.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    async fn shutdown(&self) -> PluginResult<()> {
        self.recorder.record("shutdown");
        if self.fail_shutdown {
            return Err(PluginError::Backend("shutdown failed".into()));
        }
        Ok(())
    }
}

fn manager() -> PluginManager {
    PluginManager::new(
        ResourceManager::with_capacity(16.0, 0.0),
        ProviderCatalog::new(),
    )
}

async fn live(manager: &PluginManager, id: &str, exclusive: bool, provider: Scripted) {
    manager
        .register_plugin(
            PluginManifest::new(id).with_exclusive_instance(exclusive),
            provider.factory(),
        )
        .unwrap();
    manager.load_plugin(id, PluginConfig::new()).await.unwrap();
}

fn lmx(recorder: &Arc<Recorder>) -> Scripted {
    Scripted::new("lmx", recorder)
        .model("m1", "4GB")
        .model("m2", "64GB")
        .model("m3", "8GB")
}

#[tokio::test]
async fn test_oversized_swap_keeps_resident_model() {
    let manager = manager();
    let recorder = Arc::new(Recorder::default());
    live(&manager, "lmX", true, lmx(&recorder)).await;

    let out = manager
        .generate_text("lmX", "m1", "hello", &GenerateOptions::default())
        .await
        .unwrap();
    assert_eq!(out.text, "m1 says hello");
    assert_eq!(manager.active_model("lmX").await.as_deref(), Some("m1"));

    let err = manager
        .generate_text("lmX", "m2", "hi", &GenerateOptions::default())
        .await
        .unwrap_err();
    match err {
        PluginError::ResourceInsufficient {
            plugin,
            model,
            resource,
            required_gb,
            available_gb,
        } => {
            assert_eq!(plugin, "lmX");
            assert_eq!(model, "m2");
            assert_eq!(resource, ResourceKind::Ram);
            assert_eq!(required_gb, 64.0);
            assert_eq!(available_gb, 16.0);
        }
        other => panic!("expected resource error, got {:?}", other),
    }

    assert_eq!(manager.active_model("lmX").await.as_deref(), Some("m1"));
    assert_eq!(recorder.calls(), vec!["load:m1", "generate:m1"]);
}

#[tokio::test]
async fn test_load_model_is_idempotent() {
    let manager = manager();
    let recorder = Arc::new(Recorder::default());
    live(&manager, "lmX", true, lmx(&recorder)).await;

    manager.load_model("lmX", "m1").await.unwrap();
    manager.load_model("lmX", "m1").await.unwrap();

    assert_eq!(recorder.calls(), vec!["load:m1"]);
    assert_eq!(manager.active_model("lmX").await.as_deref(), Some("m1"));
}

#[tokio::test]
async fn test_swap_unloads_previous_model() {
    let manager = manager();
    let recorder = Arc::new(Recorder::default());
    live(&manager, "lmX", true, lmx(&recorder)).await;

    manager.load_model("lmX", "m1").await.unwrap();
    manager.load_model("lmX", "m3").await.unwrap();

    assert_eq!(recorder.calls(), vec!["load:m1", "unload:m1", "load:m3"]);
    assert_eq!(manager.active_model("lmX").await.as_deref(), Some("m3"));
    assert_eq!(recorder.max_resident.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unknown_model_has_no_requirement() {
    let manager = manager();
    let recorder = Arc::new(Recorder::default());
    live(&manager, "lmX", true, lmx(&recorder)).await;

    manager.load_model("lmX", "not-listed").await.unwrap();
    assert_eq!(manager.active_model("lmX").await.as_deref(), Some("not-listed"));
}

#[tokio::test]
async fn test_failed_load_leaves_plugin_unloaded() {
    let manager = manager();
    let recorder = Arc::new(Recorder::default());
    let mut provider = lmx(&recorder);
    provider.fail_load = Some("m3");
    live(&manager, "lmX", true, provider).await;

    manager.load_model("lmX", "m1").await.unwrap();
    let err = manager.load_model("lmX", "m3").await.unwrap_err();

    assert!(matches!(err, PluginError::ModelLoadFailed { .. }));
    assert_eq!(manager.active_model("lmX").await, None);
    assert_eq!(recorder.calls(), vec!["load:m1", "unload:m1", "load:m3"]);
}

#[tokio::test]
async fn test_explicit_unload_model() {
    let manager = manager();
    let recorder = Arc::new(Recorder::default());
    live(&manager, "lmX", true, lmx(&recorder)).await;

    manager.load_model("lmX", "m1").await.unwrap();
    manager.unload_model("lmX", "m3").await.unwrap();
    assert_eq!(manager.active_model("lmX").await.as_deref(), Some("m1"));

    manager.unload_model("lmX", "m1").await.unwrap();
    assert_eq!(manager.active_model("lmX").await, None);
    assert_eq!(recorder.calls(), vec!["load:m1", "unload:m1"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_generations_never_tear_the_slot() {
    let manager = manager();
    let recorder = Arc::new(Recorder::default());
    live(
        &manager,
        "lmX",
        true,
        lmx(&recorder).load_delay(Duration::from_millis(20)),
    )
    .await;

    let options = GenerateOptions::default();
    let (a, b) = tokio::join!(
        manager.generate_text("lmX", "m1", "first", &options),
        manager.generate_text("lmX", "m3", "second", &options),
    );
    assert!(a.is_ok());
    assert!(b.is_ok());

    let active = manager.active_model("lmX").await.unwrap();
    assert!(active == "m1" || active == "m3");
    assert_eq!(recorder.max_resident.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.max_loads_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.resident.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_swap_lock_is_shared_across_exclusive_plugins() {
    let manager = manager();
    let recorder = Arc::new(Recorder::default());
    let delay = Duration::from_millis(30);
    live(&manager, "a", true, lmx(&recorder).load_delay(delay)).await;
    live(&manager, "b", true, lmx(&recorder).load_delay(delay)).await;

    let (a, b) = tokio::join!(
        manager.load_model("a", "m1"),
        manager.load_model("b", "m3"),
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(recorder.max_loads_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(manager.active_model("a").await.as_deref(), Some("m1"));
    assert_eq!(manager.active_model("b").await.as_deref(), Some("m3"));
}

#[tokio::test]
async fn test_non_exclusive_load_and_unload_always_succeed() {
    let manager = manager();
    let recorder = Arc::new(Recorder::default());
    live(&manager, "shared", false, lmx(&recorder)).await;

    manager.load_model("shared", "m2").await.unwrap();
    manager.load_model("shared", "never-listed").await.unwrap();
    manager.unload_model("shared", "never-listed").await.unwrap();

    let instance = manager.get_plugin("shared").unwrap();
    instance.load_model("anything").await.unwrap();
    instance.unload_model("anything").await.unwrap();

    assert_eq!(manager.active_model("shared").await, None);
    assert!(recorder.calls().is_empty());

    // No swap on a shared plugin: oversized models go straight to the backend.
    manager
        .generate_text("shared", "m2", "hi", &GenerateOptions::default())
        .await
        .unwrap();
    assert_eq!(recorder.calls(), vec!["generate:m2"]);
}

#[tokio::test]
async fn test_not_found_and_unavailable_are_distinct() {
    let manager = manager();
    let recorder = Arc::new(Recorder::default());
    live(&manager, "lmX", true, lmx(&recorder)).await;

    let err = manager
        .generate_text("ghost", "m1", "hi", &GenerateOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PluginError::NotFound(id) if id == "ghost"));

    manager.get_plugin("lmX").unwrap().shutdown().await.unwrap();
    let err = manager
        .generate_text("lmX", "m1", "hi", &GenerateOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PluginError::Unavailable(id) if id == "lmX"));

    let err = manager.load_model("lmX", "m1").await.unwrap_err();
    assert!(matches!(err, PluginError::Unavailable(_)));
}

#[tokio::test]
async fn test_failed_initialization_never_goes_live() {
    let manager = manager();
    let recorder = Arc::new(Recorder::default());

    let mut offline = lmx(&recorder);
    offline.fail_init = true;
    manager
        .register_plugin(PluginManifest::new("offline"), offline.factory())
        .unwrap();
    let err = manager
        .load_plugin("offline", PluginConfig::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PluginError::InitializationFailed(_)));

    manager
        .register_plugin(
            PluginManifest::new("elsewhere").with_platform("plan9"),
            lmx(&recorder).factory(),
        )
        .unwrap();
    let err = manager
        .load_plugin("elsewhere", PluginConfig::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PluginError::InitializationFailed(_)));

    assert!(manager.plugin_ids().is_empty());
    assert_eq!(manager.registered_plugins().len(), 2);
}

#[tokio::test]
async fn test_list_available_models_isolates_failures() {
    let manager = manager();
    let recorder = Arc::new(Recorder::default());

    live(&manager, "good", false, lmx(&recorder)).await;
    let mut broken = lmx(&recorder);
    broken.fail_list = true;
    live(&manager, "broken", false, broken).await;
    live(&manager, "stopped", false, lmx(&recorder)).await;
    manager.get_plugin("stopped").unwrap().shutdown().await.unwrap();

    let models = manager.list_available_models().await;
    assert_eq!(models.len(), 1);
    let ids: Vec<&str> = models["good"].iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m2", "m3"]);
}

#[tokio::test]
async fn test_shutdown_isolates_failures() {
    let manager = manager();
    manager.initialize().await;
    assert!(manager.resources().is_initialized());

    let failing_recorder = Arc::new(Recorder::default());
    let mut failing = lmx(&failing_recorder);
    failing.fail_shutdown = true;
    live(&manager, "failing", true, failing).await;
    manager.load_model("failing", "m1").await.unwrap();

    let healthy_recorder = Arc::new(Recorder::default());
    live(&manager, "healthy", true, lmx(&healthy_recorder)).await;
    manager.load_model("healthy", "m3").await.unwrap();

    manager.shutdown().await;

    assert!(manager.plugin_ids().is_empty());
    assert!(!manager.resources().is_initialized());
    assert_eq!(
        failing_recorder.calls(),
        vec!["load:m1", "unload:m1", "shutdown"]
    );
    assert_eq!(
        healthy_recorder.calls(),
        vec!["load:m3", "unload:m3", "shutdown"]
    );
}

#[tokio::test]
async fn test_swap_events() {
    let manager = manager();
    let recorder = Arc::new(Recorder::default());
    live(&manager, "lmX", true, lmx(&recorder)).await;
    let mut events = manager.subscribe();

    manager.load_model("lmX", "m1").await.unwrap();
    let _ = manager.load_model("lmX", "m2").await;
    manager.load_model("lmX", "m3").await.unwrap();

    assert_eq!(
        events.recv().await.unwrap(),
        ManagerEvent::ModelSwapped {
            plugin_id: "lmX".into(),
            from: None,
            to: "m1".into(),
        }
    );
    match events.recv().await.unwrap() {
        ManagerEvent::SwapRejected {
            plugin_id, model, ..
        } => {
            assert_eq!(plugin_id, "lmX");
            assert_eq!(model, "m2");
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(
        events.recv().await.unwrap(),
        ManagerEvent::ModelSwapped {
            plugin_id: "lmX".into(),
            from: Some("m1".into()),
            to: "m3".into(),
        }
    );
}

// Shared fixtures for registry integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use voxesis_extension::bridge::{CONFIG_API, LOGGER_API};
use voxesis_extension::{
    CodeLoader, EntryPath, EvaluatedModule, ExtensionError, ExtensionRegistry, ExtensionSource,
    HostFacade, ModuleBridge, ModuleError, ModuleEvaluator, ModuleUnit, NamespaceTable,
    NotificationLog, RawExtension, RegistryConfig,
};

// ── Extension source ────────────────────────────────────────────────

/// Listing and payloads held in memory.
#[derive(Default)]
pub struct MemorySource {
    pub listing: Vec<RawExtension>,
    pub files: HashMap<String, String>,
    pub delays: HashMap<String, Duration>,
    pub prepare_error: Option<String>,
    pub list_error: Option<String>,
    pub list_calls: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extension(mut self, dir: &str, manifest: &Value) -> Self {
        self.listing.push(raw(dir, manifest));
        self
    }

    pub fn with_raw(mut self, raw: RawExtension) -> Self {
        self.listing.push(raw);
        self
    }

    /// Serve `body` at `/plugins/<ext>/<main>`.
    pub fn with_file(mut self, ext: &str, main: &str, body: impl Into<String>) -> Self {
        self.files
            .insert(EntryPath::new(ext, main).to_string(), body.into());
        self
    }

    pub fn with_delay(mut self, ext: &str, main: &str, delay: Duration) -> Self {
        self.delays.insert(EntryPath::new(ext, main).to_string(), delay);
        self
    }

    pub fn failing_prepare(mut self, reason: &str) -> Self {
        self.prepare_error = Some(reason.to_string());
        self
    }

    pub fn failing_list(mut self, reason: &str) -> Self {
        self.list_error = Some(reason.to_string());
        self
    }
}

#[async_trait]
impl ExtensionSource for MemorySource {
    async fn prepare(&self) -> Result<(), ExtensionError> {
        match &self.prepare_error {
            Some(reason) => Err(ExtensionError::UpstreamListingFailed(reason.clone())),
            None => Ok(()),
        }
    }

    async fn list(&self) -> Result<Vec<RawExtension>, ExtensionError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        // Let a concurrent caller observe the in-flight load.
        tokio::time::sleep(Duration::from_millis(20)).await;
        match &self.list_error {
            Some(reason) => Err(ExtensionError::Http(reason.clone())),
            None => Ok(self.listing.clone()),
        }
    }

    async fn fetch_text(&self, entry: &EntryPath) -> Result<String, ExtensionError> {
        let key = entry.to_string();
        if let Some(delay) = self.delays.get(&key) {
            tokio::time::sleep(*delay).await;
        }
        self.files
            .get(&key)
            .cloned()
            .ok_or_else(|| ExtensionError::Http(format!("404 Not Found: {key}")))
    }
}

// ── Evaluator ───────────────────────────────────────────────────────

/// Treats the unit source as the JSON form of an evaluated module.
#[derive(Default)]
pub struct ScriptedEvaluator {
    pub evaluations: AtomicUsize,
}

impl ModuleEvaluator for ScriptedEvaluator {
    fn evaluate(
        &self,
        unit: &ModuleUnit,
        _bridge: &ModuleBridge,
    ) -> Result<EvaluatedModule, ModuleError> {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        serde_json::from_str(&unit.source).map_err(|e| ModuleError::Evaluation(e.to_string()))
    }
}

// ── Host façade ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingFacade {
    pub calls: Mutex<Vec<(String, Value)>>,
}

impl RecordingFacade {
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

impl HostFacade for RecordingFacade {
    fn call(&self, method: &str, args: &Value) -> Result<Value, ExtensionError> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), args.clone()));
        Ok(Value::Null)
    }
}

// ── Manifests and payloads ──────────────────────────────────────────

pub fn view_manifest(name: &str) -> Value {
    json!({
        "name": name,
        "main": "index.json",
        "introduce": format!("{name} view"),
        "plugin_type": "view",
        "version": "1.0.0",
        "author": "tests",
        "line_icon": "IconClockLine",
        "fill_icon": "IconClockFill",
        "settings": {
            "display": "General",
            "items": [
                {"label": "24h", "type": "switch", "key": "h24", "value": true}
            ]
        }
    })
}

pub fn theme_manifest(name: &str, themes: &[&str]) -> Value {
    json!({
        "name": name,
        "main": "theme.css",
        "introduce": format!("{name} theme"),
        "plugin_type": "theme",
        "version": "1.0.0",
        "author": "tests",
        "themes": themes
    })
}

pub fn raw(dir: &str, manifest: &Value) -> RawExtension {
    RawExtension::from_bytes(dir, manifest.to_string().as_bytes())
}

/// A view entry payload: the module source wrapped in a JSON string.
pub fn module_payload(module: Value) -> String {
    serde_json::to_string(&module.to_string()).unwrap()
}

pub fn component(name: &str) -> String {
    module_payload(json!({"component": {"name": name}}))
}

// ── Registry ────────────────────────────────────────────────────────

pub struct Harness {
    pub registry: Arc<ExtensionRegistry>,
    pub notifications: Arc<NotificationLog>,
    pub evaluator: Arc<ScriptedEvaluator>,
    pub facade: Arc<RecordingFacade>,
    pub source: Arc<MemorySource>,
}

pub fn harness(source: MemorySource) -> Harness {
    harness_with(source, RegistryConfig {
        fetch_timeout: Duration::from_secs(5),
        ..RegistryConfig::default()
    })
}

pub fn harness_with(source: MemorySource, config: RegistryConfig) -> Harness {
    let facade = Arc::new(RecordingFacade::default());
    let bridge = Arc::new(ModuleBridge::new());
    bridge
        .bind(
            NamespaceTable::new()
                .with(CONFIG_API, facade.clone())
                .unwrap()
                .with(LOGGER_API, facade.clone())
                .unwrap(),
        )
        .unwrap();

    let evaluator = Arc::new(ScriptedEvaluator::default());
    let source = Arc::new(source);
    let notifications = Arc::new(NotificationLog::new());

    let registry = ExtensionRegistry::new(
        source.clone(),
        CodeLoader::new(bridge, evaluator.clone()),
        config,
    )
    .with_notifier(notifications.clone());

    Harness {
        registry: Arc::new(registry),
        notifications,
        evaluator,
        facade,
        source,
    }
}

//! Extension registry.
//!
//! Drives every listed extension through decode → validate → load and
//! publishes the results. One [`load`](ExtensionRegistry::load) per process:
//! later calls share the first call's completion signal. Items are
//! processed concurrently and fail independently; only a failure of the
//! listing collaborator rejects the load as a whole.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{watch, RwLock};

use crate::catalog::{ComponentHandle, IconHandle, IconSet, NamedIcons, ThemeCatalog, ViewCatalog, ViewItem};
use crate::decoder::{decode_descriptor, parse_descriptor};
use crate::error::ExtensionError;
use crate::events::{
    Notification, NotificationLevel, Notifier, TracingNotifier, FATAL_FAILURE_TITLE,
    ITEM_FAILURE_TITLE,
};
use crate::loader::{CodeLoader, ExportedModule};
use crate::manifest::{
    validate_base, validate_theme, validate_view, Descriptor, ExtensionKind, ThemeManifest,
    ViewManifest,
};
use crate::source::{EntryPath, ExtensionSource, RawExtension};
use crate::theme::{extract_theme_variables, ThemeVariables};

// ─── Configuration ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Bound on every fetch in the pipeline (default: 10 s).
    pub fetch_timeout: Duration,
    /// Root of the package tree (default: `./data/plugins`).
    pub extension_dir: PathBuf,
    /// Host backend to list and fetch from instead of the filesystem.
    pub base_url: Option<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
            extension_dir: PathBuf::from("./data/plugins"),
            base_url: None,
        }
    }
}

impl RegistryConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(
                std::env::var("EXTENSION_FETCH_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            ),
            extension_dir: std::env::var("EXTENSION_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/plugins")),
            base_url: std::env::var("EXTENSION_BASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
        }
    }
}

// ─── Loaded extensions ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ViewExtension {
    pub manifest: ViewManifest,
    pub line_icon: IconHandle,
    pub fill_icon: IconHandle,
    pub component: Arc<ExportedModule>,
}

#[derive(Debug, Clone)]
pub struct ThemeExtension {
    pub manifest: ThemeManifest,
    /// Only the manifest's theme ids that the stylesheet defines.
    pub variables: ThemeVariables,
}

#[derive(Debug, Clone)]
pub enum LoadedExtension {
    View(Arc<ViewExtension>),
    Theme(Arc<ThemeExtension>),
}

impl LoadedExtension {
    pub fn name(&self) -> &str {
        match self {
            Self::View(v) => &v.manifest.base.name,
            Self::Theme(t) => &t.manifest.base.name,
        }
    }

    pub fn kind(&self) -> ExtensionKind {
        match self {
            Self::View(_) => ExtensionKind::View,
            Self::Theme(_) => ExtensionKind::Theme,
        }
    }
}

// ─── Completion signal ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadFailure {
    /// Manifest name when known, listing name otherwise.
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub loaded: Vec<String>,
    pub failures: Vec<LoadFailure>,
}

pub type LoadOutcome = Result<LoadSummary, Arc<ExtensionError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    NotStarted,
    InFlight,
    Completed,
}

/// Awaitable outcome of the one load. Clones observe the same outcome.
#[derive(Debug, Clone)]
pub struct LoadSignal {
    rx: watch::Receiver<Option<LoadOutcome>>,
}

impl LoadSignal {
    /// Wait until the load settles.
    pub async fn wait(&self) -> LoadOutcome {
        let mut rx = self.rx.clone();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| Err(Arc::new(ExtensionError::LoadAborted)))
    }

    pub fn is_complete(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// True when both handles observe the same load.
    pub fn is_same(&self, other: &LoadSignal) -> bool {
        self.rx.same_channel(&other.rx)
    }
}

enum Gate {
    NotStarted,
    InFlight(LoadSignal),
    Completed(LoadSignal),
}

// ─── Registry ───────────────────────────────────────────────────────

/// Process-lifetime mapping from extension name to loaded extension.
pub struct ExtensionRegistry {
    source: Arc<dyn ExtensionSource>,
    loader: CodeLoader,
    config: RegistryConfig,
    notifier: Arc<dyn Notifier>,
    icons: Arc<dyn IconSet>,
    view_catalog: Arc<ViewCatalog>,
    theme_catalog: Arc<ThemeCatalog>,
    extensions: RwLock<HashMap<String, LoadedExtension>>,
    views: RwLock<HashMap<String, Arc<ViewExtension>>>,
    themes: RwLock<HashMap<String, Arc<ThemeExtension>>>,
    failures: RwLock<Vec<LoadFailure>>,
    gate: Mutex<Gate>,
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("config", &self.config)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl ExtensionRegistry {
    pub fn new(source: Arc<dyn ExtensionSource>, loader: CodeLoader, config: RegistryConfig) -> Self {
        Self {
            source,
            loader,
            config,
            notifier: Arc::new(TracingNotifier),
            icons: Arc::new(NamedIcons::any()),
            view_catalog: Arc::new(ViewCatalog::new()),
            theme_catalog: Arc::new(ThemeCatalog::new()),
            extensions: RwLock::new(HashMap::new()),
            views: RwLock::new(HashMap::new()),
            themes: RwLock::new(HashMap::new()),
            failures: RwLock::new(Vec::new()),
            gate: Mutex::new(Gate::NotStarted),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_icons(mut self, icons: Arc<dyn IconSet>) -> Self {
        self.icons = icons;
        self
    }

    pub fn with_catalogs(mut self, views: Arc<ViewCatalog>, themes: Arc<ThemeCatalog>) -> Self {
        self.view_catalog = views;
        self.theme_catalog = themes;
        self
    }

    // ── Load gate ────────────────────────────────────────────────────

    /// Start loading, or join the load already started.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn load(self: &Arc<Self>) -> LoadSignal {
        let mut gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        match &*gate {
            Gate::InFlight(signal) | Gate::Completed(signal) => return signal.clone(),
            Gate::NotStarted => {}
        }

        let (tx, rx) = watch::channel(None);
        let signal = LoadSignal { rx };
        *gate = Gate::InFlight(signal.clone());
        drop(gate);

        let registry = Arc::clone(self);
        let completed = signal.clone();
        tokio::spawn(async move {
            let outcome = registry.run().await.map_err(Arc::new);
            if let Err(e) = &outcome {
                tracing::error!(error = %e, "extension load failed");
                registry.notifier.notify(Notification::new(
                    NotificationLevel::Error,
                    FATAL_FAILURE_TITLE,
                    e.to_string(),
                ));
            }
            *registry.gate.lock().unwrap_or_else(PoisonError::into_inner) =
                Gate::Completed(completed);
            let _ = tx.send(Some(outcome));
        });

        signal
    }

    pub fn status(&self) -> LoadStatus {
        match &*self.gate.lock().unwrap_or_else(PoisonError::into_inner) {
            Gate::NotStarted => LoadStatus::NotStarted,
            Gate::InFlight(_) => LoadStatus::InFlight,
            Gate::Completed(_) => LoadStatus::Completed,
        }
    }

    // ── Pipeline ─────────────────────────────────────────────────────

    async fn run(&self) -> Result<LoadSummary, ExtensionError> {
        let started = Instant::now();
        tracing::info!("loading extensions");

        self.source.prepare().await.map_err(|e| match e {
            ExtensionError::UpstreamListingFailed(_) => e,
            other => ExtensionError::UpstreamListingFailed(other.to_string()),
        })?;

        let listing = match tokio::time::timeout(self.config.fetch_timeout, self.source.list()).await {
            Ok(Ok(listing)) => listing,
            Ok(Err(e)) => return Err(ExtensionError::UpstreamListingFailed(e.to_string())),
            Err(_) => {
                return Err(ExtensionError::UpstreamListingFailed(format!(
                    "listing timed out after {:?}",
                    self.config.fetch_timeout
                )))
            }
        };

        if listing.is_empty() {
            tracing::info!("no extensions installed");
            return Ok(LoadSummary::default());
        }

        let settled = join_all(listing.iter().map(|raw| self.settle(raw))).await;

        let mut summary = LoadSummary::default();
        for result in settled {
            match result {
                Ok(name) => summary.loaded.push(name),
                Err(failure) => summary.failures.push(failure),
            }
        }

        tracing::info!(
            loaded = summary.loaded.len(),
            failed = summary.failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "extensions loaded"
        );
        Ok(summary)
    }

    /// Run one item to completion. Its failure is reported here and never
    /// escapes to the batch.
    async fn settle(&self, raw: &RawExtension) -> Result<String, LoadFailure> {
        let mut name = raw.name.clone();
        match self.process_item(raw, &mut name).await {
            Ok(()) => Ok(name),
            Err(e) => {
                tracing::warn!(extension = %name, error = %e, "extension failed to load");
                self.notifier.notify(
                    Notification::new(NotificationLevel::Error, ITEM_FAILURE_TITLE, e.to_string())
                        .for_extension(name.clone()),
                );
                let failure = LoadFailure {
                    name,
                    error: e.to_string(),
                };
                self.failures.write().await.push(failure.clone());
                Err(failure)
            }
        }
    }

    /// `name` is updated to the manifest name once it is known.
    async fn process_item(&self, raw: &RawExtension, name: &mut String) -> Result<(), ExtensionError> {
        let text = decode_descriptor(&raw.manifest)?;
        let descriptor = validate_base(parse_descriptor(&text)?)?;
        name.clone_from(&descriptor.base.name);

        // Cheap early rejection; `register` re-checks under the write lock.
        if self.extensions.read().await.contains_key(name.as_str()) {
            return Err(ExtensionError::DuplicateExtension(name.clone()));
        }

        let entry = EntryPath::new(name.as_str(), descriptor.base.main.as_str());
        tracing::debug!(extension = %name, kind = %descriptor.base.kind, entry = %entry, "processing extension");

        let loaded = match descriptor.base.kind {
            ExtensionKind::View => LoadedExtension::View(Arc::new(self.load_view(&descriptor, &entry).await?)),
            ExtensionKind::Theme => LoadedExtension::Theme(Arc::new(self.load_theme(&descriptor, &entry).await?)),
        };

        self.register(loaded).await
    }

    async fn load_view(&self, descriptor: &Descriptor, entry: &EntryPath) -> Result<ViewExtension, ExtensionError> {
        let manifest = validate_view(descriptor)?;
        let component = self
            .loader
            .load_module(self.source.as_ref(), entry, self.config.fetch_timeout)
            .await?;

        Ok(ViewExtension {
            line_icon: self.icons.resolve(&manifest.line_icon),
            fill_icon: self.icons.resolve(&manifest.fill_icon),
            component: Arc::new(component),
            manifest,
        })
    }

    async fn load_theme(&self, descriptor: &Descriptor, entry: &EntryPath) -> Result<ThemeExtension, ExtensionError> {
        let manifest = validate_theme(descriptor)?;
        let stylesheet_failed = |reason: String| ExtensionError::StylesheetFetchFailed {
            entry: entry.to_string(),
            reason,
        };

        let css = match tokio::time::timeout(self.config.fetch_timeout, self.source.fetch_text(entry)).await {
            Ok(Ok(css)) => css,
            Ok(Err(e)) => return Err(stylesheet_failed(e.to_string())),
            Err(_) => {
                return Err(stylesheet_failed(format!(
                    "timed out after {:?}",
                    self.config.fetch_timeout
                )))
            }
        };

        let mut extracted = extract_theme_variables(&css);
        let mut variables = ThemeVariables::new();
        for id in &manifest.themes {
            match extracted.remove(id) {
                Some(vars) => {
                    variables.insert(id.clone(), vars);
                }
                None => tracing::debug!(
                    extension = %manifest.base.name,
                    theme = %id,
                    "theme declared but not defined by stylesheet"
                ),
            }
        }

        Ok(ThemeExtension { manifest, variables })
    }

    /// Insert into the unified registry, then the kind sub-registry, then
    /// publish to the catalogs. A view whose name is already in the view
    /// catalog is a duplicate.
    async fn register(&self, loaded: LoadedExtension) -> Result<(), ExtensionError> {
        let name = loaded.name().to_string();
        {
            let mut extensions = self.extensions.write().await;
            let shadows_view = matches!(loaded, LoadedExtension::View(_))
                && self.view_catalog.get(&name).is_some();
            if extensions.contains_key(&name) || shadows_view {
                return Err(ExtensionError::DuplicateExtension(name));
            }
            extensions.insert(name.clone(), loaded.clone());
        }

        match &loaded {
            LoadedExtension::View(view) => {
                self.views.write().await.insert(name.clone(), view.clone());
                let item = ViewItem {
                    name: name.clone(),
                    introduce: view.manifest.base.introduce.clone(),
                    line_icon: view.line_icon.clone(),
                    fill_icon: view.fill_icon.clone(),
                    component: ComponentHandle::Extension(view.component.clone()),
                    enabled: true,
                };
                if let Err(e) = self.view_catalog.add_view(item) {
                    tracing::warn!(extension = %name, "view not published to catalog: {e}");
                }
            }
            LoadedExtension::Theme(theme) => {
                self.themes.write().await.insert(name.clone(), theme.clone());
                for (id, vars) in &theme.variables {
                    if let Err(e) = self.theme_catalog.add_theme(id.clone(), vars.clone()) {
                        tracing::warn!(extension = %name, theme = %id, "theme not published to catalog: {e}");
                    }
                }
            }
        }

        tracing::info!(extension = %name, kind = %loaded.kind(), "extension registered");
        Ok(())
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub async fn get(&self, name: &str) -> Option<LoadedExtension> {
        self.extensions.read().await.get(name).cloned()
    }

    /// Registered names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.extensions.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.extensions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.extensions.read().await.is_empty()
    }

    pub async fn views(&self) -> Vec<Arc<ViewExtension>> {
        self.views.read().await.values().cloned().collect()
    }

    pub async fn view(&self, name: &str) -> Option<Arc<ViewExtension>> {
        self.views.read().await.get(name).cloned()
    }

    pub async fn themes(&self) -> Vec<Arc<ThemeExtension>> {
        self.themes.read().await.values().cloned().collect()
    }

    pub async fn theme(&self, name: &str) -> Option<Arc<ThemeExtension>> {
        self.themes.read().await.get(name).cloned()
    }

    /// Per-item failures recorded so far.
    pub async fn failures(&self) -> Vec<LoadFailure> {
        self.failures.read().await.clone()
    }

    pub fn view_catalog(&self) -> &Arc<ViewCatalog> {
        &self.view_catalog
    }

    pub fn theme_catalog(&self) -> &Arc<ThemeCatalog> {
        &self.theme_catalog
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }
}

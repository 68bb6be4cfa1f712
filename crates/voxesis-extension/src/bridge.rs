//! Module resolution bridge.
//!
//! Extension code never sees host objects directly. It addresses host
//! capabilities by symbolic import specifiers (`VConfigAPI`, `ui`, ...)
//! which the bridge maps to pseudo URLs and from there to the façades bound
//! at bootstrap. The specifiers are a stable contract with shipped
//! extensions; the façades behind them may change freely.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use serde_json::Value;

use crate::error::{ExtensionError, ModuleError};

// ─── Symbolic names ─────────────────────────────────────────────────

pub const UI_RUNTIME: &str = "ui";
pub const EVENT_RUNTIME: &str = "runtime";
pub const CONFIG_API: &str = "VConfigAPI";
pub const LOGGER_API: &str = "VLoggerAPI";
pub const PLUGIN_API: &str = "VPluginAPI";
pub const PROCESS_API: &str = "VProcessAPI";
pub const UTILS_API: &str = "VUtilsAPI";

/// Import specifier → pseudo URL.
pub const IMPORT_MAP: &[(&str, &str)] = &[
    (UI_RUNTIME, "app://ui"),
    (EVENT_RUNTIME, "app://runtime"),
    (CONFIG_API, "app://ipc/Config"),
    (LOGGER_API, "app://ipc/Logger"),
    (PLUGIN_API, "app://ipc/Plugin"),
    (PROCESS_API, "app://ipc/Process"),
    (UTILS_API, "app://ipc/Utils"),
];

/// Pseudo URL for a specifier, if it belongs to the fixed set.
pub fn pseudo_url(specifier: &str) -> Option<&'static str> {
    IMPORT_MAP
        .iter()
        .find(|(name, _)| *name == specifier)
        .map(|(_, url)| *url)
}

/// A host capability reachable from extension code.
pub trait HostFacade: Send + Sync {
    /// Invoke `method` with JSON arguments.
    fn call(&self, method: &str, args: &Value) -> Result<Value, ExtensionError>;
}

// ─── Namespace table ────────────────────────────────────────────────

/// Façades keyed by import specifier, prior to binding.
#[derive(Clone, Default)]
pub struct NamespaceTable {
    entries: BTreeMap<String, Arc<dyn HostFacade>>,
}

impl std::fmt::Debug for NamespaceTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceTable")
            .field("specifiers", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl NamespaceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a façade under a specifier from [`IMPORT_MAP`].
    pub fn insert(
        &mut self,
        specifier: &str,
        facade: Arc<dyn HostFacade>,
    ) -> Result<(), ExtensionError> {
        if pseudo_url(specifier).is_none() {
            return Err(ExtensionError::Bridge(format!(
                "unknown namespace '{specifier}'"
            )));
        }
        self.entries.insert(specifier.to_string(), facade);
        Ok(())
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(
        mut self,
        specifier: &str,
        facade: Arc<dyn HostFacade>,
    ) -> Result<Self, ExtensionError> {
        self.insert(specifier, facade)?;
        Ok(self)
    }

    pub fn specifiers(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ─── Bridge ─────────────────────────────────────────────────────────

/// Process-wide resolution table, written once and read by every load.
#[derive(Default)]
pub struct ModuleBridge {
    bound: OnceLock<BTreeMap<&'static str, Arc<dyn HostFacade>>>,
}

impl std::fmt::Debug for ModuleBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleBridge")
            .field("bound", &self.bound.get().map(|t| t.keys().collect::<Vec<_>>()))
            .finish()
    }
}

impl ModuleBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the namespace table.
    ///
    /// A second bind with the same specifiers is a no-op and keeps the
    /// original façades; a second bind with a different set is an error.
    pub fn bind(&self, table: NamespaceTable) -> Result<(), ExtensionError> {
        let mut urls = BTreeMap::new();
        for (specifier, facade) in table.entries {
            // insert() only admits specifiers from IMPORT_MAP.
            if let Some(url) = pseudo_url(&specifier) {
                urls.insert(url, facade);
            }
        }

        let keys: Vec<&'static str> = urls.keys().copied().collect();
        let mut fresh = false;
        let bound = self.bound.get_or_init(|| {
            fresh = true;
            urls
        });

        if fresh {
            tracing::info!(namespaces = ?keys, "module bridge bound");
            return Ok(());
        }

        if bound.keys().copied().eq(keys.iter().copied()) {
            tracing::debug!("module bridge already bound with the same namespaces");
            Ok(())
        } else {
            Err(ExtensionError::Bridge(format!(
                "bridge already bound to {:?}, refusing {keys:?}",
                bound.keys().collect::<Vec<_>>()
            )))
        }
    }

    pub fn is_bound(&self) -> bool {
        self.bound.get().is_some()
    }

    /// Resolve an import specifier or pseudo URL to its façade.
    pub fn resolve(&self, specifier: &str) -> Result<Arc<dyn HostFacade>, ModuleError> {
        let bound = self.bound.get().ok_or(ModuleError::BridgeUnbound)?;
        let url = pseudo_url(specifier).unwrap_or(specifier);
        bound
            .get(url)
            .cloned()
            .ok_or_else(|| ModuleError::UnresolvedImport(specifier.to_string()))
    }

    /// The import map restricted to bound namespaces, as handed to modules.
    pub fn import_map(&self) -> BTreeMap<&'static str, &'static str> {
        let Some(bound) = self.bound.get() else {
            return BTreeMap::new();
        };
        IMPORT_MAP
            .iter()
            .filter(|(_, url)| bound.contains_key(url))
            .map(|(name, url)| (*name, *url))
            .collect()
    }
}

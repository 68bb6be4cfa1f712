//! Code loader.
//!
//! Fetches a view's packaged source, materializes it as an ephemeral unit,
//! hands it to a [`ModuleEvaluator`] together with the module bridge, and
//! returns the default export. The unit is released when loading finishes,
//! whether it succeeded or not.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::bridge::ModuleBridge;
use crate::error::{ExtensionError, ModuleError};
use crate::source::{EntryPath, ExtensionSource};

/// URL prefix of materialized units.
pub const UNIT_URL_PREFIX: &str = "blob:voxesis/";

/// Source text materialized for evaluation. It has no on-disk artifact and
/// lives only while its load is in progress.
#[derive(Debug)]
pub struct ModuleUnit {
    pub url: String,
    pub entry: EntryPath,
    pub source: String,
}

/// A call into a host façade requested by evaluated code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRequest {
    /// Import specifier or pseudo URL of the façade.
    pub namespace: String,
    pub function: String,
    #[serde(default)]
    pub args: Value,
}

/// What an evaluator produces from a unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluatedModule {
    /// `null` when the unit has no default export.
    #[serde(default, rename = "component")]
    pub default_export: Value,
    #[serde(default)]
    pub host_requests: Vec<HostRequest>,
}

/// The surface a loaded view exposes to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedModule {
    pub entry: EntryPath,
    pub component: Value,
}

/// Compile-and-evaluate boundary.
///
/// Implementations resolve the unit's imports through `bridge` only.
pub trait ModuleEvaluator: Send + Sync {
    fn evaluate(&self, unit: &ModuleUnit, bridge: &ModuleBridge)
        -> Result<EvaluatedModule, ModuleError>;
}

// ─── Unit table ─────────────────────────────────────────────────────

type UnitTable = Arc<Mutex<HashMap<String, Arc<ModuleUnit>>>>;

/// Revokes its unit from the table on drop.
struct UnitGuard {
    table: UnitTable,
    unit: Arc<ModuleUnit>,
}

impl Drop for UnitGuard {
    fn drop(&mut self) {
        if let Ok(mut units) = self.table.lock() {
            units.remove(&self.unit.url);
        }
        tracing::trace!(unit = %self.unit.url, "module unit revoked");
    }
}

// ─── Loader ─────────────────────────────────────────────────────────

pub struct CodeLoader {
    bridge: Arc<ModuleBridge>,
    evaluator: Arc<dyn ModuleEvaluator>,
    units: UnitTable,
}

impl std::fmt::Debug for CodeLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeLoader")
            .field("bridge", &self.bridge)
            .field("live_units", &self.live_units())
            .finish_non_exhaustive()
    }
}

impl CodeLoader {
    pub fn new(bridge: Arc<ModuleBridge>, evaluator: Arc<dyn ModuleEvaluator>) -> Self {
        Self {
            bridge,
            evaluator,
            units: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn bridge(&self) -> &Arc<ModuleBridge> {
        &self.bridge
    }

    /// Number of units currently materialized.
    pub fn live_units(&self) -> usize {
        self.units.lock().map(|units| units.len()).unwrap_or(0)
    }

    fn materialize(&self, entry: &EntryPath, source: String) -> UnitGuard {
        let unit = Arc::new(ModuleUnit {
            url: format!("{UNIT_URL_PREFIX}{}", Uuid::new_v4()),
            entry: entry.clone(),
            source,
        });
        if let Ok(mut units) = self.units.lock() {
            units.insert(unit.url.clone(), unit.clone());
        }
        UnitGuard {
            table: self.units.clone(),
            unit,
        }
    }

    /// Load the module at `entry` and return its default export.
    ///
    /// Every failure is reported as [`ExtensionError::ModuleLoadFailed`].
    pub async fn load_module(
        &self,
        source: &dyn ExtensionSource,
        entry: &EntryPath,
        timeout: Duration,
    ) -> Result<ExportedModule, ExtensionError> {
        let fail = |cause: ModuleError| ExtensionError::module(entry, cause);
        let started = Instant::now();

        if !self.bridge.is_bound() {
            return Err(fail(ModuleError::BridgeUnbound));
        }

        let payload = match tokio::time::timeout(timeout, source.fetch_text(entry)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(fail(ModuleError::Fetch(e.to_string()))),
            Err(_) => {
                return Err(fail(ModuleError::Fetch(format!(
                    "timed out after {timeout:?}"
                ))))
            }
        };

        // The payload is a JSON string wrapping the module source.
        let code: String = serde_json::from_str(&payload)
            .map_err(|e| fail(ModuleError::Payload(e.to_string())))?;

        let guard = self.materialize(entry, code);
        let unit = guard.unit.clone();
        let bridge = self.bridge.clone();
        let evaluator = self.evaluator.clone();

        let evaluated = tokio::task::spawn_blocking(move || evaluator.evaluate(&unit, &bridge))
            .await
            .map_err(|e| fail(ModuleError::Evaluation(format!("evaluator task failed: {e}"))))?
            .map_err(fail)?;
        drop(guard);

        if evaluated.default_export.is_null() {
            return Err(fail(ModuleError::MissingDefaultExport));
        }

        dispatch_host_requests(&self.bridge, entry, evaluated.host_requests);

        tracing::debug!(
            entry = %entry,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "module loaded"
        );

        Ok(ExportedModule {
            entry: entry.clone(),
            component: evaluated.default_export,
        })
    }
}

/// Run host requests against the bound façades. Failures are logged only.
fn dispatch_host_requests(bridge: &ModuleBridge, entry: &EntryPath, requests: Vec<HostRequest>) {
    for req in requests {
        let facade = match bridge.resolve(&req.namespace) {
            Ok(facade) => facade,
            Err(e) => {
                tracing::warn!(
                    extension = %entry.extension,
                    namespace = %req.namespace,
                    function = %req.function,
                    "host request ignored: {e}"
                );
                continue;
            }
        };

        if let Err(e) = facade.call(&req.function, &req.args) {
            tracing::error!(
                extension = %entry.extension,
                namespace = %req.namespace,
                function = %req.function,
                "host request failed: {e}"
            );
        }
    }
}

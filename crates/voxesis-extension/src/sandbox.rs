//! WASM module evaluator using Extism (wasmtime).
//!
//! A view's source is a base64 WASM module. It may only import the
//! evaluator runtime namespaces; host capabilities are reached through
//! the module bridge by returning host requests from `default`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use serde_json::Value;

use crate::bridge::ModuleBridge;
use crate::error::ModuleError;
use crate::loader::{EvaluatedModule, ModuleEvaluator, ModuleUnit};

/// WASM binary magic bytes.
const WASM_MAGIC: &[u8; 4] = b"\0asm";

/// Name of the exported entry function.
pub const DEFAULT_EXPORT: &str = "default";

/// Imports always available to modules.
const RUNTIME_IMPORT_NAMESPACES: &[&str] = &["env", "extism:host/env"];

/// Extra imports available when WASI is enabled.
const WASI_IMPORT_NAMESPACES: &[&str] = &["wasi_snapshot_preview1", "wasi_unstable"];

// ─── Configuration ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Maximum memory in bytes (default: 32 MB).
    pub memory_limit: usize,
    /// Maximum fuel (instructions) per evaluation (default: 1_000_000).
    pub fuel_limit: u64,
    /// Whether to enable WASI (default: false).
    pub wasi_enabled: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            memory_limit: 32 * 1024 * 1024,
            fuel_limit: 1_000_000,
            wasi_enabled: false,
        }
    }
}

impl SandboxConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Self {
        Self {
            memory_limit: std::env::var("EXTENSION_MEMORY_LIMIT_MB")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(32)
                * 1024
                * 1024,
            fuel_limit: std::env::var("EXTENSION_FUEL_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1_000_000),
            wasi_enabled: std::env::var("EXTENSION_WASI_ENABLED")
                .unwrap_or_default()
                .eq_ignore_ascii_case("true"),
        }
    }

    fn allows_import(&self, namespace: &str) -> bool {
        RUNTIME_IMPORT_NAMESPACES.contains(&namespace)
            || (self.wasi_enabled && WASI_IMPORT_NAMESPACES.contains(&namespace))
    }
}

// ─── Evaluator ──────────────────────────────────────────────────────

/// Context passed to the module's `default` export.
#[derive(Debug, Serialize)]
struct EvaluationContext<'a> {
    extension: &'a str,
    entry: String,
    imports: std::collections::BTreeMap<&'static str, &'static str>,
}

/// Evaluates base64 WASM units in a fresh Extism plugin each time.
#[derive(Debug, Clone, Default)]
pub struct WasmEvaluator {
    config: SandboxConfig,
}

impl WasmEvaluator {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Reject modules importing anything outside the runtime namespaces.
    fn validate_imports(&self, wasm: &[u8]) -> Result<(), ModuleError> {
        use wasmparser::{Parser, Payload};

        for payload in Parser::new(0).parse_all(wasm) {
            let payload = payload
                .map_err(|e| ModuleError::Evaluation(format!("failed to parse WASM: {e}")))?;

            if let Payload::ImportSection(reader) = payload {
                for import in reader {
                    let import = import.map_err(|e| {
                        ModuleError::Evaluation(format!("failed to read import: {e}"))
                    })?;
                    if !self.config.allows_import(import.module) {
                        return Err(ModuleError::UnresolvedImport(format!(
                            "{}::{}",
                            import.module, import.name
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    fn decode(&self, unit: &ModuleUnit) -> Result<Vec<u8>, ModuleError> {
        let wasm = STANDARD
            .decode(unit.source.trim())
            .map_err(|e| ModuleError::Payload(format!("module is not base64: {e}")))?;
        if wasm.len() < 4 || &wasm[..4] != WASM_MAGIC {
            return Err(ModuleError::Payload(
                "invalid WASM binary: magic bytes mismatch".into(),
            ));
        }
        Ok(wasm)
    }

    fn instantiate(&self, wasm: Vec<u8>, extension: &str) -> Result<extism::Plugin, ModuleError> {
        let manifest = extism::Manifest::new([extism::Wasm::data(wasm)])
            .with_memory_max((self.config.memory_limit / 65536) as u32);

        if self.config.wasi_enabled {
            tracing::warn!(
                extension = %extension,
                "WASI enabled for extension, it can read the host environment"
            );
        }

        extism::PluginBuilder::new(manifest)
            .with_wasi(self.config.wasi_enabled)
            .with_fuel_limit(self.config.fuel_limit)
            .build()
            .map_err(|e| ModuleError::Evaluation(e.to_string()))
    }
}

impl ModuleEvaluator for WasmEvaluator {
    fn evaluate(
        &self,
        unit: &ModuleUnit,
        bridge: &ModuleBridge,
    ) -> Result<EvaluatedModule, ModuleError> {
        let wasm = self.decode(unit)?;
        self.validate_imports(&wasm)?;

        let mut plugin = self.instantiate(wasm, &unit.entry.extension)?;
        if !plugin.function_exists(DEFAULT_EXPORT) {
            return Err(ModuleError::MissingDefaultExport);
        }

        let context = EvaluationContext {
            extension: &unit.entry.extension,
            entry: unit.entry.to_string(),
            imports: bridge.import_map(),
        };
        let input = serde_json::to_vec(&context)
            .map_err(|e| ModuleError::Evaluation(e.to_string()))?;

        let output = plugin
            .call::<&[u8], Vec<u8>>(DEFAULT_EXPORT, &input)
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("fuel") {
                    ModuleError::FuelExhausted
                } else {
                    ModuleError::Evaluation(msg)
                }
            })?;

        if output.is_empty() {
            return Ok(EvaluatedModule {
                default_export: Value::Null,
                host_requests: Vec::new(),
            });
        }

        serde_json::from_slice(&output)
            .map_err(|e| ModuleError::Evaluation(format!("invalid default export: {e}")))
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

//! Default host façades bound into the module bridge at bootstrap.
//!
//! Each façade is a small method table reachable from extension code by
//! symbolic name. Arguments and results are JSON.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::bridge::{
    HostFacade, NamespaceTable, CONFIG_API, EVENT_RUNTIME, LOGGER_API, PLUGIN_API, PROCESS_API,
    UI_RUNTIME, UTILS_API,
};
use crate::error::ExtensionError;

/// Maximum log message length accepted from extensions.
const MAX_LOG_MESSAGE_LEN: usize = 2048;

/// Strip control characters (except newline/tab) and truncate.
pub fn sanitize_log_message(message: &str) -> String {
    let cleaned: String = message
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .take(MAX_LOG_MESSAGE_LEN)
        .collect();
    if message.chars().count() > MAX_LOG_MESSAGE_LEN {
        format!("{cleaned}… (truncated)")
    } else {
        cleaned
    }
}

fn str_arg<'a>(args: &'a Value, field: &str, method: &str) -> Result<&'a str, ExtensionError> {
    args.get(field).and_then(Value::as_str).ok_or_else(|| {
        ExtensionError::HostFunction(format!("{method}: missing string argument `{field}`"))
    })
}

fn unknown_method(facade: &str, method: &str) -> ExtensionError {
    ExtensionError::HostFunction(format!("{facade} has no method '{method}'"))
}

// ─── Logger ─────────────────────────────────────────────────────────

/// Forwards extension log lines to `tracing`.
#[derive(Debug, Default)]
pub struct LoggerFacade;

impl HostFacade for LoggerFacade {
    fn call(&self, method: &str, args: &Value) -> Result<Value, ExtensionError> {
        let message = sanitize_log_message(str_arg(args, "message", method)?);
        let extension = args.get("extension").and_then(Value::as_str).unwrap_or("-");

        match method {
            "debug" => tracing::debug!(extension = %extension, "{message}"),
            "info" => tracing::info!(extension = %extension, "{message}"),
            "warn" => tracing::warn!(extension = %extension, "{message}"),
            "error" => tracing::error!(extension = %extension, "{message}"),
            other => return Err(unknown_method("Logger", other)),
        }
        Ok(Value::Null)
    }
}

// ─── Config ─────────────────────────────────────────────────────────

/// In-process key/value configuration store.
#[derive(Debug, Default)]
pub struct MemoryConfigFacade {
    values: RwLock<BTreeMap<String, Value>>,
}

impl MemoryConfigFacade {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values
            .read()
            .ok()
            .and_then(|values| values.get(key).cloned())
    }
}

impl HostFacade for MemoryConfigFacade {
    fn call(&self, method: &str, args: &Value) -> Result<Value, ExtensionError> {
        let poisoned = || ExtensionError::HostFunction("config store lock poisoned".into());
        match method {
            "get" => {
                let key = str_arg(args, "key", method)?;
                Ok(self.get(key).unwrap_or(Value::Null))
            }
            "set" => {
                let key = str_arg(args, "key", method)?;
                let value = args.get("value").cloned().unwrap_or(Value::Null);
                let mut values = self.values.write().map_err(|_| poisoned())?;
                values.insert(key.to_string(), value);
                Ok(Value::Bool(true))
            }
            "keys" => {
                let values = self.values.read().map_err(|_| poisoned())?;
                Ok(json!(values.keys().collect::<Vec<_>>()))
            }
            other => Err(unknown_method("Config", other)),
        }
    }
}

// ─── Utils ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct UtilsFacade {
    version: String,
}

impl UtilsFacade {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }
}

impl HostFacade for UtilsFacade {
    fn call(&self, method: &str, _args: &Value) -> Result<Value, ExtensionError> {
        match method {
            "version" => Ok(Value::String(self.version.clone())),
            "platform" => Ok(json!({
                "os": std::env::consts::OS,
                "arch": std::env::consts::ARCH,
            })),
            "timestamp" => Ok(Value::String(Utc::now().to_rfc3339())),
            other => Err(unknown_method("Utils", other)),
        }
    }
}

// ─── Event runtime ──────────────────────────────────────────────────

/// An event emitted by extension code.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmittedEvent {
    pub name: String,
    pub payload: Value,
    pub at: DateTime<Utc>,
}

/// Records `emit` calls until the host drains them.
#[derive(Debug, Default)]
pub struct EventRuntimeFacade {
    queue: Mutex<Vec<EmittedEvent>>,
}

impl EventRuntimeFacade {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every event emitted so far.
    pub fn drain(&self) -> Vec<EmittedEvent> {
        self.queue
            .lock()
            .map(|mut queue| std::mem::take(&mut *queue))
            .unwrap_or_default()
    }
}

impl HostFacade for EventRuntimeFacade {
    fn call(&self, method: &str, args: &Value) -> Result<Value, ExtensionError> {
        if method != "emit" {
            return Err(unknown_method("runtime", method));
        }
        let name = str_arg(args, "event", method)?;
        if name.is_empty() {
            return Err(ExtensionError::HostFunction(
                "event name cannot be empty".into(),
            ));
        }

        tracing::debug!(event = %name, "extension emitted event");
        let event = EmittedEvent {
            name: name.to_string(),
            payload: args.get("payload").cloned().unwrap_or(Value::Null),
            at: Utc::now(),
        };
        self.queue
            .lock()
            .map_err(|_| ExtensionError::HostFunction("event queue lock poisoned".into()))?
            .push(event);
        Ok(Value::Bool(true))
    }
}

// ─── Unavailable ────────────────────────────────────────────────────

/// Stands in for a capability the running host does not provide.
#[derive(Debug, Clone)]
pub struct UnavailableFacade {
    capability: &'static str,
}

impl UnavailableFacade {
    pub fn new(capability: &'static str) -> Self {
        Self { capability }
    }
}

impl HostFacade for UnavailableFacade {
    fn call(&self, method: &str, _args: &Value) -> Result<Value, ExtensionError> {
        Err(ExtensionError::HostFunction(format!(
            "{} is unavailable in this host (called '{method}')",
            self.capability
        )))
    }
}

/// Handles to the stateful default façades, for the host to inspect.
#[derive(Debug, Clone)]
pub struct DefaultFacades {
    pub config: Arc<MemoryConfigFacade>,
    pub events: Arc<EventRuntimeFacade>,
}

/// Namespace table with every symbolic name bound to a default façade.
pub fn default_namespace_table(
    version: &str,
) -> Result<(NamespaceTable, DefaultFacades), ExtensionError> {
    let handles = DefaultFacades {
        config: Arc::new(MemoryConfigFacade::new()),
        events: Arc::new(EventRuntimeFacade::new()),
    };

    let table = NamespaceTable::new()
        .with(UI_RUNTIME, Arc::new(UnavailableFacade::new("ui runtime")))?
        .with(EVENT_RUNTIME, handles.events.clone())?
        .with(CONFIG_API, handles.config.clone())?
        .with(LOGGER_API, Arc::new(LoggerFacade))?
        .with(PLUGIN_API, Arc::new(UnavailableFacade::new("plugin manager")))?
        .with(PROCESS_API, Arc::new(UnavailableFacade::new("process manager")))?
        .with(UTILS_API, Arc::new(UtilsFacade::new(version)))?;

    Ok((table, handles))
}

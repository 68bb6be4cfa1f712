//! Voxesis extension system
//!
//! Loads third-party view and theme extensions at runtime. Descriptors are
//! decoded and validated per kind, view code is evaluated behind a module
//! bridge that exposes host façades by symbolic name, theme stylesheets are
//! reduced to per-theme variables, and everything that loads is published
//! into the registry and the host catalogs.

pub mod bridge;
pub mod catalog;
pub mod decoder;
pub mod error;
pub mod events;
pub mod facades;
pub mod loader;
pub mod manifest;
pub mod registry;
pub mod sandbox;
pub mod settings;
pub mod source;
pub mod theme;

pub use bridge::{HostFacade, ModuleBridge, NamespaceTable, IMPORT_MAP};
pub use catalog::{IconHandle, IconSet, NamedIcons, ThemeApplication, ThemeCatalog, ViewCatalog};
pub use decoder::{decode_descriptor, parse_descriptor};
pub use error::{ExtensionError, ModuleError};
pub use events::{Notification, NotificationLevel, NotificationLog, Notifier, TracingNotifier};
pub use facades::default_namespace_table;
pub use loader::{CodeLoader, EvaluatedModule, ExportedModule, HostRequest, ModuleEvaluator, ModuleUnit};
pub use manifest::{BaseManifest, ExtensionKind, ThemeManifest, ViewManifest};
pub use registry::{
    ExtensionRegistry, LoadFailure, LoadSignal, LoadStatus, LoadSummary, LoadedExtension,
    RegistryConfig, ThemeExtension, ViewExtension,
};
pub use sandbox::{SandboxConfig, WasmEvaluator};
pub use settings::{SettingGroup, SettingItem};
pub use source::{DirectorySource, EntryPath, ExtensionSource, HttpSource, RawExtension};
pub use theme::{extract_theme_variables, ThemeVariables};

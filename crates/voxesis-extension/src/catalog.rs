//! Catalogs consuming registered extensions.
//!
//! The view catalog lists navigable surfaces and the theme catalog lists
//! selectable themes. Both start with the host's built-in entries and are
//! only written by the registry's publish step.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::error::ExtensionError;
use crate::loader::ExportedModule;

// ─── Icons ──────────────────────────────────────────────────────────

/// Resolved icon reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconHandle {
    Glyph(String),
    Unknown(String),
}

/// Maps icon identifiers from manifests to host icons.
pub trait IconSet: Send + Sync {
    fn resolve(&self, identifier: &str) -> IconHandle;
}

/// Accepts any non-empty identifier, or only a fixed list when given one.
#[derive(Debug, Clone, Default)]
pub struct NamedIcons {
    known: Option<Vec<String>>,
}

impl NamedIcons {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: Some(names.into_iter().map(Into::into).collect()),
        }
    }
}

impl IconSet for NamedIcons {
    fn resolve(&self, identifier: &str) -> IconHandle {
        let known = match &self.known {
            Some(names) => names.iter().any(|n| n == identifier),
            None => !identifier.trim().is_empty(),
        };
        if known {
            IconHandle::Glyph(identifier.to_string())
        } else {
            tracing::debug!(icon = %identifier, "unknown icon identifier");
            IconHandle::Unknown(identifier.to_string())
        }
    }
}

// ─── Views ──────────────────────────────────────────────────────────

pub const BUILTIN_VIEWS: &[&str] = &["instance", "pluginManager"];

#[derive(Debug, Clone, PartialEq)]
pub enum ComponentHandle {
    BuiltIn(&'static str),
    Extension(Arc<ExportedModule>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewItem {
    pub name: String,
    pub introduce: String,
    pub line_icon: IconHandle,
    pub fill_icon: IconHandle,
    pub component: ComponentHandle,
    pub enabled: bool,
}

#[derive(Debug)]
pub struct ViewCatalog {
    items: RwLock<Vec<ViewItem>>,
}

impl Default for ViewCatalog {
    fn default() -> Self {
        let builtins = BUILTIN_VIEWS
            .iter()
            .map(|name| ViewItem {
                name: (*name).to_string(),
                introduce: String::new(),
                line_icon: IconHandle::Glyph(format!("{name}Line")),
                fill_icon: IconHandle::Glyph(format!("{name}Fill")),
                component: ComponentHandle::BuiltIn(*name),
                enabled: true,
            })
            .collect();
        Self {
            items: RwLock::new(builtins),
        }
    }
}

impl ViewCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a view. Fails if the name is taken.
    pub fn add_view(&self, item: ViewItem) -> Result<(), ExtensionError> {
        let mut items = self
            .items
            .write()
            .map_err(|_| ExtensionError::Bridge("view catalog lock poisoned".into()))?;
        if items.iter().any(|v| v.name == item.name) {
            return Err(ExtensionError::DuplicateExtension(item.name));
        }
        tracing::debug!(view = %item.name, "view added to catalog");
        items.push(item);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<ViewItem> {
        self.items
            .read()
            .ok()?
            .iter()
            .find(|v| v.name == name)
            .cloned()
    }

    /// View names in display order.
    pub fn names(&self) -> Vec<String> {
        self.items
            .read()
            .map(|items| items.iter().map(|v| v.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.items.read().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── Themes ─────────────────────────────────────────────────────────

pub const DEFAULT_THEMES: &[&str] = &["light", "dark", "frosted-glass"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThemeEntry {
    /// Applied through the `data-theme` attribute.
    Default,
    /// Applied by setting custom properties.
    Custom(BTreeMap<String, String>),
}

/// Changes needed to switch to a theme.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThemeApplication {
    /// Custom properties to remove, left over from the previous theme.
    pub cleared: Vec<String>,
    /// Value for the `data-theme` attribute, for default themes.
    pub data_theme: Option<String>,
    pub set: Vec<(String, String)>,
}

#[derive(Debug)]
struct ThemeState {
    themes: BTreeMap<String, ThemeEntry>,
    /// Properties set by the active custom theme.
    applied: Vec<String>,
    active: Option<String>,
}

#[derive(Debug)]
pub struct ThemeCatalog {
    state: RwLock<ThemeState>,
}

impl Default for ThemeCatalog {
    fn default() -> Self {
        let themes = DEFAULT_THEMES
            .iter()
            .map(|name| ((*name).to_string(), ThemeEntry::Default))
            .collect();
        Self {
            state: RwLock::new(ThemeState {
                themes,
                applied: Vec::new(),
                active: None,
            }),
        }
    }
}

fn poisoned() -> ExtensionError {
    ExtensionError::Bridge("theme catalog lock poisoned".into())
}

impl ThemeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom theme. An existing entry of the same name is replaced.
    pub fn add_theme(
        &self,
        name: impl Into<String>,
        variables: BTreeMap<String, String>,
    ) -> Result<(), ExtensionError> {
        let name = name.into();
        let mut state = self.state.write().map_err(|_| poisoned())?;
        if state.themes.contains_key(&name) {
            tracing::debug!(theme = %name, "replacing existing theme");
        }
        state.themes.insert(name, ThemeEntry::Custom(variables));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<ThemeEntry> {
        self.state.read().ok()?.themes.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.state
            .read()
            .map(|s| s.themes.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn active(&self) -> Option<String> {
        self.state.read().ok()?.active.clone()
    }

    /// Switch to `name` and return what has to change.
    pub fn toggle(&self, name: &str) -> Result<ThemeApplication, ExtensionError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let entry = state
            .themes
            .get(name)
            .cloned()
            .ok_or_else(|| ExtensionError::ThemeNotFound(name.to_string()))?;

        let cleared = std::mem::take(&mut state.applied);
        let application = match entry {
            ThemeEntry::Default => ThemeApplication {
                cleared,
                data_theme: Some(name.to_string()),
                set: Vec::new(),
            },
            ThemeEntry::Custom(variables) => {
                state.applied = variables.keys().cloned().collect();
                ThemeApplication {
                    cleared,
                    data_theme: None,
                    set: variables.into_iter().collect(),
                }
            }
        };
        state.active = Some(name.to_string());

        tracing::debug!(theme = %name, "theme toggled");
        Ok(application)
    }
}

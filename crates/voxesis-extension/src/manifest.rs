//! Extension manifest parsing and validation.
//!
//! A descriptor is first checked against the fields every extension
//! carries ([`BaseManifest`]), then refined by kind into a
//! [`ViewManifest`] or [`ThemeManifest`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ExtensionError;
use crate::settings::SettingGroup;

/// The kinds of extension the host understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionKind {
    View,
    Theme,
}

impl std::fmt::Display for ExtensionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::View => f.write_str("view"),
            Self::Theme => f.write_str("theme"),
        }
    }
}

/// Fields common to every extension kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseManifest {
    pub name: String,
    pub main: String,
    pub introduce: String,
    #[serde(rename = "plugin_type", alias = "kind")]
    pub kind: ExtensionKind,
    pub version: String,
    pub author: String,
    #[serde(default)]
    pub repository: Option<String>,
}

/// A base-validated descriptor, still holding its JSON for kind validation.
#[derive(Debug, Clone)]
pub struct Descriptor {
    pub base: BaseManifest,
    document: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewManifest {
    pub base: BaseManifest,
    pub line_icon: String,
    pub fill_icon: String,
    pub settings: SettingGroup,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThemeManifest {
    pub base: BaseManifest,
    pub themes: Vec<String>,
}

#[derive(Deserialize)]
struct ViewFields {
    #[serde(alias = "lineIcon")]
    line_icon: String,
    #[serde(alias = "fillIcon")]
    fill_icon: String,
    settings: Value,
}

#[derive(Deserialize)]
struct ThemeFields {
    themes: Vec<String>,
}

// ─── Validation helpers ─────────────────────────────────────────────

/// Names double as package directory names.
fn validate_name(name: &str) -> Result<(), ExtensionError> {
    if name.trim().is_empty() {
        return Err(ExtensionError::InvalidManifest(
            "name must not be empty".into(),
        ));
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(ExtensionError::InvalidManifest(format!(
            "name must not contain path separators: '{name}'"
        )));
    }
    Ok(())
}

/// Validate that a path is safe (no `..` components, not absolute).
pub(crate) fn validate_path_safety(path: &str, field_name: &str) -> Result<(), ExtensionError> {
    if path.is_empty() {
        return Err(ExtensionError::InvalidManifest(format!(
            "{field_name} must not be empty"
        )));
    }
    let p = std::path::Path::new(path);
    if p.is_absolute() || path.starts_with('/') || path.starts_with('\\') {
        return Err(ExtensionError::InvalidManifest(format!(
            "{field_name} must be a relative path, got absolute: '{path}'"
        )));
    }
    for component in p.components() {
        if matches!(component, std::path::Component::ParentDir) {
            return Err(ExtensionError::InvalidManifest(format!(
                "{field_name} must not contain '..': '{path}'"
            )));
        }
    }
    Ok(())
}

// ─── Validators ─────────────────────────────────────────────────────

/// Check the fields shared by every kind.
pub fn validate_base(document: Value) -> Result<Descriptor, ExtensionError> {
    if !document.is_object() {
        return Err(ExtensionError::InvalidManifest(
            "manifest must be a JSON object".into(),
        ));
    }

    let base = BaseManifest::deserialize(&document)
        .map_err(|e| ExtensionError::InvalidManifest(e.to_string()))?;

    validate_name(&base.name)?;
    validate_path_safety(&base.main, "main")?;

    Ok(Descriptor { base, document })
}

/// Refine a descriptor into a view manifest.
///
/// Any invalid settings item rejects the whole manifest.
pub fn validate_view(descriptor: &Descriptor) -> Result<ViewManifest, ExtensionError> {
    let fields = ViewFields::deserialize(&descriptor.document).map_err(|e| {
        ExtensionError::InvalidManifest(format!("{}: {e}", descriptor.base.name))
    })?;

    let settings = SettingGroup::parse(&fields.settings).map_err(|e| match e {
        ExtensionError::InvalidManifest(reason) => {
            ExtensionError::InvalidManifest(format!("{}: {reason}", descriptor.base.name))
        }
        other => other,
    })?;

    Ok(ViewManifest {
        base: descriptor.base.clone(),
        line_icon: fields.line_icon,
        fill_icon: fields.fill_icon,
        settings,
    })
}

/// Refine a descriptor into a theme manifest.
pub fn validate_theme(descriptor: &Descriptor) -> Result<ThemeManifest, ExtensionError> {
    let fields = ThemeFields::deserialize(&descriptor.document).map_err(|e| {
        ExtensionError::InvalidManifest(format!("{}: {e}", descriptor.base.name))
    })?;

    Ok(ThemeManifest {
        base: descriptor.base.clone(),
        themes: fields.themes,
    })
}

// ─── Tests ──────────────────────────────────────────────────────────

//! Settings declared by view extensions.
//!
//! Every item is tagged by `type` (and, for inputs, `value_type`). The tag
//! decides which fields are mandatory; an unknown tag or a missing field
//! rejects the whole settings group.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ExtensionError;

/// A group of settings shown on the extension's settings page.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingGroup {
    pub display: Option<String>,
    pub items: Vec<SettingItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettingItem {
    Text(TextInput),
    Number(NumberInput),
    DropDown(DropDown),
    Switch(Switch),
    SelectDir(SelectDir),
    SelectFile(SelectFile),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextKind {
    Text,
    Password,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextInput {
    pub label: String,
    pub key: String,
    pub value_type: TextKind,
    pub value: String,
    pub placeholder: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberInput {
    pub label: String,
    pub key: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub placeholder: String,
}

/// Value of a drop-down option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropDownOption {
    pub label: String,
    pub value: OptionValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropDown {
    pub label: String,
    pub key: String,
    pub value: OptionValue,
    pub placeholder: String,
    pub list: Vec<DropDownOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Switch {
    pub label: String,
    pub key: String,
    pub value: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectDir {
    pub label: String,
    pub key: String,
    pub value: String,
    pub title: String,
    pub placeholder: String,
    #[serde(default, rename = "filesList")]
    pub files_list: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileFilter {
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectFile {
    pub label: String,
    pub key: String,
    pub value: String,
    pub title: String,
    pub placeholder: String,
    #[serde(default)]
    pub filters: Option<FileFilter>,
}

impl SettingItem {
    /// The configuration key this item edits.
    pub fn key(&self) -> &str {
        match self {
            Self::Text(i) => &i.key,
            Self::Number(i) => &i.key,
            Self::DropDown(i) => &i.key,
            Self::Switch(i) => &i.key,
            Self::SelectDir(i) => &i.key,
            Self::SelectFile(i) => &i.key,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Text(i) => &i.label,
            Self::Number(i) => &i.label,
            Self::DropDown(i) => &i.label,
            Self::Switch(i) => &i.label,
            Self::SelectDir(i) => &i.label,
            Self::SelectFile(i) => &i.label,
        }
    }

    /// Parse one item from its wire shape. `index` is only used in errors.
    pub fn parse(index: usize, value: &Value) -> Result<Self, ExtensionError> {
        let invalid = |reason: String| {
            ExtensionError::InvalidManifest(format!("settings item {index} is invalid: {reason}"))
        };

        if !value.is_object() {
            return Err(invalid("expected an object".into()));
        }

        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("missing string field `type`".into()))?;

        let item = match tag {
            "input" => match value.get("value_type").and_then(Value::as_str) {
                Some("text") | Some("password") => TextInput::deserialize(value).map(Self::Text),
                Some("number") => NumberInput::deserialize(value).map(Self::Number),
                Some(other) => return Err(invalid(format!("unrecognized value_type '{other}'"))),
                None => return Err(invalid("input requires a string `value_type`".into())),
            },
            "drop_down" => DropDown::deserialize(value).map(Self::DropDown),
            "switch" => Switch::deserialize(value).map(Self::Switch),
            "select_dir" => SelectDir::deserialize(value).map(Self::SelectDir),
            "select_file" => SelectFile::deserialize(value).map(Self::SelectFile),
            other => return Err(invalid(format!("unrecognized type '{other}'"))),
        };

        item.map_err(|e| invalid(e.to_string()))
    }
}

impl SettingGroup {
    /// Parse the `settings` object of a view manifest.
    pub fn parse(value: &Value) -> Result<Self, ExtensionError> {
        let object = value.as_object().ok_or_else(|| {
            ExtensionError::InvalidManifest("`settings` must be an object".into())
        })?;

        let display = match object.get("display") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                return Err(ExtensionError::InvalidManifest(
                    "`settings.display` must be a string".into(),
                ))
            }
        };

        let items = object
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ExtensionError::InvalidManifest("`settings.items` must be an array".into())
            })?
            .iter()
            .enumerate()
            .map(|(index, item)| SettingItem::parse(index, item))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { display, items })
    }
}

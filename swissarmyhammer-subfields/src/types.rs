//! Core data model for composite fields.
//!
//! A composite field stores one flat row per delta. Each subfield owns the
//! columns prefixed with its id, and is configured by a [`SubfieldSpec`]
//! (storage level) plus a [`SubfieldFieldConfig`] (field level). All types
//! serialize to/from YAML via serde.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::Result;
use crate::fingerprint::{Fingerprintable, KeyPart};

/// Free-form plugin settings.
pub type Settings = Map<String, Value>;

/// One delta of a composite field, keyed `{subfield}_{column}`.
pub type CompositeValue = Map<String, Value>;

/// One subfield's value in the shape its own field type expects, keyed `{column}`.
pub type SubfieldValue = Map<String, Value>;

/// Storage-level configuration of a single subfield.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubfieldSpec {
    /// Base field-type id, or a preconfigured compound id such as `list_string:colors`.
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub settings: Settings,
}

impl SubfieldSpec {
    pub fn new(type_: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            type_: type_.into(),
            label: label.into(),
            settings: Settings::new(),
        }
    }

    /// Replace the settings map.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }
}

impl Default for SubfieldSpec {
    fn default() -> Self {
        let mut settings = Settings::new();
        settings.insert("maxlength".into(), json!(255));
        Self {
            type_: "string".into(),
            label: String::new(),
            settings,
        }
    }
}

/// Field-level configuration of a single subfield (per bundle).
///
/// An unset `required` is filled from the configured `fields_default`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubfieldFieldConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default)]
    pub settings: Settings,
}

impl SubfieldFieldConfig {
    pub fn required() -> Self {
        Self {
            required: Some(true),
            settings: Settings::new(),
        }
    }

    pub fn optional() -> Self {
        Self {
            required: Some(false),
            settings: Settings::new(),
        }
    }

    pub fn is_required(&self) -> bool {
        self.required.unwrap_or(false)
    }

    /// Only keys that are set take part, so merging leaves the rest to the base layer.
    pub(crate) fn to_settings(&self) -> Settings {
        let mut map = Settings::new();
        if let Some(required) = self.required {
            map.insert("required".into(), Value::Bool(required));
        }
        map.insert("settings".into(), Value::Object(self.settings.clone()));
        map
    }

    pub(crate) fn from_settings(map: &Settings) -> Self {
        Self {
            required: map.get("required").map(truthy),
            settings: map
                .get("settings")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
        }
    }
}

impl Default for SubfieldFieldConfig {
    fn default() -> Self {
        Self::required()
    }
}

/// The persisted storage definition of a composite field.
///
/// Subfield ids are unique and must not be renamed or retyped once rows exist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompositeFieldStorage {
    pub name: String,
    pub target_entity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub provider: String,
    #[serde(default = "default_true")]
    pub queryable: bool,
    #[serde(default)]
    pub revisionable: bool,
    #[serde(default)]
    pub translatable: bool,
    #[serde(default)]
    pub custom_storage: bool,
    #[serde(default, skip_serializing_if = "Settings::is_empty")]
    pub constraints: Settings,
    #[serde(default = "default_storage")]
    pub storage: IndexMap<String, SubfieldSpec>,
    #[serde(default)]
    pub storage_default: SubfieldSpec,
}

impl CompositeFieldStorage {
    /// A storage with the default single `value_0` subfield.
    pub fn new(name: impl Into<String>, target_entity_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_entity_type: target_entity_type.into(),
            description: None,
            provider: "swissarmyhammer_subfields".into(),
            queryable: true,
            revisionable: false,
            translatable: false,
            custom_storage: false,
            constraints: Settings::new(),
            storage: default_storage(),
            storage_default: SubfieldSpec::default(),
        }
    }

    /// Replace all subfields.
    pub fn with_subfields<I, K>(mut self, subfields: I) -> Self
    where
        I: IntoIterator<Item = (K, SubfieldSpec)>,
        K: Into<String>,
    {
        self.storage = subfields.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self
    }

    pub fn subfield(&self, subfield: &str) -> Option<&SubfieldSpec> {
        self.storage.get(subfield)
    }

    /// Append a subfield named `value_{n}` using the default spec and return its id.
    pub fn add_subfield(&mut self) -> String {
        let mut n = self.storage.len();
        let mut id = format!("value_{n}");
        while self.storage.contains_key(&id) {
            n += 1;
            id = format!("value_{n}");
        }
        self.storage.insert(id.clone(), self.storage_default.clone());
        id
    }

    /// Remove the last subfield, if any.
    pub fn remove_last_subfield(&mut self) -> Option<(String, SubfieldSpec)> {
        self.storage.pop()
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}

/// The per-bundle field configuration that owns a composite storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompositeFieldConfig {
    pub field_name: String,
    pub entity_type: String,
    pub bundle: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub fields: IndexMap<String, SubfieldFieldConfig>,
}

impl CompositeFieldConfig {
    pub fn new(storage: &CompositeFieldStorage, bundle: impl Into<String>) -> Self {
        Self {
            field_name: storage.name.clone(),
            entity_type: storage.target_entity_type.clone(),
            bundle: bundle.into(),
            label: String::new(),
            fields: IndexMap::new(),
        }
    }

    /// Set the field-level config of one subfield.
    pub fn with_field(mut self, subfield: impl Into<String>, config: SubfieldFieldConfig) -> Self {
        self.fields.insert(subfield.into(), config);
        self
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }
}

/// A preconfigured option declared by a field type.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PresetOption {
    #[serde(default)]
    pub label: String,
    /// Storage settings the preset contributes when not set explicitly.
    #[serde(default)]
    pub storage_settings: Settings,
}

/// What the host's field-type registry declares about one type.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FieldTypeDefinition {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub default_widget: String,
    #[serde(default)]
    pub default_formatter: String,
    /// Identifier of the item-list implementation the registry builds for this type.
    #[serde(default)]
    pub list_class: String,
    /// Whether values point at other records (empty values use the no-target sentinel).
    #[serde(default)]
    pub reference: bool,
    #[serde(default)]
    pub default_storage_settings: Settings,
    #[serde(default)]
    pub preconfigured_options: IndexMap<String, PresetOption>,
}

/// One column of a field type's storage schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ColumnSpec {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default)]
    pub not_null: bool,
}

impl ColumnSpec {
    pub fn new(type_: impl Into<String>) -> Self {
        Self {
            type_: type_.into(),
            length: None,
            not_null: false,
        }
    }
}

/// A field type's declared storage schema, in column order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Schema {
    pub columns: IndexMap<String, ColumnSpec>,
}

impl Schema {
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn first_column(&self) -> Option<&str> {
        self.columns.keys().next().map(String::as_str)
    }
}

/// A typed property exposed by a field type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertyDefinition {
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub computed: bool,
}

/// Constraints keyed by column, then constraint name, then options.
pub type ConstraintSet = IndexMap<String, IndexMap<String, Value>>;

impl Fingerprintable for SubfieldSpec {
    fn key_part(&self) -> KeyPart {
        KeyPart::map([
            ("type", self.type_.key_part()),
            ("label", self.label.key_part()),
            ("settings", self.settings.key_part()),
        ])
    }
}

impl Fingerprintable for SubfieldFieldConfig {
    fn key_part(&self) -> KeyPart {
        KeyPart::map([
            ("required", self.required.map(u32::from).key_part()),
            ("settings", self.settings.key_part()),
        ])
    }
}

/// A storage is identified by its name plus the attributes subfields inherit.
/// Subfield specs are keyed separately.
impl Fingerprintable for CompositeFieldStorage {
    fn key_part(&self) -> KeyPart {
        KeyPart::map([
            ("name", self.name.key_part()),
            ("target_entity_type", self.target_entity_type.key_part()),
            ("description", self.description.key_part()),
            ("provider", self.provider.key_part()),
            ("queryable", self.queryable.key_part()),
            ("revisionable", self.revisionable.key_part()),
            ("translatable", self.translatable.key_part()),
            ("custom_storage", self.custom_storage.key_part()),
            ("constraints", self.constraints.key_part()),
        ])
    }
}

/// Loose truthiness used where composite values are filtered or fingerprinted.
///
/// `null`, `false`, `0`, `""`, `"0"`, and empty containers are falsy.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn default_true() -> bool {
    true
}

fn default_storage() -> IndexMap<String, SubfieldSpec> {
    let mut storage = IndexMap::new();
    storage.insert("value_0".to_string(), SubfieldSpec::default());
    storage
}

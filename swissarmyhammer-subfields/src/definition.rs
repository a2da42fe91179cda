//! Synthetic field definitions for subfields.
//!
//! A subfield is presented to host plugins as a standalone, single-value
//! field named `{parent}:{subfield}`. Both definition types are immutable
//! once built; a settings change produces a new definition under a new key.

use std::sync::Arc;

use serde_json::Value;

use crate::fingerprint::{Fingerprint, Fingerprintable, KeyPart};
use crate::merge::merge_deep;
use crate::types::{CompositeFieldStorage, Settings};

/// Separates the parent field name from the subfield id in synthetic names.
pub const NAME_SEPARATOR: char = ':';

/// Subfields never repeat on their own; repetition belongs to the parent.
pub const SUBFIELD_CARDINALITY: usize = 1;

/// Storage-level definition of a subfield, inheriting from its parent storage.
#[derive(Debug, Clone, PartialEq)]
pub struct SubfieldStorageDefinition {
    key: Fingerprint,
    name: String,
    base_type: String,
    field_type: String,
    label: String,
    settings: Settings,
    constraints: Settings,
    custom_storage: bool,
    description: Option<String>,
    provider: String,
    queryable: bool,
    revisionable: bool,
    translatable: bool,
    target_entity_type: String,
}

impl SubfieldStorageDefinition {
    /// Build from the parent storage. `base_type` is the preset-expanded type id and
    /// `field_type` the id the registry should instantiate (possibly an override).
    pub(crate) fn from_parent(
        key: Fingerprint,
        parent: &CompositeFieldStorage,
        subfield: &str,
        base_type: String,
        field_type: String,
        label: String,
        settings: Settings,
    ) -> Self {
        Self {
            key,
            name: synthetic_name(&parent.name, subfield),
            base_type,
            field_type,
            label,
            settings,
            constraints: parent.constraints.clone(),
            custom_storage: parent.custom_storage,
            description: parent.description.clone(),
            provider: parent.provider.clone(),
            queryable: parent.queryable,
            revisionable: parent.revisionable,
            translatable: parent.translatable,
            target_entity_type: parent.target_entity_type.clone(),
        }
    }

    pub fn key(&self) -> &Fingerprint {
        &self.key
    }

    /// The synthetic `{parent}:{subfield}` name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subfield(&self) -> &str {
        split_name(&self.name).1
    }

    pub fn parent_field(&self) -> &str {
        split_name(&self.name).0
    }

    /// The type id plugins are instantiated with.
    pub fn field_type(&self) -> &str {
        &self.field_type
    }

    /// The declared type id, before any override.
    pub fn base_type(&self) -> &str {
        &self.base_type
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn setting(&self, name: &str) -> Option<&Value> {
        self.settings.get(name)
    }

    pub fn cardinality(&self) -> usize {
        SUBFIELD_CARDINALITY
    }

    pub fn constraints(&self) -> &Settings {
        &self.constraints
    }

    pub fn has_custom_storage(&self) -> bool {
        self.custom_storage
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn is_queryable(&self) -> bool {
        self.queryable
    }

    pub fn is_revisionable(&self) -> bool {
        self.revisionable
    }

    pub fn is_translatable(&self) -> bool {
        self.translatable
    }

    pub fn target_entity_type(&self) -> &str {
        &self.target_entity_type
    }
}

/// Field-level definition of a subfield, wrapping its storage definition.
#[derive(Debug, Clone, PartialEq)]
pub struct SubfieldDefinition {
    key: Fingerprint,
    storage: Arc<SubfieldStorageDefinition>,
    bundle: Option<String>,
    required: bool,
    field_settings: Settings,
    settings: Settings,
}

impl SubfieldDefinition {
    pub(crate) fn new(
        key: Fingerprint,
        storage: Arc<SubfieldStorageDefinition>,
        bundle: Option<String>,
        required: bool,
        field_settings: Settings,
    ) -> Self {
        let settings = merge_deep(storage.settings(), &field_settings);
        Self {
            key,
            storage,
            bundle,
            required,
            field_settings,
            settings,
        }
    }

    /// Cache identity of this definition.
    pub fn key(&self) -> &Fingerprint {
        &self.key
    }

    pub fn storage_definition(&self) -> &Arc<SubfieldStorageDefinition> {
        &self.storage
    }

    pub fn name(&self) -> &str {
        self.storage.name()
    }

    pub fn subfield(&self) -> &str {
        self.storage.subfield()
    }

    pub fn parent_field(&self) -> &str {
        self.storage.parent_field()
    }

    pub fn field_type(&self) -> &str {
        self.storage.field_type()
    }

    pub fn base_type(&self) -> &str {
        self.storage.base_type()
    }

    pub fn label(&self) -> &str {
        self.storage.label()
    }

    pub fn bundle(&self) -> Option<&str> {
        self.bundle.as_deref()
    }

    pub fn target_entity_type(&self) -> &str {
        self.storage.target_entity_type()
    }

    pub fn cardinality(&self) -> usize {
        SUBFIELD_CARDINALITY
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Field-level settings only.
    pub fn field_settings(&self) -> &Settings {
        &self.field_settings
    }

    /// Storage settings overlaid with field settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn setting(&self, name: &str) -> Option<&Value> {
        self.settings.get(name)
    }

    /// Subfields are always display-configurable and never computed or read-only.
    pub fn is_display_configurable(&self) -> bool {
        true
    }

    pub fn is_computed(&self) -> bool {
        false
    }

    pub fn is_read_only(&self) -> bool {
        false
    }
}

impl Fingerprintable for SubfieldStorageDefinition {
    fn key_part(&self) -> KeyPart {
        self.key.key_part()
    }
}

impl Fingerprintable for SubfieldDefinition {
    fn key_part(&self) -> KeyPart {
        self.key.key_part()
    }
}

pub(crate) fn synthetic_name(parent: &str, subfield: &str) -> String {
    format!("{parent}{NAME_SEPARATOR}{subfield}")
}

fn split_name(name: &str) -> (&str, &str) {
    match name.split_once(NAME_SEPARATOR) {
        Some((parent, subfield)) => (parent, subfield),
        None => (name, name),
    }
}

//! Edit-session state forking for subfield settings forms.
//!
//! Host settings forms read their settings off "the field being edited". To
//! reuse them for a subfield, the session state is cloned and its edit target
//! is replaced by a copy carrying the subfield's settings. The child owns its
//! copy outright; nothing it does is visible to the parent.

use std::fmt;

use serde_json::Value;

use crate::definition::SubfieldDefinition;
use crate::error::{Result, SubfieldError};
use crate::types::Settings;

/// The field a settings form is editing.
pub trait EditTarget: fmt::Debug {
    fn field_settings(&self) -> &Settings;

    fn set_field_settings(&mut self, settings: Settings);

    fn storage_settings(&self) -> &Settings;

    fn set_storage_settings(&mut self, settings: Settings);

    /// An independent copy; mutations on it must not reach `self`.
    fn clone_target(&self) -> Box<dyn EditTarget>;
}

/// A plain edit target holding both settings layers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldEditTarget {
    pub field_name: String,
    pub field_settings: Settings,
    pub storage_settings: Settings,
}

impl EditTarget for FieldEditTarget {
    fn field_settings(&self) -> &Settings {
        &self.field_settings
    }

    fn set_field_settings(&mut self, settings: Settings) {
        self.field_settings = settings;
    }

    fn storage_settings(&self) -> &Settings {
        &self.storage_settings
    }

    fn set_storage_settings(&mut self, settings: Settings) {
        self.storage_settings = settings;
    }

    fn clone_target(&self) -> Box<dyn EditTarget> {
        Box::new(self.clone())
    }
}

/// State of one in-progress edit session.
#[derive(Debug, Default)]
pub struct FormState {
    values: Settings,
    storage: Settings,
    rebuild: bool,
    target: Option<Box<dyn EditTarget>>,
}

impl FormState {
    pub fn new(target: Box<dyn EditTarget>) -> Self {
        Self {
            target: Some(target),
            ..Self::default()
        }
    }

    pub fn target(&self) -> Option<&dyn EditTarget> {
        self.target.as_deref()
    }

    pub fn target_mut(&mut self) -> Option<&mut (dyn EditTarget + 'static)> {
        self.target.as_deref_mut()
    }

    pub fn set_target(&mut self, target: Box<dyn EditTarget>) {
        self.target = Some(target);
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set_value(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Arbitrary state kept across rebuilds.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.storage.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.storage.insert(key.into(), value);
    }

    pub fn rebuild(&self) -> bool {
        self.rebuild
    }

    pub fn set_rebuild(&mut self, rebuild: bool) {
        self.rebuild = rebuild;
    }

    /// Fork a child state whose edit target carries `definition`'s settings.
    pub fn fork_for(&self, definition: &SubfieldDefinition) -> Result<FormState> {
        let target = self.target.as_ref().ok_or(SubfieldError::MissingEditTarget)?;
        let mut forked = target.clone_target();
        forked.set_field_settings(definition.settings().clone());
        forked.set_storage_settings(definition.settings().clone());

        let mut child = self.clone();
        child.target = Some(forked);
        Ok(child)
    }
}

impl Clone for FormState {
    fn clone(&self) -> Self {
        Self {
            values: self.values.clone(),
            storage: self.storage.clone(),
            rebuild: self.rebuild,
            target: self.target.as_ref().map(|t| t.clone_target()),
        }
    }
}

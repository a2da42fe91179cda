//! Plugin interfaces the host's field-type ecosystem implements.
//!
//! The layer never implements a field type itself. It asks the host registries
//! for instances of these traits, bound to a synthesized [`SubfieldDefinition`],
//! and shares them through the session's memo tables.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::definition::SubfieldDefinition;
use crate::error::Result;
use crate::fingerprint::{Fingerprintable, KeyPart};
use crate::record::RecordRef;
use crate::types::{ConstraintSet, PropertyDefinition, Schema, Settings, SubfieldValue};

/// A shared, mutable storage plugin handle.
pub type SharedStorage = Rc<RefCell<Box<dyn StoragePlugin>>>;

/// A shared, mutable item-list handle.
pub type SharedItemList = Rc<RefCell<Box<dyn ItemList>>>;

/// A shared widget handle.
pub type SharedWidget = Rc<dyn WidgetPlugin>;

/// A shared formatter handle.
pub type SharedFormatter = Rc<dyn FormatterPlugin>;

/// The value container a field type supplies for one item.
pub trait StoragePlugin: fmt::Debug {
    fn definition(&self) -> &Arc<SubfieldDefinition>;

    /// Declared storage columns, in order.
    fn schema(&self) -> Schema;

    fn property_definitions(&self) -> Vec<PropertyDefinition>;

    fn default_field_settings(&self) -> Settings {
        Settings::new()
    }

    /// Property-level constraints, keyed by column then constraint name.
    fn constraints(&self) -> ConstraintSet {
        ConstraintSet::new()
    }

    fn value(&self) -> SubfieldValue;

    fn set_value(&mut self, value: SubfieldValue);

    fn is_empty(&self) -> bool;
}

/// An edit widget for one subfield.
pub trait WidgetPlugin: fmt::Debug {
    fn plugin_id(&self) -> &str;

    fn definition(&self) -> &Arc<SubfieldDefinition>;

    fn settings(&self) -> &Settings;

    /// Turn submitted widget values into values of the subfield's own shape.
    fn massage_values(&self, values: Vec<SubfieldValue>) -> Vec<SubfieldValue> {
        values
    }
}

/// A display formatter for one subfield.
pub trait FormatterPlugin: fmt::Debug {
    fn plugin_id(&self) -> &str;

    fn definition(&self) -> &Arc<SubfieldDefinition>;

    fn settings(&self) -> &Settings;

    fn view_mode(&self) -> &str;

    fn label(&self) -> &str;
}

/// What an item list is seeded with.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemSeed {
    /// No value at this delta.
    Empty,
    /// No value at this delta for a reference type; the list shapes the sentinel.
    NoTarget,
    Value(SubfieldValue),
}

impl ItemSeed {
    /// Seed from a converted value, substituting the empty sentinel for reference types.
    pub fn from_value(value: SubfieldValue, reference: bool) -> Self {
        match (value.is_empty(), reference) {
            (false, _) => ItemSeed::Value(value),
            (true, true) => ItemSeed::NoTarget,
            (true, false) => ItemSeed::Empty,
        }
    }
}

/// A live container holding one subfield's value for one record.
pub trait ItemList: fmt::Debug {
    fn definition(&self) -> &Arc<SubfieldDefinition>;

    fn name(&self) -> &str;

    /// The record this list is bound to.
    fn parent(&self) -> &RecordRef;

    fn set_value(&mut self, seed: ItemSeed);

    fn first(&self) -> Option<SubfieldValue>;

    fn is_empty(&self) -> bool {
        self.first().map_or(true, |v| v.is_empty())
    }

    fn pre_save(&mut self) -> Result<()> {
        Ok(())
    }

    /// Returns whether the list changed anything that needs resaving.
    fn post_save(&mut self, _update: bool) -> Result<bool> {
        Ok(false)
    }

    fn delete(&mut self) -> Result<()> {
        Ok(())
    }

    fn delete_revision(&mut self) -> Result<()> {
        Ok(())
    }
}

/// An item list contributes its first item's value.
impl Fingerprintable for dyn ItemList {
    fn key_part(&self) -> KeyPart {
        match self.first() {
            Some(value) => value.key_part(),
            None => KeyPart::Empty,
        }
    }
}

impl<T: Fingerprintable + ?Sized> Fingerprintable for RefCell<T> {
    fn key_part(&self) -> KeyPart {
        self.borrow().key_part()
    }
}

impl<T: Fingerprintable + ?Sized> Fingerprintable for Box<T> {
    fn key_part(&self) -> KeyPart {
        (**self).key_part()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn seed_uses_value_when_present() {
        let mut value = SubfieldValue::new();
        value.insert("value".into(), json!("Ada"));
        assert_eq!(
            ItemSeed::from_value(value.clone(), false),
            ItemSeed::Value(value)
        );
    }

    #[test]
    fn seed_sentinels_for_empty_values() {
        assert_eq!(ItemSeed::from_value(SubfieldValue::new(), false), ItemSeed::Empty);
        assert_eq!(ItemSeed::from_value(SubfieldValue::new(), true), ItemSeed::NoTarget);
    }
}

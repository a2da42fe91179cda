//! Capability interfaces onto the host's plugin managers.
//!
//! The session depends only on these traits; any field type the host can
//! instantiate by id can be wrapped as a subfield.

use std::sync::Arc;

use crate::definition::SubfieldDefinition;
use crate::error::Result;
use crate::plugin::{FormatterPlugin, ItemList, SharedItemList, StoragePlugin, WidgetPlugin};
use crate::record::RecordRef;
use crate::types::{FieldTypeDefinition, Settings};

/// Arguments for constructing a storage plugin.
#[derive(Debug, Clone)]
pub struct StorageArgs {
    pub definition: Arc<SubfieldDefinition>,
    pub name: String,
    /// Item list the plugin hangs off, when seeded.
    pub parent: Option<SharedItemList>,
}

/// Arguments for constructing an item list.
#[derive(Debug, Clone)]
pub struct ItemListArgs {
    pub definition: Arc<SubfieldDefinition>,
    /// The subfield id the list is named after.
    pub name: String,
    pub parent: RecordRef,
}

/// Arguments for constructing a widget.
#[derive(Debug, Clone)]
pub struct WidgetArgs {
    pub definition: Arc<SubfieldDefinition>,
    pub settings: Settings,
    pub third_party_settings: Settings,
}

/// Arguments for constructing a formatter.
#[derive(Debug, Clone)]
pub struct FormatterArgs {
    pub definition: Arc<SubfieldDefinition>,
    pub settings: Settings,
    pub label: String,
    pub view_mode: String,
    pub third_party_settings: Settings,
}

/// The host's field-type plugin manager.
pub trait FieldTypeRegistry {
    /// Declared metadata for a type; unknown ids are an error.
    fn definition(&self, type_id: &str) -> Result<FieldTypeDefinition>;

    fn has_definition(&self, type_id: &str) -> bool {
        self.definition(type_id).is_ok()
    }

    fn create_storage(&self, type_id: &str, args: StorageArgs) -> Result<Box<dyn StoragePlugin>>;

    /// Build the list implementation the type declares.
    fn create_item_list(&self, type_id: &str, args: ItemListArgs) -> Result<Box<dyn ItemList>>;
}

/// The host's widget plugin manager.
pub trait WidgetRegistry {
    fn create_widget(&self, widget_id: &str, args: WidgetArgs) -> Result<Box<dyn WidgetPlugin>>;
}

/// The host's formatter plugin manager.
pub trait FormatterRegistry {
    fn create_formatter(
        &self,
        formatter_id: &str,
        args: FormatterArgs,
    ) -> Result<Box<dyn FormatterPlugin>>;
}

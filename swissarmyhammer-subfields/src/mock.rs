//! In-memory host capabilities for tests and examples.
//!
//! Every registry counts its constructions so callers can observe how often
//! the session actually reaches the host.

use std::cell::{OnceCell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use serde_json::{json, Value};

use crate::definition::SubfieldDefinition;
use crate::error::{Result, SubfieldError};
use crate::plugin::{
    FormatterPlugin, ItemList, ItemSeed, SharedItemList, StoragePlugin, WidgetPlugin,
};
use crate::record::{Record, RecordRef};
use crate::registry::{
    FieldTypeRegistry, FormatterArgs, FormatterRegistry, ItemListArgs, StorageArgs, WidgetArgs,
    WidgetRegistry,
};
use crate::types::{
    ColumnSpec, CompositeValue, ConstraintSet, FieldTypeDefinition, PresetOption,
    PropertyDefinition, Schema, Settings, SubfieldValue,
};

/// A field type the mock registry can instantiate.
#[derive(Debug, Clone)]
pub struct MockType {
    pub definition: FieldTypeDefinition,
    pub schema: Schema,
    pub properties: Vec<PropertyDefinition>,
    pub default_field_settings: Settings,
}

impl MockType {
    pub fn new(id: &str, provider: &str, columns: &[(&str, &str)]) -> Self {
        Self {
            definition: FieldTypeDefinition {
                id: id.into(),
                label: id.into(),
                provider: provider.into(),
                list_class: "FieldItemList".into(),
                ..FieldTypeDefinition::default()
            },
            schema: Schema {
                columns: columns
                    .iter()
                    .map(|(name, ty)| {
                        let column = ColumnSpec {
                            not_null: true,
                            ..ColumnSpec::new(*ty)
                        };
                        (name.to_string(), column)
                    })
                    .collect(),
            },
            properties: columns
                .iter()
                .map(|(name, ty)| PropertyDefinition {
                    name: name.to_string(),
                    data_type: (*ty).into(),
                    required: true,
                    computed: false,
                })
                .collect(),
            default_field_settings: Settings::new(),
        }
    }

    pub fn plugins(mut self, widget: &str, formatter: &str) -> Self {
        self.definition.default_widget = widget.into();
        self.definition.default_formatter = formatter.into();
        self
    }

    pub fn storage_settings(mut self, settings: Value) -> Self {
        self.definition.default_storage_settings = as_settings(settings);
        self
    }

    pub fn field_settings(mut self, settings: Value) -> Self {
        self.default_field_settings = as_settings(settings);
        self
    }

    pub fn preset(mut self, key: &str, label: &str, settings: Value) -> Self {
        self.definition.preconfigured_options.insert(
            key.into(),
            PresetOption {
                label: label.into(),
                storage_settings: as_settings(settings),
            },
        );
        self
    }

    pub fn reference(mut self) -> Self {
        self.definition.reference = true;
        self
    }

    pub fn list_class(mut self, list_class: &str) -> Self {
        self.definition.list_class = list_class.into();
        self
    }

    pub fn computed(mut self, property: &str, data_type: &str) -> Self {
        self.properties.push(PropertyDefinition {
            name: property.into(),
            data_type: data_type.into(),
            required: false,
            computed: true,
        });
        self
    }
}

/// Field-type registry backed by a fixed set of [`MockType`]s.
#[derive(Debug, Default)]
pub struct MockFieldTypes {
    types: IndexMap<String, MockType>,
    storage_constructions: AtomicUsize,
    item_list_constructions: AtomicUsize,
    events: Arc<Mutex<Vec<String>>>,
}

impl MockFieldTypes {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the types the crate's tests rely on.
    pub fn standard() -> Self {
        Self::new()
            .with_type(
                MockType::new("string", "core", &[("value", "varchar")])
                    .plugins("string_textfield", "string")
                    .storage_settings(json!({"maxlength": 255, "is_ascii": false})),
            )
            .with_type(
                MockType::new("link", "link", &[("uri", "varchar"), ("title", "varchar")])
                    .plugins("link_default", "link")
                    .field_settings(json!({"title": 1, "link_type": 17})),
            )
            .with_type(
                MockType::new("text_long", "text", &[("value", "text"), ("format", "varchar")])
                    .plugins("text_textarea", "text_default")
                    .field_settings(json!({"allowed_formats": []})),
            )
            .with_type(
                MockType::new("boolean", "core", &[("value", "boolean")])
                    .plugins("boolean_checkbox", "boolean")
                    .field_settings(json!({"on_label": "On", "off_label": "Off"})),
            )
            .with_type(
                MockType::new("entity_reference", "core", &[("target_id", "integer")])
                    .plugins("entity_reference_autocomplete", "entity_reference_label")
                    .storage_settings(json!({"target_type": "node"}))
                    .computed("entity", "entity_reference")
                    .reference(),
            )
            .with_type(
                MockType::new(
                    "composite_entity_reference",
                    "swissarmyhammer_subfields",
                    &[("target_id", "integer")],
                )
                .plugins("entity_reference_autocomplete", "entity_reference_label")
                .storage_settings(json!({"target_type": "node"}))
                .computed("entity", "entity_reference")
                .list_class("CompositeEntityReferenceItemList")
                .reference(),
            )
            .with_type(
                MockType::new("list_string", "options", &[("value", "varchar")])
                    .plugins("options_select", "list_default")
                    .storage_settings(json!({"allowed_values": []}))
                    .preset("preset_a", "Preset A", json!({"allowed_values": ["a", "b"]})),
            )
    }

    pub fn with_type(mut self, mock: MockType) -> Self {
        self.types.insert(mock.definition.id.clone(), mock);
        self
    }

    pub fn storage_constructions(&self) -> usize {
        self.storage_constructions.load(Ordering::SeqCst)
    }

    pub fn item_list_constructions(&self) -> usize {
        self.item_list_constructions.load(Ordering::SeqCst)
    }

    /// Lifecycle calls made on item lists built by this registry, in order.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn get(&self, type_id: &str) -> Result<&MockType> {
        self.types
            .get(type_id)
            .ok_or_else(|| SubfieldError::UnknownFieldType {
                type_id: type_id.to_string(),
            })
    }
}

impl FieldTypeRegistry for MockFieldTypes {
    fn definition(&self, type_id: &str) -> Result<FieldTypeDefinition> {
        Ok(self.get(type_id)?.definition.clone())
    }

    fn has_definition(&self, type_id: &str) -> bool {
        self.types.contains_key(type_id)
    }

    fn create_storage(&self, type_id: &str, args: StorageArgs) -> Result<Box<dyn StoragePlugin>> {
        let mock = self.get(type_id)?;
        self.storage_constructions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockStorage {
            definition: args.definition,
            mock: mock.clone(),
            value: SubfieldValue::new(),
        }))
    }

    fn create_item_list(&self, type_id: &str, args: ItemListArgs) -> Result<Box<dyn ItemList>> {
        let mock = self.get(type_id)?;
        self.item_list_constructions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockItemList {
            definition: args.definition,
            name: args.name,
            parent: args.parent,
            main_column: mock.schema.first_column().unwrap_or("value").to_string(),
            seed: ItemSeed::Empty,
            events: Arc::clone(&self.events),
        }))
    }
}

/// Storage plugin produced by [`MockFieldTypes`].
#[derive(Debug)]
pub struct MockStorage {
    definition: Arc<SubfieldDefinition>,
    mock: MockType,
    value: SubfieldValue,
}

impl StoragePlugin for MockStorage {
    fn definition(&self) -> &Arc<SubfieldDefinition> {
        &self.definition
    }

    fn schema(&self) -> Schema {
        self.mock.schema.clone()
    }

    fn property_definitions(&self) -> Vec<PropertyDefinition> {
        self.mock.properties.clone()
    }

    fn default_field_settings(&self) -> Settings {
        self.mock.default_field_settings.clone()
    }

    fn constraints(&self) -> ConstraintSet {
        let mut constraints = ConstraintSet::new();
        if let Some(max) = self.definition.setting("maxlength") {
            if let Some(column) = self.mock.schema.first_column() {
                constraints
                    .entry(column.to_string())
                    .or_default()
                    .insert("Length".into(), json!({"max": max}));
            }
        }
        constraints
    }

    fn value(&self) -> SubfieldValue {
        self.value.clone()
    }

    fn set_value(&mut self, value: SubfieldValue) {
        self.value = value;
    }

    /// Empty when the main column is missing, null, or an empty string.
    fn is_empty(&self) -> bool {
        let main = self.mock.schema.first_column().unwrap_or("value");
        match self.value.get(main) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        }
    }
}

/// Item list produced by [`MockFieldTypes`].
#[derive(Debug)]
pub struct MockItemList {
    definition: Arc<SubfieldDefinition>,
    name: String,
    parent: RecordRef,
    main_column: String,
    seed: ItemSeed,
    events: Arc<Mutex<Vec<String>>>,
}

impl MockItemList {
    fn record(&self, event: &str) {
        let shadow = if self.parent.original { "~original" } else { "" };
        let entry = format!(
            "{event}:{}:{}/{}{shadow}",
            self.definition.name(),
            self.parent.entity_type,
            self.parent.id.as_deref().unwrap_or("new"),
        );
        if let Ok(mut events) = self.events.lock() {
            events.push(entry);
        }
    }
}

impl ItemList for MockItemList {
    fn definition(&self) -> &Arc<SubfieldDefinition> {
        &self.definition
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn parent(&self) -> &RecordRef {
        &self.parent
    }

    fn set_value(&mut self, seed: ItemSeed) {
        self.seed = seed;
    }

    fn first(&self) -> Option<SubfieldValue> {
        match &self.seed {
            ItemSeed::Empty => None,
            ItemSeed::NoTarget => {
                let mut value = SubfieldValue::new();
                value.insert(self.main_column.clone(), Value::Null);
                Some(value)
            }
            ItemSeed::Value(value) => Some(value.clone()),
        }
    }

    fn is_empty(&self) -> bool {
        match &self.seed {
            ItemSeed::Value(value) => value
                .values()
                .all(|v| v.is_null() || v.as_str() == Some("")),
            _ => true,
        }
    }

    fn pre_save(&mut self) -> Result<()> {
        self.record("pre_save");
        Ok(())
    }

    fn post_save(&mut self, update: bool) -> Result<bool> {
        self.record(if update { "post_update" } else { "post_insert" });
        Ok(false)
    }

    fn delete(&mut self) -> Result<()> {
        self.record("delete");
        Ok(())
    }

    fn delete_revision(&mut self) -> Result<()> {
        self.record("delete_revision");
        Ok(())
    }
}

/// A widget or formatter built by the mock registries.
#[derive(Debug)]
pub struct MockPlugin {
    plugin_id: String,
    definition: Arc<SubfieldDefinition>,
    settings: Settings,
    view_mode: String,
    label: String,
}

impl WidgetPlugin for MockPlugin {
    fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    fn definition(&self) -> &Arc<SubfieldDefinition> {
        &self.definition
    }

    fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Checkboxes submit booleans; the stored shape is 0/1.
    fn massage_values(&self, values: Vec<SubfieldValue>) -> Vec<SubfieldValue> {
        if self.plugin_id != "boolean_checkbox" {
            return values;
        }
        values
            .into_iter()
            .map(|value| {
                value
                    .into_iter()
                    .map(|(k, v)| match v {
                        Value::Bool(b) => (k, json!(u8::from(b))),
                        other => (k, other),
                    })
                    .collect()
            })
            .collect()
    }
}

impl FormatterPlugin for MockPlugin {
    fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    fn definition(&self) -> &Arc<SubfieldDefinition> {
        &self.definition
    }

    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn view_mode(&self) -> &str {
        &self.view_mode
    }

    fn label(&self) -> &str {
        &self.label
    }
}

const WIDGET_IDS: &[&str] = &[
    "string_textfield",
    "link_default",
    "text_textarea",
    "boolean_checkbox",
    "entity_reference_autocomplete",
    "options_select",
    "options_buttons",
];

const FORMATTER_IDS: &[&str] = &[
    "string",
    "link",
    "text_default",
    "boolean",
    "entity_reference_label",
    "list_default",
    "list_key",
];

/// Widget registry accepting a fixed set of ids.
#[derive(Debug, Default)]
pub struct MockWidgets {
    constructions: AtomicUsize,
}

impl MockWidgets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }
}

impl WidgetRegistry for MockWidgets {
    fn create_widget(&self, widget_id: &str, args: WidgetArgs) -> Result<Box<dyn WidgetPlugin>> {
        if !WIDGET_IDS.contains(&widget_id) {
            return Err(SubfieldError::UnknownWidget {
                widget_id: widget_id.to_string(),
            });
        }
        self.constructions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockPlugin {
            plugin_id: widget_id.to_string(),
            definition: args.definition,
            settings: args.settings,
            view_mode: String::new(),
            label: String::new(),
        }))
    }
}

/// Formatter registry accepting a fixed set of ids.
#[derive(Debug, Default)]
pub struct MockFormatters {
    constructions: AtomicUsize,
}

impl MockFormatters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }
}

impl FormatterRegistry for MockFormatters {
    fn create_formatter(
        &self,
        formatter_id: &str,
        args: FormatterArgs,
    ) -> Result<Box<dyn FormatterPlugin>> {
        if !FORMATTER_IDS.contains(&formatter_id) {
            return Err(SubfieldError::UnknownFormatter {
                formatter_id: formatter_id.to_string(),
            });
        }
        self.constructions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockPlugin {
            plugin_id: formatter_id.to_string(),
            definition: args.definition,
            settings: args.settings,
            view_mode: args.view_mode,
            label: args.label,
        }))
    }
}

/// A record holding composite rows in memory.
#[derive(Debug)]
pub struct MockRecord {
    entity_type: String,
    id: Option<String>,
    revision_id: Option<String>,
    uuid: Option<String>,
    shadow: bool,
    fields: RefCell<IndexMap<String, Vec<CompositeValue>>>,
    original: OnceCell<Box<MockRecord>>,
    attached: RefCell<Vec<(String, usize, SharedItemList)>>,
}

impl MockRecord {
    pub fn new(entity_type: &str, id: &str) -> Self {
        Self::build(entity_type, Some(id.to_string()), None)
    }

    /// A record that has not been saved yet.
    pub fn unsaved(entity_type: &str, uuid: &str) -> Self {
        Self::build(entity_type, None, Some(uuid.to_string()))
    }

    fn build(entity_type: &str, id: Option<String>, uuid: Option<String>) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            id,
            revision_id: None,
            uuid,
            shadow: false,
            fields: RefCell::new(IndexMap::new()),
            original: OnceCell::new(),
            attached: RefCell::new(Vec::new()),
        }
    }

    pub fn with_revision(mut self, revision_id: &str) -> Self {
        self.revision_id = Some(revision_id.to_string());
        self
    }

    /// Append a row at the next delta of `field`.
    pub fn push_row(&self, field: &str, row: CompositeValue) {
        self.fields
            .borrow_mut()
            .entry(field.to_string())
            .or_default()
            .push(row);
    }

    /// Like [`push_row`](Self::push_row), from a JSON object literal.
    pub fn push_json(&self, field: &str, row: Value) {
        self.push_row(field, as_settings(row));
    }

    /// Install the pre-change shadow copy. Only the first call takes effect.
    pub fn set_original(&self, mut original: MockRecord) {
        original.shadow = true;
        let _ = self.original.set(Box::new(original));
    }

    pub fn original_record(&self) -> Option<&MockRecord> {
        self.original.get().map(|r| &**r)
    }

    /// The item list attached for `subfield_name` at `delta`, if any.
    pub fn attached(&self, subfield_name: &str, delta: usize) -> Option<SharedItemList> {
        self.attached
            .borrow()
            .iter()
            .rev()
            .find(|(name, d, _)| name == subfield_name && *d == delta)
            .map(|(_, _, items)| Rc::clone(items))
    }

    pub fn attached_count(&self) -> usize {
        self.attached.borrow().len()
    }
}

impl Record for MockRecord {
    fn entity_type_id(&self) -> &str {
        &self.entity_type
    }

    fn id(&self) -> Option<String> {
        self.id.clone()
    }

    fn revision_id(&self) -> Option<String> {
        self.revision_id.clone()
    }

    fn uuid(&self) -> Option<String> {
        self.uuid.clone()
    }

    fn field_value(&self, field: &str, delta: usize) -> Option<CompositeValue> {
        self.fields
            .borrow()
            .get(field)
            .and_then(|rows| rows.get(delta))
            .cloned()
    }

    fn field_len(&self, field: &str) -> usize {
        self.fields.borrow().get(field).map_or(0, Vec::len)
    }

    fn original(&self) -> Option<&dyn Record> {
        self.original.get().map(|r| &**r as &dyn Record)
    }

    fn is_original(&self) -> bool {
        self.shadow
    }

    fn attach_subfield_items(&self, subfield_name: &str, delta: usize, items: SharedItemList) {
        self.attached
            .borrow_mut()
            .push((subfield_name.to_string(), delta, items));
    }
}

fn as_settings(value: Value) -> Settings {
    match value {
        Value::Object(map) => map,
        _ => Settings::new(),
    }
}

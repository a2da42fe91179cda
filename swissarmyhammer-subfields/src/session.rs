//! The per-request arena that synthesizes, resolves, and memoizes subfields.
//!
//! Every resolver computes a [`Fingerprint`] over its inputs and returns the
//! cached instance when one exists, so fingerprint-equal requests construct
//! at most once per session. Failed constructions are never cached.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::config::SubfieldsConfig;
use crate::definition::{SubfieldDefinition, SubfieldStorageDefinition};
use crate::error::{Result, SubfieldError};
use crate::fingerprint::{Fingerprint, KeyBuilder};
use crate::form_state::FormState;
use crate::mapper;
use crate::merge::{merge_deep, resolve_storage_settings};
use crate::plugin::{ItemSeed, SharedFormatter, SharedItemList, SharedStorage, SharedWidget};
use crate::preset;
use crate::record::{ExplicitValues, Record};
use crate::registry::{
    FieldTypeRegistry, FormatterArgs, FormatterRegistry, ItemListArgs, StorageArgs, WidgetArgs,
    WidgetRegistry,
};
use crate::types::{
    CompositeFieldConfig, CompositeFieldStorage, CompositeValue, Schema, Settings,
    SubfieldFieldConfig, SubfieldSpec, SubfieldValue,
};

/// Sizes of the session's memo tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub storage_definitions: usize,
    pub definitions: usize,
    pub storages: usize,
    pub widgets: usize,
    pub formatters: usize,
    pub item_lists: usize,
}

/// Builder for [`SubfieldSession`].
pub struct SubfieldSessionBuilder {
    field_types: Arc<dyn FieldTypeRegistry>,
    widgets: Option<Arc<dyn WidgetRegistry>>,
    formatters: Option<Arc<dyn FormatterRegistry>>,
    config: SubfieldsConfig,
}

impl SubfieldSessionBuilder {
    pub fn widgets(mut self, widgets: Arc<dyn WidgetRegistry>) -> Self {
        self.widgets = Some(widgets);
        self
    }

    pub fn formatters(mut self, formatters: Arc<dyn FormatterRegistry>) -> Self {
        self.formatters = Some(formatters);
        self
    }

    pub fn config(mut self, config: SubfieldsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> SubfieldSession {
        SubfieldSession {
            field_types: self.field_types,
            widget_registry: self.widgets,
            formatter_registry: self.formatters,
            config: self.config,
            storage_definitions: HashMap::new(),
            definitions: HashMap::new(),
            storages: HashMap::new(),
            widgets: HashMap::new(),
            formatters: HashMap::new(),
            item_lists: HashMap::new(),
        }
    }
}

/// Owns the memo tables for one request.
///
/// Sessions are single-threaded; create one per request and drop it (or call
/// [`clear`](Self::clear)) when the request ends.
pub struct SubfieldSession {
    field_types: Arc<dyn FieldTypeRegistry>,
    widget_registry: Option<Arc<dyn WidgetRegistry>>,
    formatter_registry: Option<Arc<dyn FormatterRegistry>>,
    config: SubfieldsConfig,
    storage_definitions: HashMap<Fingerprint, Arc<SubfieldStorageDefinition>>,
    definitions: HashMap<Fingerprint, Arc<SubfieldDefinition>>,
    storages: HashMap<Fingerprint, SharedStorage>,
    widgets: HashMap<Fingerprint, SharedWidget>,
    formatters: HashMap<Fingerprint, SharedFormatter>,
    item_lists: HashMap<Fingerprint, SharedItemList>,
}

impl fmt::Debug for SubfieldSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubfieldSession")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl SubfieldSession {
    pub fn builder(field_types: Arc<dyn FieldTypeRegistry>) -> SubfieldSessionBuilder {
        SubfieldSessionBuilder {
            field_types,
            widgets: None,
            formatters: None,
            config: SubfieldsConfig::default(),
        }
    }

    pub fn config(&self) -> &SubfieldsConfig {
        &self.config
    }

    pub fn field_types(&self) -> &Arc<dyn FieldTypeRegistry> {
        &self.field_types
    }

    /// Synthesize (or fetch) the storage-level definition of `subfield`.
    pub fn get_subfield_storage_definition(
        &mut self,
        storage: &CompositeFieldStorage,
        spec: &SubfieldSpec,
        subfield: &str,
    ) -> Result<Arc<SubfieldStorageDefinition>> {
        let key = KeyBuilder::new()
            .with("storage", storage)
            .with("spec", spec)
            .with("subfield", subfield)
            .finish();
        if let Some(existing) = self.storage_definitions.get(&key) {
            trace!(key = %key, subfield, "storage definition cache hit");
            return Ok(Arc::clone(existing));
        }

        let expanded = preset::expand(
            self.field_types.as_ref(),
            &spec.type_,
            &self.config.preset_prefix,
        )?;
        let settings = resolve_storage_settings(
            &expanded.default_settings,
            expanded.preset_settings.as_ref(),
            &spec.settings,
        );
        let field_type = self.override_type(&expanded.base_type);
        let label = if spec.label.is_empty() {
            subfield.to_string()
        } else {
            spec.label.clone()
        };

        debug!(
            key = %key,
            field = %storage.name,
            subfield,
            field_type = %field_type,
            "synthesized subfield storage definition"
        );
        let definition = Arc::new(SubfieldStorageDefinition::from_parent(
            key.clone(),
            storage,
            subfield,
            expanded.base_type,
            field_type,
            label,
            settings,
        ));
        self.storage_definitions.insert(key, Arc::clone(&definition));
        Ok(definition)
    }

    /// Synthesize (or fetch) the field-level definition of `subfield`.
    ///
    /// `field` supplies the bundle and the subfield's field-level settings;
    /// without it the configured `fields_default` applies alone.
    pub fn get_subfield_definition(
        &mut self,
        storage: &CompositeFieldStorage,
        spec: &SubfieldSpec,
        subfield: &str,
        field: Option<&CompositeFieldConfig>,
    ) -> Result<Arc<SubfieldDefinition>> {
        let field_config = self.effective_field_config(field.and_then(|f| f.fields.get(subfield)));
        let bundle = field.map(|f| f.bundle.clone());
        let key = KeyBuilder::new()
            .with("storage", storage)
            .with("spec", spec)
            .with("subfield", subfield)
            .with("field", &field_config)
            .with("bundle", &bundle)
            .finish();
        if let Some(existing) = self.definitions.get(&key) {
            trace!(key = %key, subfield, "definition cache hit");
            return Ok(Arc::clone(existing));
        }

        let storage_definition = self.get_subfield_storage_definition(storage, spec, subfield)?;
        debug!(key = %key, field = %storage.name, subfield, "synthesized subfield definition");
        let definition = Arc::new(SubfieldDefinition::new(
            key.clone(),
            storage_definition,
            bundle,
            field_config.is_required(),
            field_config.settings,
        ));
        self.definitions.insert(key, Arc::clone(&definition));
        Ok(definition)
    }

    /// Resolve the storage plugin for `definition`, optionally seeded from an item list.
    ///
    /// A seeded and an unseeded resolution are distinct entries.
    pub fn get_subfield_storage(
        &mut self,
        definition: &Arc<SubfieldDefinition>,
        seed: Option<&SharedItemList>,
    ) -> Result<SharedStorage> {
        let key = KeyBuilder::new()
            .with("definition", definition.as_ref())
            .with("seeded", &seed.is_some())
            .with("seed", &seed)
            .finish();
        if let Some(existing) = self.storages.get(&key) {
            trace!(key = %key, subfield = definition.subfield(), "storage cache hit");
            return Ok(Rc::clone(existing));
        }

        let args = StorageArgs {
            definition: Arc::clone(definition),
            name: definition.subfield().to_string(),
            parent: seed.cloned(),
        };
        let mut plugin = self.field_types.create_storage(definition.field_type(), args)?;
        if let Some(value) = seed.and_then(|items| items.borrow().first()) {
            if !value.is_empty() {
                plugin.set_value(value);
            }
        }
        debug!(
            key = %key,
            subfield = definition.subfield(),
            field_type = definition.field_type(),
            "constructed subfield storage plugin"
        );
        let shared = Rc::new(RefCell::new(plugin));
        self.storages.insert(key, Rc::clone(&shared));
        Ok(shared)
    }

    /// The subfield's declared storage schema, read off its unseeded storage plugin.
    pub fn schema_for(&mut self, definition: &Arc<SubfieldDefinition>) -> Result<Schema> {
        let storage = self.get_subfield_storage(definition, None)?;
        let schema = storage.borrow().schema();
        Ok(schema)
    }

    pub fn get_subfield_widget(
        &mut self,
        definition: &Arc<SubfieldDefinition>,
        widget_id: &str,
        settings: &Settings,
    ) -> Result<SharedWidget> {
        let key = KeyBuilder::new()
            .with("definition", definition.as_ref())
            .with("widget", widget_id)
            .with("settings", settings)
            .finish();
        if let Some(existing) = self.widgets.get(&key) {
            trace!(key = %key, widget_id, "widget cache hit");
            return Ok(Rc::clone(existing));
        }

        let registry = self
            .widget_registry
            .as_ref()
            .ok_or_else(|| SubfieldError::UnknownWidget {
                widget_id: widget_id.to_string(),
            })?;
        let args = WidgetArgs {
            definition: Arc::clone(definition),
            settings: settings.clone(),
            third_party_settings: Settings::new(),
        };
        let widget: SharedWidget = Rc::from(registry.create_widget(widget_id, args)?);
        debug!(
            key = %key,
            subfield = definition.subfield(),
            widget_id,
            "constructed subfield widget"
        );
        self.widgets.insert(key, Rc::clone(&widget));
        Ok(widget)
    }

    /// The widget id the subfield's type declares as its default.
    pub fn get_subfield_default_widget(&self, definition: &SubfieldDefinition) -> Result<String> {
        Ok(self.field_types.definition(definition.field_type())?.default_widget)
    }

    pub fn get_subfield_formatter(
        &mut self,
        definition: &Arc<SubfieldDefinition>,
        formatter_id: &str,
        settings: &Settings,
        view_mode: &str,
        label: &str,
    ) -> Result<SharedFormatter> {
        let key = KeyBuilder::new()
            .with("definition", definition.as_ref())
            .with("formatter", formatter_id)
            .with("settings", settings)
            .with("view_mode", view_mode)
            .with("label", label)
            .finish();
        if let Some(existing) = self.formatters.get(&key) {
            trace!(key = %key, formatter_id, "formatter cache hit");
            return Ok(Rc::clone(existing));
        }

        let registry = self
            .formatter_registry
            .as_ref()
            .ok_or_else(|| SubfieldError::UnknownFormatter {
                formatter_id: formatter_id.to_string(),
            })?;
        let args = FormatterArgs {
            definition: Arc::clone(definition),
            settings: settings.clone(),
            label: label.to_string(),
            view_mode: view_mode.to_string(),
            third_party_settings: Settings::new(),
        };
        let formatter: SharedFormatter = Rc::from(registry.create_formatter(formatter_id, args)?);
        debug!(
            key = %key,
            subfield = definition.subfield(),
            formatter_id,
            view_mode,
            "constructed subfield formatter"
        );
        self.formatters.insert(key, Rc::clone(&formatter));
        Ok(formatter)
    }

    /// The formatter id the subfield's type declares as its default.
    pub fn get_subfield_default_formatter(
        &self,
        definition: &SubfieldDefinition,
    ) -> Result<String> {
        Ok(self
            .field_types
            .definition(definition.field_type())?
            .default_formatter)
    }

    /// Materialize the subfield's item list for `record` at `delta`.
    ///
    /// Without explicit values the row is read from the record; a missing row
    /// materializes as the type's empty value. When the record carries a
    /// pre-change shadow, the same subfield is materialized against it and
    /// attached to the shadow.
    pub fn get_subfield_item_list(
        &mut self,
        definition: &Arc<SubfieldDefinition>,
        record: &dyn Record,
        delta: usize,
        explicit: Option<&ExplicitValues>,
    ) -> Result<SharedItemList> {
        let key = KeyBuilder::new()
            .with("definition", definition.as_ref())
            .with("record", record)
            .with("original", &record.is_original())
            .with("delta", &delta)
            .with("explicit_given", &explicit.is_some())
            .with("explicit", &explicit)
            .finish();
        if let Some(existing) = self.item_lists.get(&key) {
            trace!(key = %key, subfield = definition.subfield(), delta, "item list cache hit");
            return Ok(Rc::clone(existing));
        }

        let row = match explicit {
            Some(ExplicitValues::Row(row)) => row.clone(),
            _ => record
                .field_value(definition.parent_field(), delta)
                .unwrap_or_default(),
        };
        let value = self.convert_value_to_subfield_value(definition, &row)?;
        let reference = self.field_types.definition(definition.field_type())?.reference;

        let args = ItemListArgs {
            definition: Arc::clone(definition),
            name: definition.subfield().to_string(),
            parent: record.typed_data(),
        };
        let mut items = self
            .field_types
            .create_item_list(definition.field_type(), args)?;
        items.set_value(ItemSeed::from_value(value, reference));
        let items = Rc::new(RefCell::new(items));

        if let Some(original) = record.original() {
            let shadow = self.get_subfield_item_list(
                definition,
                original,
                delta,
                Some(&ExplicitValues::Original),
            )?;
            original.attach_subfield_items(definition.name(), delta, shadow);
        }

        debug!(
            key = %key,
            subfield = definition.subfield(),
            delta,
            original = record.is_original(),
            "materialized subfield item list"
        );
        self.item_lists.insert(key, Rc::clone(&items));
        Ok(items)
    }

    /// Extract the subfield's native value from a composite row.
    pub fn convert_value_to_subfield_value(
        &mut self,
        definition: &Arc<SubfieldDefinition>,
        row: &CompositeValue,
    ) -> Result<SubfieldValue> {
        let schema = self.schema_for(definition)?;
        Ok(mapper::to_subfield_value(definition.subfield(), &schema, row))
    }

    /// Project a subfield-native value into its composite columns.
    pub fn convert_subfield_value_to_value(
        &mut self,
        definition: &Arc<SubfieldDefinition>,
        value: &SubfieldValue,
    ) -> Result<CompositeValue> {
        let schema = self.schema_for(definition)?;
        Ok(mapper::to_composite_fragment(definition.subfield(), &schema, value))
    }

    /// Fork `state` so its edit target carries the subfield's settings.
    pub fn get_subfield_form_state(
        &self,
        definition: &SubfieldDefinition,
        state: &FormState,
    ) -> Result<FormState> {
        state.fork_for(definition)
    }

    /// Drop every memoized instance.
    pub fn clear(&mut self) {
        debug!(stats = ?self.stats(), "clearing subfield session");
        self.storage_definitions.clear();
        self.definitions.clear();
        self.storages.clear();
        self.widgets.clear();
        self.formatters.clear();
        self.item_lists.clear();
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            storage_definitions: self.storage_definitions.len(),
            definitions: self.definitions.len(),
            storages: self.storages.len(),
            widgets: self.widgets.len(),
            formatters: self.formatters.len(),
            item_lists: self.item_lists.len(),
        }
    }

    /// `fields_default` overlaid with an explicit per-subfield field config.
    pub(crate) fn effective_field_config(
        &self,
        explicit: Option<&SubfieldFieldConfig>,
    ) -> SubfieldFieldConfig {
        let defaults = self.config.fields_default.to_settings();
        match explicit {
            Some(explicit) => {
                SubfieldFieldConfig::from_settings(&merge_deep(&defaults, &explicit.to_settings()))
            }
            None => self.config.fields_default.clone(),
        }
    }

    fn override_type(&self, base_type: &str) -> String {
        let prefix = &self.config.type_override_prefix;
        if !prefix.is_empty() {
            let candidate = format!("{prefix}{base_type}");
            if self.field_types.has_definition(&candidate) {
                return candidate;
            }
        }
        base_type.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockFieldTypes, MockFormatters, MockRecord, MockWidgets};
    use serde_json::{json, Value};

    fn settings(value: Value) -> Settings {
        value.as_object().cloned().unwrap_or_default()
    }

    fn profile() -> CompositeFieldStorage {
        CompositeFieldStorage::new("profile", "node").with_subfields([
            ("name", SubfieldSpec::new("string", "Name")),
            ("homepage", SubfieldSpec::new("link", "Homepage")),
        ])
    }

    struct Fixture {
        types: Arc<MockFieldTypes>,
        widgets: Arc<MockWidgets>,
        formatters: Arc<MockFormatters>,
        session: SubfieldSession,
    }

    fn fixture() -> Fixture {
        let types = Arc::new(MockFieldTypes::standard());
        let widgets = Arc::new(MockWidgets::new());
        let formatters = Arc::new(MockFormatters::new());
        let session = SubfieldSession::builder(types.clone())
            .widgets(widgets.clone())
            .formatters(formatters.clone())
            .build();
        Fixture {
            types,
            widgets,
            formatters,
            session,
        }
    }

    fn definition(session: &mut SubfieldSession, subfield: &str) -> Arc<SubfieldDefinition> {
        let storage = profile();
        let spec = storage.subfield(subfield).unwrap().clone();
        session
            .get_subfield_definition(&storage, &spec, subfield, None)
            .unwrap()
    }

    #[test]
    fn definition_is_memoized() {
        let mut f = fixture();
        let a = definition(&mut f.session, "name");
        let b = definition(&mut f.session, "name");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(f.session.stats().definitions, 1);
        assert_eq!(f.session.stats().storage_definitions, 1);
    }

    #[test]
    fn structurally_equal_specs_share_an_entry() {
        let mut f = fixture();
        let storage = profile();
        let a = SubfieldSpec::new("string", "Name")
            .with_settings(settings(json!({"maxlength": 10, "case": "upper"})));
        let b = SubfieldSpec::new("string", "Name")
            .with_settings(settings(json!({"case": "upper", "maxlength": 10})));
        let da = f
            .session
            .get_subfield_definition(&storage, &a, "name", None)
            .unwrap();
        let db = f
            .session
            .get_subfield_definition(&storage, &b, "name", None)
            .unwrap();
        assert!(Arc::ptr_eq(&da, &db));
    }

    #[test]
    fn settings_change_yields_new_definition() {
        let mut f = fixture();
        let storage = profile();
        let a = SubfieldSpec::new("string", "Name")
            .with_settings(settings(json!({"maxlength": 10})));
        let b = SubfieldSpec::new("string", "Name")
            .with_settings(settings(json!({"maxlength": 11})));
        let da = f
            .session
            .get_subfield_definition(&storage, &a, "name", None)
            .unwrap();
        let db = f
            .session
            .get_subfield_definition(&storage, &b, "name", None)
            .unwrap();
        assert_ne!(da.key(), db.key());
        assert_eq!(da.setting("maxlength"), Some(&json!(10)));
        assert_eq!(db.setting("maxlength"), Some(&json!(11)));
    }

    #[test]
    fn type_defaults_fill_unset_settings() {
        let mut f = fixture();
        let def = definition(&mut f.session, "name");
        assert_eq!(def.setting("maxlength"), Some(&json!(255)));
        assert_eq!(def.setting("is_ascii"), Some(&json!(false)));
        assert_eq!(def.name(), "profile:name");
        assert_eq!(def.label(), "Name");
        assert!(def.is_required());
    }

    #[test]
    fn empty_label_falls_back_to_subfield_id() {
        let mut f = fixture();
        let storage = profile();
        let spec = SubfieldSpec::new("string", "");
        let def = f
            .session
            .get_subfield_definition(&storage, &spec, "nick", None)
            .unwrap();
        assert_eq!(def.label(), "nick");
    }

    #[test]
    fn field_config_sets_bundle_and_requiredness() {
        let mut f = fixture();
        let storage = profile();
        let field = CompositeFieldConfig::new(&storage, "article").with_field(
            "name",
            SubfieldFieldConfig {
                required: Some(false),
                settings: settings(json!({"placeholder": "Your name"})),
            },
        );
        let spec = storage.subfield("name").unwrap().clone();
        let def = f
            .session
            .get_subfield_definition(&storage, &spec, "name", Some(&field))
            .unwrap();
        assert_eq!(def.bundle(), Some("article"));
        assert!(!def.is_required());
        assert_eq!(def.setting("placeholder"), Some(&json!("Your name")));
        assert_eq!(def.setting("maxlength"), Some(&json!(255)));

        let bare = definition(&mut f.session, "name");
        assert_ne!(bare.key(), def.key());
        // the storage-level definition is shared
        assert!(Arc::ptr_eq(bare.storage_definition(), def.storage_definition()));
    }

    #[test]
    fn override_type_keeps_base_type() {
        let mut f = fixture();
        let storage = profile();
        let spec = SubfieldSpec::new("entity_reference", "Author");
        let def = f
            .session
            .get_subfield_definition(&storage, &spec, "author", None)
            .unwrap();
        assert_eq!(def.base_type(), "entity_reference");
        assert_eq!(def.field_type(), "composite_entity_reference");
    }

    #[test]
    fn override_can_be_disabled() {
        let types = Arc::new(MockFieldTypes::standard());
        let config = SubfieldsConfig {
            type_override_prefix: String::new(),
            ..SubfieldsConfig::default()
        };
        let mut session = SubfieldSession::builder(types).config(config).build();
        let storage = profile();
        let spec = SubfieldSpec::new("entity_reference", "Author");
        let def = session
            .get_subfield_definition(&storage, &spec, "author", None)
            .unwrap();
        assert_eq!(def.field_type(), "entity_reference");
    }

    #[test]
    fn unknown_type_is_not_cached() {
        let mut f = fixture();
        let storage = profile();
        let spec = SubfieldSpec::new("geofield", "Where");
        for _ in 0..2 {
            let err = f
                .session
                .get_subfield_definition(&storage, &spec, "where", None)
                .unwrap_err();
            assert!(matches!(err, SubfieldError::UnknownFieldType { .. }));
        }
        assert_eq!(f.session.stats(), SessionStats::default());
    }

    #[test]
    fn storage_plugin_constructed_once() {
        let mut f = fixture();
        let def = definition(&mut f.session, "name");
        let a = f.session.get_subfield_storage(&def, None).unwrap();
        let b = f.session.get_subfield_storage(&def, None).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(f.types.storage_constructions(), 1);
    }

    #[test]
    fn seeded_storage_is_distinct_and_takes_first_value() {
        let mut f = fixture();
        let def = definition(&mut f.session, "name");
        let record = MockRecord::new("node", "1");
        record.push_json("profile", json!({"name_value": "Ada"}));
        let items = f
            .session
            .get_subfield_item_list(&def, &record, 0, None)
            .unwrap();

        let unseeded = f.session.get_subfield_storage(&def, None).unwrap();
        let seeded = f
            .session
            .get_subfield_storage(&def, Some(&items))
            .unwrap();
        assert!(!Rc::ptr_eq(&unseeded, &seeded));
        assert_eq!(seeded.borrow().value().get("value"), Some(&json!("Ada")));
        assert!(unseeded.borrow().value().is_empty());
        assert!(!seeded.borrow().is_empty());
    }

    #[test]
    fn widget_memoized_per_settings() {
        let mut f = fixture();
        let def = definition(&mut f.session, "name");
        let s = settings(json!({"size": 60}));
        let a = f
            .session
            .get_subfield_widget(&def, "string_textfield", &s)
            .unwrap();
        let b = f
            .session
            .get_subfield_widget(&def, "string_textfield", &s)
            .unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        let c = f
            .session
            .get_subfield_widget(&def, "string_textfield", &settings(json!({"size": 20})))
            .unwrap();
        assert!(!Rc::ptr_eq(&a, &c));
        assert_eq!(f.widgets.constructions(), 2);
        assert_eq!(a.plugin_id(), "string_textfield");
    }

    #[test]
    fn unknown_widget_fails_every_time() {
        let mut f = fixture();
        let def = definition(&mut f.session, "name");
        for _ in 0..2 {
            let err = f
                .session
                .get_subfield_widget(&def, "missing_widget", &Settings::new())
                .unwrap_err();
            assert!(matches!(err, SubfieldError::UnknownWidget { .. }));
        }
        assert_eq!(f.session.stats().widgets, 0);
    }

    #[test]
    fn missing_widget_registry_reports_unknown_widget() {
        let mut session = SubfieldSession::builder(Arc::new(MockFieldTypes::standard()))
            .build();
        let def = definition(&mut session, "name");
        assert!(matches!(
            session.get_subfield_widget(&def, "string_textfield", &Settings::new()),
            Err(SubfieldError::UnknownWidget { .. })
        ));
    }

    #[test]
    fn formatter_keyed_by_view_mode() {
        let mut f = fixture();
        let def = definition(&mut f.session, "homepage");
        let s = Settings::new();
        let full = f
            .session
            .get_subfield_formatter(&def, "link", &s, "full", "above")
            .unwrap();
        let again = f
            .session
            .get_subfield_formatter(&def, "link", &s, "full", "above")
            .unwrap();
        let teaser = f
            .session
            .get_subfield_formatter(&def, "link", &s, "teaser", "above")
            .unwrap();
        assert!(Rc::ptr_eq(&full, &again));
        assert!(!Rc::ptr_eq(&full, &teaser));
        assert_eq!(teaser.view_mode(), "teaser");
        assert_eq!(f.formatters.constructions(), 2);
    }

    #[test]
    fn default_plugin_ids_come_from_registry() {
        let mut f = fixture();
        let def = definition(&mut f.session, "homepage");
        assert_eq!(
            f.session.get_subfield_default_widget(&def).unwrap(),
            "link_default"
        );
        assert_eq!(f.session.get_subfield_default_formatter(&def).unwrap(), "link");
    }

    #[test]
    fn item_list_memoized_per_record_and_delta() {
        let mut f = fixture();
        let def = definition(&mut f.session, "name");
        let record = MockRecord::new("node", "1");
        record.push_json("profile", json!({"name_value": "Ada"}));
        record.push_json("profile", json!({"name_value": "Grace"}));

        let first = f
            .session
            .get_subfield_item_list(&def, &record, 0, None)
            .unwrap();
        let again = f
            .session
            .get_subfield_item_list(&def, &record, 0, None)
            .unwrap();
        let second = f
            .session
            .get_subfield_item_list(&def, &record, 1, None)
            .unwrap();
        assert!(Rc::ptr_eq(&first, &again));
        assert!(!Rc::ptr_eq(&first, &second));
        assert_eq!(
            second.borrow().first().unwrap().get("value"),
            Some(&json!("Grace"))
        );
        assert_eq!(f.types.item_list_constructions(), 2);
    }

    #[test]
    fn explicit_row_overrides_record() {
        let mut f = fixture();
        let def = definition(&mut f.session, "name");
        let record = MockRecord::new("node", "1");
        record.push_json("profile", json!({"name_value": "Ada"}));
        let row = settings(json!({"name_value": "Lin"}));
        let items = f
            .session
            .get_subfield_item_list(&def, &record, 0, Some(&ExplicitValues::Row(row)))
            .unwrap();
        assert_eq!(items.borrow().first().unwrap().get("value"), Some(&json!("Lin")));
    }

    #[test]
    fn empty_explicit_row_does_not_shadow_record_read() {
        let mut f = fixture();
        let def = definition(&mut f.session, "name");
        let record = MockRecord::new("node", "1");
        record.push_json("profile", json!({"name_value": "Ada"}));

        let explicit = ExplicitValues::Row(CompositeValue::new());
        let blank = f
            .session
            .get_subfield_item_list(&def, &record, 0, Some(&explicit))
            .unwrap();
        let stored = f
            .session
            .get_subfield_item_list(&def, &record, 0, None)
            .unwrap();
        assert!(!Rc::ptr_eq(&blank, &stored));
        assert!(blank.borrow().is_empty());
        assert_eq!(stored.borrow().first().unwrap().get("value"), Some(&json!("Ada")));
    }

    #[test]
    fn reference_types_use_no_target_sentinel() {
        let mut f = fixture();
        let storage = profile();
        let spec = SubfieldSpec::new("entity_reference", "Author");
        let def = f
            .session
            .get_subfield_definition(&storage, &spec, "author", None)
            .unwrap();
        let record = MockRecord::new("node", "1");
        let items = f
            .session
            .get_subfield_item_list(&def, &record, 0, None)
            .unwrap();
        let items = items.borrow();
        assert!(items.is_empty());
        assert_eq!(
            Value::Object(items.first().unwrap()),
            json!({"target_id": null})
        );
    }

    #[test]
    fn shadow_copy_receives_its_own_list() {
        let mut f = fixture();
        let def = definition(&mut f.session, "name");
        let record = MockRecord::new("node", "1");
        record.push_json("profile", json!({"name_value": "Ada (edited)"}));
        let original = MockRecord::new("node", "1");
        original.push_json("profile", json!({"name_value": "Ada"}));
        record.set_original(original);

        let items = f
            .session
            .get_subfield_item_list(&def, &record, 0, None)
            .unwrap();
        assert_eq!(
            items.borrow().first().unwrap().get("value"),
            Some(&json!("Ada (edited)"))
        );
        assert_eq!(f.session.stats().item_lists, 2);
        assert_eq!(f.types.item_list_constructions(), 2);
    }

    #[test]
    fn clear_discards_every_table() {
        let mut f = fixture();
        let def = definition(&mut f.session, "name");
        f.session.get_subfield_storage(&def, None).unwrap();
        assert_ne!(f.session.stats(), SessionStats::default());
        f.session.clear();
        assert_eq!(f.session.stats(), SessionStats::default());

        let again = definition(&mut f.session, "name");
        assert!(!Arc::ptr_eq(&def, &again));
        assert_eq!(def.key(), again.key());
    }
}

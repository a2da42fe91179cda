//! The composite field type's own operations, built on a [`SubfieldSession`].
//!
//! Schema, properties, validation constraints, emptiness, widget submission
//! handling, and save lifecycle are all derived by asking each subfield's
//! own plugins and re-keying the answers under `{subfield}_` prefixes.

use std::collections::BTreeSet;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::definition::SubfieldDefinition;
use crate::error::{Result, SubfieldError};
use crate::mapper::composite_column;
use crate::merge::merge_deep;
use crate::plugin::{SharedItemList, SharedWidget};
use crate::preset::TypeRef;
use crate::record::{ExplicitValues, Record};
use crate::session::SubfieldSession;
use crate::types::{
    truthy, CompositeFieldConfig, CompositeFieldStorage, CompositeValue, ConstraintSet,
    PropertyDefinition, Schema, Settings, SubfieldFieldConfig, SubfieldValue,
};

/// Message attached to the required check on boolean subfields.
pub const BOOLEAN_REQUIRED_MESSAGE: &str = "This value should not be blank.";

/// Plugin choice for one subfield in a form or view display.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SubfieldDisplay {
    /// Plugin id; the field type's default applies when unset.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(default)]
    pub settings: Settings,
}

/// Display configuration keyed by subfield id.
pub type DisplaySettings = IndexMap<String, SubfieldDisplay>;

/// Every subfield definition of `storage`, in subfield order.
pub fn subfield_definitions(
    session: &mut SubfieldSession,
    storage: &CompositeFieldStorage,
    field: Option<&CompositeFieldConfig>,
) -> Result<Vec<Arc<SubfieldDefinition>>> {
    storage
        .storage
        .iter()
        .map(|(subfield, spec)| session.get_subfield_definition(storage, spec, subfield, field))
        .collect()
}

/// The composite schema: each subfield's columns under its prefix, all nullable.
pub fn schema(session: &mut SubfieldSession, storage: &CompositeFieldStorage) -> Result<Schema> {
    let mut schema = Schema::default();
    for definition in subfield_definitions(session, storage, None)? {
        for (column, mut spec) in session.schema_for(&definition)?.columns {
            spec.not_null = false;
            schema
                .columns
                .insert(composite_column(definition.subfield(), &column), spec);
        }
    }
    Ok(schema)
}

/// Each subfield's property definitions under its prefix, none required.
pub fn property_definitions(
    session: &mut SubfieldSession,
    storage: &CompositeFieldStorage,
) -> Result<Vec<PropertyDefinition>> {
    let mut properties = Vec::new();
    for definition in subfield_definitions(session, storage, None)? {
        let plugin = session.get_subfield_storage(&definition, None)?;
        for mut property in plugin.borrow().property_definitions() {
            property.name = composite_column(definition.subfield(), &property.name);
            property.required = false;
            properties.push(property);
        }
    }
    Ok(properties)
}

/// Field-level config of every subfield with all defaults applied.
///
/// Precedence: explicit field config, then the subfield plugin's default
/// field settings, then the configured `fields_default`.
pub fn resolve_field_settings(
    session: &mut SubfieldSession,
    storage: &CompositeFieldStorage,
    field: &CompositeFieldConfig,
) -> Result<IndexMap<String, SubfieldFieldConfig>> {
    let defaults = session.config().fields_default.to_settings();
    let mut resolved = IndexMap::new();
    for definition in subfield_definitions(session, storage, None)? {
        let plugin = session.get_subfield_storage(&definition, None)?;
        let mut plugin_layer = Settings::new();
        plugin_layer.insert(
            "settings".into(),
            Value::Object(plugin.borrow().default_field_settings()),
        );
        let explicit = field
            .fields
            .get(definition.subfield())
            .map(SubfieldFieldConfig::to_settings)
            .unwrap_or_default();
        let merged = merge_deep(&merge_deep(&defaults, &plugin_layer), &explicit);
        resolved.insert(
            definition.subfield().to_string(),
            SubfieldFieldConfig::from_settings(&merged),
        );
    }
    Ok(resolved)
}

/// Validation constraints for the composite row, keyed by composite column.
///
/// Each subfield plugin's own property constraints are carried over. Required
/// subfields add `NotBlank` on every stored property, except boolean subfields,
/// which add `NotEqualTo 0` since `0` is their unchecked value.
pub fn constraints(
    session: &mut SubfieldSession,
    storage: &CompositeFieldStorage,
    field: Option<&CompositeFieldConfig>,
) -> Result<ConstraintSet> {
    let mut constraints = ConstraintSet::new();
    for definition in subfield_definitions(session, storage, field)? {
        let plugin = session.get_subfield_storage(&definition, None)?;
        let plugin = plugin.borrow();
        for (column, declared) in plugin.constraints() {
            constraints
                .entry(composite_column(definition.subfield(), &column))
                .or_default()
                .extend(declared);
        }
        if !definition.is_required() {
            continue;
        }
        for property in plugin.property_definitions() {
            if property.computed {
                continue;
            }
            let entry = constraints
                .entry(composite_column(definition.subfield(), &property.name))
                .or_default();
            if definition.base_type() == "boolean" {
                entry.insert(
                    "NotEqualTo".into(),
                    json!({"value": 0, "message": BOOLEAN_REQUIRED_MESSAGE}),
                );
            } else {
                entry.insert("NotBlank".into(), json!({}));
            }
        }
    }
    Ok(constraints)
}

/// Where a subfield violation is reported on the composite item.
///
/// Violations without a property path are flagged on the subfield's first column.
pub fn violation_path(
    definition: &SubfieldDefinition,
    schema: &Schema,
    property_path: &str,
) -> String {
    if !property_path.is_empty() {
        return property_path.to_string();
    }
    match schema.first_column() {
        Some(column) => composite_column(definition.subfield(), column),
        None => definition.subfield().to_string(),
    }
}

/// Whether the composite item `row` at `delta` of `record` is empty.
///
/// An item is empty only when every subfield reports empty.
pub fn is_empty(
    session: &mut SubfieldSession,
    storage: &CompositeFieldStorage,
    record: &dyn Record,
    delta: usize,
    row: &CompositeValue,
) -> Result<bool> {
    let explicit = ExplicitValues::Row(row.clone());
    for definition in subfield_definitions(session, storage, None)? {
        let items = session.get_subfield_item_list(&definition, record, delta, Some(&explicit))?;
        let plugin = session.get_subfield_storage(&definition, Some(&items))?;
        if !plugin.borrow().is_empty() {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Push each subfield's slice of `row` into that subfield's storage plugin.
pub fn set_value(
    session: &mut SubfieldSession,
    storage: &CompositeFieldStorage,
    row: &CompositeValue,
) -> Result<()> {
    for definition in subfield_definitions(session, storage, None)? {
        let value = session.convert_value_to_subfield_value(&definition, row)?;
        session
            .get_subfield_storage(&definition, None)?
            .borrow_mut()
            .set_value(value);
    }
    Ok(())
}

/// The widget id to use for a subfield.
pub fn widget_type_for(
    session: &SubfieldSession,
    definition: &SubfieldDefinition,
    display: &DisplaySettings,
) -> Result<String> {
    match explicit_plugin(definition, display) {
        Some(id) => Ok(id),
        None => session.get_subfield_default_widget(definition),
    }
}

/// The formatter id to use for a subfield.
pub fn formatter_type_for(
    session: &SubfieldSession,
    definition: &SubfieldDefinition,
    display: &DisplaySettings,
) -> Result<String> {
    match explicit_plugin(definition, display) {
        Some(id) => Ok(id),
        None => session.get_subfield_default_formatter(definition),
    }
}

fn explicit_plugin(definition: &SubfieldDefinition, display: &DisplaySettings) -> Option<String> {
    display
        .get(definition.subfield())
        .and_then(|d| d.type_.clone())
        .filter(|id| !id.is_empty())
}

/// Resolve the widget `display` selects for a subfield.
pub fn widget_for(
    session: &mut SubfieldSession,
    definition: &Arc<SubfieldDefinition>,
    display: &DisplaySettings,
) -> Result<SharedWidget> {
    let widget_id = widget_type_for(session, definition, display)?;
    let settings = display
        .get(definition.subfield())
        .map(|d| d.settings.clone())
        .unwrap_or_default();
    session.get_subfield_widget(definition, &widget_id, &settings)
}

/// Turn submitted widget values into composite rows.
///
/// `submitted` holds, per delta, each subfield's widget value. Values are run
/// through the subfield's widget, kept when truthy or the string `"0"`, and
/// re-keyed by composite column. Rows left with nothing truthy are dropped;
/// every surviving row gets `null` for each composite column it lacks.
pub fn assemble_rows(
    session: &mut SubfieldSession,
    storage: &CompositeFieldStorage,
    field: Option<&CompositeFieldConfig>,
    display: &DisplaySettings,
    submitted: &[IndexMap<String, SubfieldValue>],
) -> Result<Vec<CompositeValue>> {
    let composite_schema = schema(session, storage)?;
    let definitions = subfield_definitions(session, storage, field)?;

    let mut rows = Vec::with_capacity(submitted.len());
    for (delta, input) in submitted.iter().enumerate() {
        let mut row = CompositeValue::new();
        for definition in &definitions {
            let subfield = definition.subfield();
            let widget = widget_for(session, definition, display)?;
            let value = input.get(subfield).cloned().unwrap_or_default();
            let massaged = widget
                .massage_values(vec![value])
                .into_iter()
                .next()
                .unwrap_or_default();
            let prefix = format!("{subfield}_");
            for (key, value) in massaged {
                if truthy(&value) || value.as_str() == Some("0") {
                    let column = key.strip_prefix(&prefix).unwrap_or(&key);
                    row.insert(composite_column(subfield, column), value);
                }
            }
        }
        if !row.values().any(truthy) {
            debug!(delta, field = %storage.name, "dropping empty submitted row");
            continue;
        }
        for column in composite_schema.column_names() {
            row.entry(column.to_string()).or_insert(Value::Null);
        }
        rows.push(row);
    }
    Ok(rows)
}

/// One item list per subfield per delta of `record`.
///
/// The delta range covers the pre-change shadow too, so removed values still
/// get a list to diff against.
pub fn subfield_item_lists(
    session: &mut SubfieldSession,
    storage: &CompositeFieldStorage,
    field: Option<&CompositeFieldConfig>,
    record: &dyn Record,
) -> Result<Vec<SharedItemList>> {
    let deltas = record.field_len(&storage.name).max(
        record
            .original()
            .map_or(0, |original| original.field_len(&storage.name)),
    );
    let definitions = subfield_definitions(session, storage, field)?;
    let mut lists = Vec::with_capacity(deltas * definitions.len());
    for delta in 0..deltas {
        for definition in &definitions {
            lists.push(session.get_subfield_item_list(definition, record, delta, None)?);
        }
    }
    Ok(lists)
}

pub fn pre_save(
    session: &mut SubfieldSession,
    storage: &CompositeFieldStorage,
    field: Option<&CompositeFieldConfig>,
    record: &dyn Record,
) -> Result<()> {
    for items in subfield_item_lists(session, storage, field, record)? {
        items.borrow_mut().pre_save()?;
    }
    Ok(())
}

/// Returns whether any subfield list asked for the record to be resaved.
pub fn post_save(
    session: &mut SubfieldSession,
    storage: &CompositeFieldStorage,
    field: Option<&CompositeFieldConfig>,
    record: &dyn Record,
    update: bool,
) -> Result<bool> {
    let mut resave = false;
    for items in subfield_item_lists(session, storage, field, record)? {
        resave |= items.borrow_mut().post_save(update)?;
    }
    Ok(resave)
}

pub fn delete(
    session: &mut SubfieldSession,
    storage: &CompositeFieldStorage,
    field: Option<&CompositeFieldConfig>,
    record: &dyn Record,
) -> Result<()> {
    for items in subfield_item_lists(session, storage, field, record)? {
        items.borrow_mut().delete()?;
    }
    Ok(())
}

pub fn delete_revision(
    session: &mut SubfieldSession,
    storage: &CompositeFieldStorage,
    field: Option<&CompositeFieldConfig>,
    record: &dyn Record,
) -> Result<()> {
    for items in subfield_item_lists(session, storage, field, record)? {
        items.borrow_mut().delete_revision()?;
    }
    Ok(())
}

/// Native values of one subfield at every delta of `record`.
pub fn subfield_values(
    session: &mut SubfieldSession,
    storage: &CompositeFieldStorage,
    record: &dyn Record,
    subfield: &str,
) -> Result<Vec<SubfieldValue>> {
    let spec = storage
        .subfield(subfield)
        .ok_or_else(|| SubfieldError::UnknownSubfield {
            field: storage.name.clone(),
            subfield: subfield.to_string(),
        })?;
    let definition = session.get_subfield_definition(storage, spec, subfield, None)?;
    (0..record.field_len(&storage.name))
        .map(|delta| {
            let row = record
                .field_value(&storage.name, delta)
                .unwrap_or_default();
            session.convert_value_to_subfield_value(&definition, &row)
        })
        .collect()
}

/// Providers of every subfield's base type, sorted and de-duplicated.
pub fn storage_dependencies(
    session: &SubfieldSession,
    storage: &CompositeFieldStorage,
) -> Result<Vec<String>> {
    let prefix = &session.config().preset_prefix;
    let mut providers = BTreeSet::new();
    for spec in storage.storage.values() {
        let type_ref = TypeRef::parse(&spec.type_, prefix);
        providers.insert(session.field_types().definition(type_ref.base_type)?.provider);
    }
    Ok(providers.into_iter().collect())
}
